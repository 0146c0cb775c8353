//! pmuctl Common Library
//!
//! This crate provides the shared vocabulary of the pmuctl workspace:
//! constants, the error taxonomy with its errno mapping, the binary command
//! layout, register bitfields and configuration loading.
//!
//! # Module Structure
//!
//! - [`consts`] - Control names, ids and protocol constants
//! - [`error`] - `PmuError` and errno mapping
//! - [`ioctl`] - Binary command codes and payload layout
//! - [`regs`] - ARMv8 register bitfields and transitions
//! - [`config`] - Configuration loading traits and types
//! - [`prelude`] - Common re-exports for convenience
//!
//! # Usage
//!
//! ```rust
//! use pmuctl_common::prelude::*;
//!
//! assert_eq!(ControlId::Pmccntr.name(), "PMCCNTR");
//! ```

pub mod config;
pub mod consts;
pub mod error;
pub mod ioctl;
pub mod prelude;
pub mod regs;
