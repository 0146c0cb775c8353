//! # pmuctl
//!
//! Control registry and dispatch layer granting user space (EL0) access to
//! the ARMv8 PMU cycle counter and the generic timer registers, uniformly
//! on every CPU.
//!
//! # Module Structure
//!
//! - [`registry`] - Fixed, ordered registry of named controls
//! - [`control`] - Control trait, capabilities and descriptors
//! - [`dispatch`] - Textual and binary protocols, serialization token
//! - [`node`] - Device-node (read/write/ioctl) facade
//! - [`broadcast`] - Run-on-every-CPU executors
//! - [`register`] - Per-CPU register abstraction
//! - [`backends`] - Register backends (simulation, arm64)
//! - [`backend_registry`] - Backend factory registration
//! - [`timer`] - CNTKCTL_EL1 control and its standalone entry points
//! - [`core`] - `PmuCtl` lifecycle (forced-disable start and shutdown)
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │   DeviceNode: read / write (NAME=VALUE)      ioctl (0xF1)       │
//! │                     │                            │             │
//! │                     ▼                            ▼             │
//! │           ┌──────────────────────────────────────────┐         │
//! │           │  Dispatcher  (one serialization token)    │         │
//! │           └────────────────────┬─────────────────────┘         │
//! │                                ▼                               │
//! │           ┌──────────────────────────────────────────┐         │
//! │           │  ControlRegistry: [PMCCNTR, CNTKCTL]     │         │
//! │           └────────────────────┬─────────────────────┘         │
//! │                                ▼                               │
//! │       BroadcastExecutor ──► Register.apply() on every CPU      │
//! └────────────────────────────────────────────────────────────────┘
//! ```

#![warn(missing_docs)]

pub mod backend_registry;
pub mod backends;
pub mod broadcast;
pub mod control;
pub mod core;
pub mod dispatch;
pub mod error;
pub mod node;
pub mod register;
pub mod registry;
pub mod timer;

// Re-export key types for convenience
pub use crate::backend_registry::BackendRegistry;
pub use crate::broadcast::{BroadcastExecutor, SingleCore, ThreadPerCpu};
pub use crate::control::{Capabilities, Control, ControlDescriptor};
pub use crate::core::PmuCtl;
pub use crate::dispatch::{Dispatcher, UserSlice};
pub use crate::error::PmuCtlError;
pub use crate::node::DeviceNode;
pub use crate::register::{Register, RegisterSet};
pub use crate::registry::ControlRegistry;
