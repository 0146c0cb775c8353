//! Prelude module for common re-exports.
//!
//! ```rust
//! use pmuctl_common::prelude::*;
//! ```

// ─── Configuration ──────────────────────────────────────────────────
pub use crate::config::{ConfigError, ConfigLoader, LogLevel, PmuctlConfig, PmuctlFileConfig};

// ─── Controls ───────────────────────────────────────────────────────
pub use crate::consts::{ControlId, DEFAULT_PAGE_SIZE, PM_CTL_CNT};

// ─── Errors ─────────────────────────────────────────────────────────
pub use crate::error::PmuError;

// ─── Binary protocol ────────────────────────────────────────────────
pub use crate::ioctl::{Access, IoctlCommand, PmuctlToggle, PMU_IOC_PMCCNTR};
