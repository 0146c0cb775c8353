//! Control identifiers and protocol constants.
//!
//! Control ids are dense and stable for the lifetime of the process. They
//! double as registry indices and as the low bits of binary command numbers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Canonical service name (used for logging and the default config).
pub const PMUCTL_SERVICE_NAME: &str = "pmuctl";

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/pmuctl/pmuctl.toml";

/// Default textual protocol buffer cap (one page).
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Smallest accepted `page_size`.
pub const MIN_PAGE_SIZE: usize = 64;

/// Largest accepted `page_size`.
pub const MAX_PAGE_SIZE: usize = 65536;

/// Number of controls in the registry. Keep in sync with [`ControlId::ALL`].
pub const PM_CTL_CNT: usize = 2;

/// Stable identifier of a hardware control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum ControlId {
    /// PMCCNTR_EL0 cycle counter, EL0 access.
    Pmccntr = 0,
    /// CNTKCTL_EL1 physical/virtual timer EL0 access.
    Cntkctl = 1,
}

impl ControlId {
    /// Every control in registry order.
    pub const ALL: [ControlId; PM_CTL_CNT] = [ControlId::Pmccntr, ControlId::Cntkctl];

    /// Protocol name of the control.
    pub const fn name(self) -> &'static str {
        match self {
            ControlId::Pmccntr => "PMCCNTR",
            ControlId::Cntkctl => "CNTKCTL",
        }
    }

    /// Registry index of the control.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Map a registry index back to a control id.
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(ControlId::Pmccntr),
            1 => Some(ControlId::Cntkctl),
            _ => None,
        }
    }

    /// Look a control up by its protocol name (case-sensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|id| id.name() == name)
    }
}

impl fmt::Display for ControlId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
