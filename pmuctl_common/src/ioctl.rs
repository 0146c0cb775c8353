//! Binary command layout.
//!
//! Command numbers use the Linux `_IOC` encoding with magic `0xF1`. Set
//! commands (`_IOW`) carry the control id as their number; get commands
//! (`_IOR`) carry the id with [`GET_FLAG`] set. Both share the
//! [`PmuctlToggle`] payload.

use crate::consts::{ControlId, PM_CTL_CNT};
use bitflags::bitflags;
use static_assertions::const_assert_eq;
use std::mem::size_of;

/// ioctl magic of the pmuctl command group.
pub const PMUCTL_IOC_MAGIC: u8 = 0xF1;

/// Command-number bit distinguishing read-back commands from set commands.
pub const GET_FLAG: u8 = 0x80;

/// Payload shared by every pmuctl command.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PmuctlToggle {
    /// 0 - disable, 1 - enable
    pub enable: i32,
}

const_assert_eq!(size_of::<PmuctlToggle>(), 4);

/// Size in bytes of a command payload.
pub const PAYLOAD_SIZE: usize = size_of::<PmuctlToggle>();

impl PmuctlToggle {
    /// Build a payload from a boolean state.
    pub const fn from_state(enabled: bool) -> Self {
        Self {
            enable: enabled as i32,
        }
    }

    /// Decode a payload from native-endian bytes.
    pub fn from_bytes(bytes: [u8; PAYLOAD_SIZE]) -> Self {
        Self {
            enable: i32::from_ne_bytes(bytes),
        }
    }

    /// Encode the payload as native-endian bytes.
    pub fn to_bytes(self) -> [u8; PAYLOAD_SIZE] {
        self.enable.to_ne_bytes()
    }
}

/// `_IOW(PMUCTL_IOC_MAGIC, PM_CTL_PMCCNTR, struct pmuctl_pmccntr_data)`
pub const PMU_IOC_PMCCNTR: u32 =
    nix::request_code_write!(PMUCTL_IOC_MAGIC, ControlId::Pmccntr as u8, PAYLOAD_SIZE) as u32;

/// Set command for the timer control.
pub const PMU_IOC_CNTKCTL: u32 =
    nix::request_code_write!(PMUCTL_IOC_MAGIC, ControlId::Cntkctl as u8, PAYLOAD_SIZE) as u32;

/// Read-back command for the cycle counter control.
pub const PMU_IOC_PMCCNTR_GET: u32 = nix::request_code_read!(
    PMUCTL_IOC_MAGIC,
    GET_FLAG | ControlId::Pmccntr as u8,
    PAYLOAD_SIZE
) as u32;

/// Read-back command for the timer control.
pub const PMU_IOC_CNTKCTL_GET: u32 = nix::request_code_read!(
    PMUCTL_IOC_MAGIC,
    GET_FLAG | ControlId::Cntkctl as u8,
    PAYLOAD_SIZE
) as u32;

/// Set commands, indexed by control id.
pub const SET_COMMANDS: [u32; PM_CTL_CNT] = [PMU_IOC_PMCCNTR, PMU_IOC_CNTKCTL];

/// Get commands, indexed by control id.
pub const GET_COMMANDS: [u32; PM_CTL_CNT] = [PMU_IOC_PMCCNTR_GET, PMU_IOC_CNTKCTL_GET];

bitflags! {
    /// Access a command needs on the caller's buffer.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Access: u8 {
        /// The handler reads from the caller buffer.
        const READ = 0b01;
        /// The handler writes into the caller buffer.
        const WRITE = 0b10;
    }
}

impl Access {
    /// Human readable name used in error reports.
    pub fn describe(self) -> &'static str {
        if self == Access::READ {
            "read"
        } else if self == Access::WRITE {
            "write"
        } else if self.is_all() {
            "read/write"
        } else {
            "no"
        }
    }
}

/// A decoded pmuctl command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoctlCommand {
    /// Enable or disable a control.
    Set(ControlId),
    /// Read a control's current state.
    Get(ControlId),
}

impl IoctlCommand {
    /// Command number of this command.
    pub fn code(self) -> u32 {
        match self {
            IoctlCommand::Set(id) => SET_COMMANDS[id.index()],
            IoctlCommand::Get(id) => GET_COMMANDS[id.index()],
        }
    }

    /// Control targeted by this command.
    pub fn control(self) -> ControlId {
        match self {
            IoctlCommand::Set(id) | IoctlCommand::Get(id) => id,
        }
    }

    /// Access the handler needs on the caller buffer.
    ///
    /// `_IOW` commands copy from the caller, `_IOR` commands copy to it.
    pub fn access(self) -> Access {
        match self {
            IoctlCommand::Set(_) => Access::READ,
            IoctlCommand::Get(_) => Access::WRITE,
        }
    }

    /// Payload size the caller buffer must have.
    pub fn payload_size(self) -> usize {
        PAYLOAD_SIZE
    }

    /// Look up a command number in the command table.
    pub fn from_code(code: u32) -> Option<Self> {
        ControlId::ALL.into_iter().find_map(|id| {
            if SET_COMMANDS[id.index()] == code {
                Some(IoctlCommand::Set(id))
            } else if GET_COMMANDS[id.index()] == code {
                Some(IoctlCommand::Get(id))
            } else {
                None
            }
        })
    }
}

/// Type (magic) field of an `_IOC` command number.
///
/// The type field sits in bits 8..16 on every Linux architecture.
#[inline]
pub const fn ioc_type(code: u32) -> u8 {
    (code >> 8) as u8
}
