//! Error taxonomy shared by the textual and binary protocols.
//!
//! Every variant maps onto a negative errno via [`PmuError::errno`], which is
//! what the device-node facade hands back to callers.

use thiserror::Error;

/// Errors raised by the control registry and its protocol dispatchers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PmuError {
    /// Textual request without a `=` separator or not valid UTF-8.
    #[error("Malformed request")]
    MalformedRequest,

    /// Textual request names a control that is not in the registry.
    #[error("Unknown control: {0}")]
    UnknownControl(String),

    /// Binary command outside the pmuctl command group.
    #[error("Unknown command: {0:#010x}")]
    UnknownCommand(u32),

    /// Control exists but has no modify capability.
    #[error("Control is not modifiable: {0}")]
    NotModifiable(String),

    /// Value could not be parsed as the expected type.
    #[error("Invalid value: {0:?}")]
    InvalidValue(String),

    /// Formatted output or staged input exceeds the allowed size.
    #[error("Buffer too large: {len} bytes exceeds limit of {limit}")]
    BufferTooLarge {
        /// Size that was required
        len: usize,
        /// Size that was allowed
        limit: usize,
    },

    /// Caller buffer has the wrong size or access direction.
    #[error("Bad buffer access: expected {expected} bytes with {required} access")]
    BadAccess {
        /// Expected payload size in bytes
        expected: usize,
        /// Required access ("read" or "write")
        required: &'static str,
    },

    /// Staging buffer could not be allocated.
    #[error("Allocation failure staging {0} bytes")]
    AllocationFailure(usize),

    /// Binary command in the pmuctl group that no handler serves.
    #[error("Unsupported command: {0:#010x}")]
    UnsupportedCommand(u32),

    /// A broadcast could not run on every CPU it targets.
    #[error("Broadcast reached {reached} of {total} CPUs")]
    BroadcastIncomplete {
        /// CPUs the operation ran on
        reached: usize,
        /// CPUs the operation targeted
        total: usize,
    },
}

impl PmuError {
    /// Negative errno reported to device-node callers.
    pub fn errno(&self) -> i32 {
        -match self {
            PmuError::MalformedRequest => libc::EINVAL,
            PmuError::UnknownControl(_) => libc::ENOENT,
            PmuError::UnknownCommand(_) => libc::ENOTTY,
            PmuError::NotModifiable(_) => libc::EPERM,
            PmuError::InvalidValue(_) => libc::EINVAL,
            PmuError::BufferTooLarge { .. } => libc::EFBIG,
            PmuError::BadAccess { .. } => libc::EFAULT,
            PmuError::AllocationFailure(_) => libc::ENOMEM,
            PmuError::UnsupportedCommand(_) => libc::EINVAL,
            PmuError::BroadcastIncomplete { .. } => libc::EIO,
        }
    }
}

/// Parse an integer the way the kernel's `kstrtol(s, 0, ..)` does.
///
/// Accepts an optional sign, `0x`/`0X` hex, leading-`0` octal or decimal,
/// and a single trailing newline. Anything else is `InvalidValue`.
pub fn parse_long(text: &str) -> Result<i64, PmuError> {
    let invalid = || PmuError::InvalidValue(text.to_string());

    let body = text.strip_suffix('\n').unwrap_or(text);
    let (negative, digits) = match body.as_bytes().first() {
        Some(b'-') => (true, &body[1..]),
        Some(b'+') => (false, &body[1..]),
        _ => (false, body),
    };

    let (radix, digits) = if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        (16, hex)
    } else if digits.len() > 1 && digits.starts_with('0') {
        (8, &digits[1..])
    } else {
        (10, digits)
    };

    // from_str_radix tolerates its own sign; we already consumed ours.
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return Err(invalid());
    }

    // The magnitude of i64::MIN only fits unsigned.
    let magnitude = u64::from_str_radix(digits, radix).map_err(|_| invalid())?;
    if negative {
        0i64.checked_sub_unsigned(magnitude).ok_or_else(invalid)
    } else {
        i64::try_from(magnitude).map_err(|_| invalid())
    }
}
