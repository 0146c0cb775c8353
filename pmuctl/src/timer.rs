//! Counter-timer kernel control (CNTKCTL_EL1) EL0 access.
//!
//! Besides backing the `CNTKCTL` registry entry, the timer control keeps
//! standalone entry points for lifecycle code: set, teardown, a one-line
//! textual status and a textual update. Callers serialize through the
//! dispatcher token (see [`PmuCtl`](crate::core::PmuCtl)).

use crate::broadcast::BroadcastExecutor;
use crate::control::{BroadcastControl, Capabilities, Control};
use crate::register::Register;
use pmuctl_common::error::{PmuError, parse_long};
use std::sync::Arc;
use tracing::debug;

/// The timer EL0 access control.
pub struct TimerControl {
    inner: BroadcastControl,
}

impl TimerControl {
    /// Wrap the CNTKCTL register and the broadcast executor.
    pub fn new(register: Arc<dyn Register>, executor: Arc<dyn BroadcastExecutor>) -> Self {
        Self {
            inner: BroadcastControl::new(register, executor),
        }
    }

    /// Grant or revoke EL0 timer access on every CPU.
    ///
    /// # Errors
    /// `BroadcastIncomplete` if some CPU was not reached.
    pub fn set(&self, enable: bool) -> Result<(), PmuError> {
        self.inner.modify(enable)?;
        debug!("Timer control EL0 access {}", if enable { "enabled" } else { "disabled" });
        Ok(())
    }

    /// Restore the default (revoked) state on every CPU.
    pub fn teardown(&self) -> Result<(), PmuError> {
        self.set(false)
    }

    /// Whether EL0 timer access is granted on the calling CPU.
    pub fn is_enabled(&self) -> bool {
        self.inner.show()
    }

    /// Write `"CNTKCTL EL0 access = <0|1>\n"` into `buf`.
    ///
    /// Output is truncated to `buf.len()`; returns the number of bytes
    /// written.
    pub fn status(&self, buf: &mut [u8]) -> usize {
        let line = format!("CNTKCTL EL0 access = {}\n", u8::from(self.is_enabled()));
        let len = line.len().min(buf.len());
        buf[..len].copy_from_slice(&line.as_bytes()[..len]);
        len
    }

    /// Parse `raw` as an integer and apply it (nonzero enables).
    ///
    /// # Errors
    /// Returns `PmuError::InvalidValue` if `raw` is not an integer; nothing
    /// is written in that case.
    pub fn update(&self, raw: &[u8]) -> Result<(), PmuError> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| PmuError::InvalidValue(String::from_utf8_lossy(raw).into_owned()))?;
        let value = parse_long(text)?;
        self.set(value != 0)
    }
}

impl Control for TimerControl {
    fn capabilities(&self) -> Capabilities {
        Capabilities::SHOW | Capabilities::MODIFY
    }

    fn show(&self) -> bool {
        self.is_enabled()
    }

    fn modify(&self, enable: bool) -> Result<(), PmuError> {
        self.set(enable)
    }
}
