//! Textual `NAME=VALUE` protocol.
//!
//! Reads return one `NAME=0|1` line per show-capable control, in registry
//! order, as a single snapshot. Writes take one `NAME=VALUE` request.

use super::Dispatcher;
use pmuctl_common::error::{PmuError, parse_long};
use std::fmt::Write;
use tracing::debug;

impl<const N: usize> Dispatcher<N> {
    /// Format the snapshot of every show-capable control.
    ///
    /// The snapshot never exceeds `min(capacity, page_size)` bytes; if it
    /// would, the whole read fails with `BufferTooLarge`. The token is held
    /// for the entire formatting pass.
    pub fn read_snapshot(&self, capacity: usize) -> Result<String, PmuError> {
        let limit = capacity.min(self.page_size);
        let mut out = String::new();
        out.try_reserve_exact(limit)
            .map_err(|_| PmuError::AllocationFailure(limit))?;

        let _token = self.token.lock();
        for desc in self.registry.iter() {
            let Some(enabled) = desc.show() else {
                continue;
            };
            // NAME + '=' + digit + '\n'
            let needed = out.len() + desc.name().len() + 3;
            if needed > limit {
                return Err(PmuError::BufferTooLarge { len: needed, limit });
            }
            // Writing into a String cannot fail.
            let _ = writeln!(out, "{}={}", desc.name(), u8::from(enabled));
        }

        debug!("Snapshot of {} bytes", out.len());
        Ok(out)
    }

    /// Handle one `NAME=VALUE` request.
    ///
    /// Whitespace around name and value is ignored. A nonzero value enables
    /// the control, zero disables it. On success the whole input counts as
    /// consumed.
    pub fn write_request(&self, input: &[u8]) -> Result<usize, PmuError> {
        if input.len() > self.page_size {
            return Err(PmuError::BufferTooLarge {
                len: input.len(),
                limit: self.page_size,
            });
        }

        let mut staged = Vec::new();
        staged
            .try_reserve_exact(input.len())
            .map_err(|_| PmuError::AllocationFailure(input.len()))?;
        staged.extend_from_slice(input);

        let request = std::str::from_utf8(&staged).map_err(|_| PmuError::MalformedRequest)?;
        let (name, value) = request
            .split_once('=')
            .ok_or(PmuError::MalformedRequest)?;
        let (name, value) = (name.trim(), value.trim());

        let desc = self.lookup(name)?;
        if !desc.can_modify() {
            return Err(PmuError::NotModifiable(name.to_string()));
        }
        let enable = parse_long(value)? != 0;

        debug!("Text write {}={}", name, value);
        self.apply(desc, enable)?;
        Ok(input.len())
    }
}
