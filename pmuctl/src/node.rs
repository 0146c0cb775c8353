//! Character-device style facade over the dispatcher.
//!
//! `read`, `write` and `ioctl` follow file-operation conventions: byte
//! counts on success, negative errno on failure.

use crate::dispatch::{Dispatcher, UserSlice};
use pmuctl_common::consts::PM_CTL_CNT;
use tracing::warn;

/// Device-node entry points bound to one dispatcher.
#[derive(Debug, Clone, Copy)]
pub struct DeviceNode<'d, const N: usize = PM_CTL_CNT> {
    dispatcher: &'d Dispatcher<N>,
}

impl<'d, const N: usize> DeviceNode<'d, N> {
    /// Bind to a dispatcher.
    pub fn new(dispatcher: &'d Dispatcher<N>) -> Self {
        Self { dispatcher }
    }

    /// Largest snapshot a read can return.
    pub fn page_size(&self) -> usize {
        self.dispatcher.page_size()
    }

    /// Read the snapshot into `buf`.
    ///
    /// Only a read at offset 0 returns data; it advances `offset` past the
    /// snapshot so the next read reports end of file.
    pub fn read(&self, buf: &mut [u8], offset: &mut u64) -> isize {
        if *offset > 0 {
            return 0;
        }
        match self.dispatcher.read_snapshot(buf.len()) {
            Ok(snapshot) => {
                let len = snapshot.len();
                buf[..len].copy_from_slice(snapshot.as_bytes());
                *offset += len as u64;
                len as isize
            }
            Err(e) => {
                warn!("read rejected: {}", e);
                e.errno() as isize
            }
        }
    }

    /// Handle one textual request; returns bytes consumed.
    pub fn write(&self, buf: &[u8]) -> isize {
        match self.dispatcher.write_request(buf) {
            Ok(consumed) => consumed as isize,
            Err(e) => {
                warn!("write rejected: {}", e);
                e.errno() as isize
            }
        }
    }

    /// Handle one binary command; returns 0 on success.
    pub fn ioctl(&self, cmd: u32, arg: UserSlice<'_>) -> i32 {
        match self.dispatcher.ioctl(cmd, arg) {
            Ok(()) => 0,
            Err(e) => {
                warn!("ioctl {:#010x} rejected: {}", cmd, e);
                e.errno()
            }
        }
    }
}
