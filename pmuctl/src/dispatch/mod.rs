//! Protocol dispatcher.
//!
//! The dispatcher owns the registry and the single serialization token.
//! Both protocols ([`text`] and [`binary`]) funnel every show pass and every
//! modify through the token, so no snapshot ever interleaves with a
//! broadcast and no two broadcasts overlap.

pub mod binary;
pub mod text;

use crate::control::ControlDescriptor;
use crate::registry::ControlRegistry;
use parking_lot::Mutex;
use pmuctl_common::consts::{DEFAULT_PAGE_SIZE, PM_CTL_CNT};
use pmuctl_common::error::PmuError;
use tracing::{debug, error, info};

pub use binary::UserSlice;

/// Serializes access to a control registry for both protocols.
#[derive(Debug)]
pub struct Dispatcher<const N: usize = PM_CTL_CNT> {
    registry: ControlRegistry<N>,
    token: Mutex<()>,
    page_size: usize,
}

impl<const N: usize> Dispatcher<N> {
    /// Dispatcher with the default one-page textual buffer cap.
    pub fn new(registry: ControlRegistry<N>) -> Self {
        Self::with_page_size(registry, DEFAULT_PAGE_SIZE)
    }

    /// Dispatcher with an explicit textual buffer cap.
    pub fn with_page_size(registry: ControlRegistry<N>, page_size: usize) -> Self {
        Self {
            registry,
            token: Mutex::new(()),
            page_size,
        }
    }

    /// The registry served by this dispatcher.
    pub fn registry(&self) -> &ControlRegistry<N> {
        &self.registry
    }

    /// Textual buffer cap in bytes.
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Run `f` while holding the serialization token.
    pub fn with_token<R>(&self, f: impl FnOnce(&ControlRegistry<N>) -> R) -> R {
        let _token = self.token.lock();
        f(&self.registry)
    }

    /// Current state of control `name`.
    ///
    /// # Errors
    /// `UnknownControl` if absent; `Ok(None)` if it cannot be shown.
    pub fn status(&self, name: &str) -> Result<Option<bool>, PmuError> {
        let desc = self.lookup(name)?;
        let _token = self.token.lock();
        Ok(desc.show())
    }

    /// Enable or disable control `name` on every CPU.
    ///
    /// # Errors
    /// `UnknownControl` if absent, `NotModifiable` without modify capability,
    /// `BroadcastIncomplete` if some CPU was not reached.
    pub fn set(&self, name: &str, enable: bool) -> Result<(), PmuError> {
        let desc = self.lookup(name)?;
        self.apply(desc, enable)
    }

    /// Force every modifiable control to Disabled in one token hold.
    ///
    /// Every control is attempted even after a failure.
    ///
    /// # Errors
    /// The first `BroadcastIncomplete` encountered.
    pub fn reset_all(&self) -> Result<(), PmuError> {
        let _token = self.token.lock();
        let mut first_error = None;
        for desc in self.registry.iter().filter(|d| d.can_modify()) {
            match desc.modify(false) {
                Ok(()) => debug!("Reset {} to disabled", desc.name()),
                Err(e) => {
                    error!("Failed to reset {}: {}", desc.name(), e);
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn lookup(&self, name: &str) -> Result<&ControlDescriptor, PmuError> {
        self.registry
            .lookup_by_name(name)
            .ok_or_else(|| PmuError::UnknownControl(name.to_string()))
    }

    /// Broadcast a new state under the token.
    fn apply(&self, desc: &ControlDescriptor, enable: bool) -> Result<(), PmuError> {
        let _token = self.token.lock();
        desc.modify(enable)?;
        info!(
            "{} {}",
            desc.name(),
            if enable { "enabled" } else { "disabled" }
        );
        Ok(())
    }
}
