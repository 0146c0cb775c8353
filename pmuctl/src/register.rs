//! Hardware register abstraction.
//!
//! A `Register` is the leaf collaborator behind a control: one write-only
//! `apply` and one `status` read against the copy held by the CPU the call
//! runs on. Backends supply concrete registers; the registry never touches
//! bitfields directly.

use std::sync::Arc;

/// A per-CPU hardware control.
///
/// `apply` only affects the calling CPU. Reaching every CPU is the job of
/// the [`BroadcastExecutor`](crate::broadcast::BroadcastExecutor).
pub trait Register: Send + Sync {
    /// Write the enabled or disabled configuration on the current CPU.
    fn apply(&self, enable: bool);

    /// Read whether the current CPU's copy is enabled.
    fn status(&self) -> bool;
}

/// The registers backing the standard controls, as produced by a backend.
#[derive(Clone)]
pub struct RegisterSet {
    /// Cycle counter EL0 access (PMCCNTR_EL0 and friends).
    pub pmccntr: Arc<dyn Register>,
    /// Timer EL0 access (CNTKCTL_EL1).
    pub cntkctl: Arc<dyn Register>,
}

impl std::fmt::Debug for RegisterSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisterSet")
            .field("pmccntr", &self.pmccntr.status())
            .field("cntkctl", &self.cntkctl.status())
            .finish()
    }
}
