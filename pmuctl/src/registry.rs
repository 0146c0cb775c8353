//! Control registry.
//!
//! A fixed, ordered array of descriptors. Ids are array indices and never
//! change; names are unique. The registry's shape is frozen at construction:
//! only the hardware behind the descriptors changes afterwards.

use crate::broadcast::BroadcastExecutor;
use crate::control::{BroadcastControl, ControlDescriptor};
use crate::register::RegisterSet;
use crate::timer::TimerControl;
use pmuctl_common::consts::{ControlId, PM_CTL_CNT};
use std::sync::Arc;

/// Ordered, fixed-size collection of control descriptors.
#[derive(Debug, Clone)]
pub struct ControlRegistry<const N: usize = PM_CTL_CNT> {
    descriptors: [ControlDescriptor; N],
}

impl<const N: usize> ControlRegistry<N> {
    /// Build a registry from descriptors in id order.
    ///
    /// # Panics
    /// Panics if two descriptors share a name.
    pub fn new(descriptors: [ControlDescriptor; N]) -> Self {
        for (idx, desc) in descriptors.iter().enumerate() {
            if descriptors[..idx].iter().any(|d| d.name() == desc.name()) {
                panic!("Control '{}' is already registered", desc.name());
            }
        }
        Self { descriptors }
    }

    /// Find a descriptor by exact name.
    pub fn lookup_by_name(&self, name: &str) -> Option<&ControlDescriptor> {
        self.descriptors.iter().find(|d| d.name() == name)
    }

    /// Find a descriptor by numeric id.
    pub fn lookup_by_id(&self, id: usize) -> Option<&ControlDescriptor> {
        self.descriptors.get(id)
    }

    /// Id of the control called `name`.
    pub fn id_of(&self, name: &str) -> Option<usize> {
        self.descriptors.iter().position(|d| d.name() == name)
    }

    /// Descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &ControlDescriptor> {
        self.descriptors.iter()
    }

    /// Visit every descriptor in registration order.
    pub fn for_each(&self, f: impl FnMut(&ControlDescriptor)) {
        self.descriptors.iter().for_each(f);
    }

    /// Number of controls.
    pub const fn len(&self) -> usize {
        N
    }

    /// True for a registry without controls.
    pub const fn is_empty(&self) -> bool {
        N == 0
    }
}

impl ControlRegistry<PM_CTL_CNT> {
    /// The standard registry: `PMCCNTR` then `CNTKCTL`.
    ///
    /// Returns the timer control as well, for its standalone entry points.
    pub fn standard(
        registers: RegisterSet,
        executor: Arc<dyn BroadcastExecutor>,
    ) -> (Self, Arc<TimerControl>) {
        let timer = Arc::new(TimerControl::new(registers.cntkctl, Arc::clone(&executor)));
        let pmccntr = Arc::new(BroadcastControl::new(registers.pmccntr, executor));

        let descriptors = ControlId::ALL.map(|id| match id {
            ControlId::Pmccntr => ControlDescriptor::new(id.name(), pmccntr.clone()),
            ControlId::Cntkctl => ControlDescriptor::new(id.name(), timer.clone()),
        });

        (Self::new(descriptors), timer)
    }
}
