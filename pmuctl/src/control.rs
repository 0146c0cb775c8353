//! Controls and their descriptors.
//!
//! A [`Control`] is one toggleable piece of hardware state with an optional
//! show and an optional modify capability. Capabilities are fixed when the
//! control is built; absent ones fall back to the trait's no-op defaults and
//! are reported by the descriptor as `None` / `NotModifiable`.

use crate::broadcast::BroadcastExecutor;
use crate::register::Register;
use bitflags::bitflags;
use pmuctl_common::error::PmuError;
use std::fmt;
use std::sync::Arc;

bitflags! {
    /// Capabilities a control offers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Current state can be read.
        const SHOW = 0b01;
        /// State can be changed.
        const MODIFY = 0b10;
    }
}

/// A hardware control reachable through the registry.
///
/// Callers hold the dispatcher's serialization token around `show` and
/// `modify`.
pub trait Control: Send + Sync {
    /// Capabilities of this control.
    fn capabilities(&self) -> Capabilities;

    /// Whether the control is enabled. Only called with `SHOW`.
    fn show(&self) -> bool {
        false
    }

    /// Enable or disable the control on every CPU. Only called with `MODIFY`.
    ///
    /// # Errors
    /// `BroadcastIncomplete` if some CPU was not reached.
    fn modify(&self, _enable: bool) -> Result<(), PmuError> {
        Ok(())
    }
}

/// A control backed by a register and applied through a broadcast.
pub struct BroadcastControl {
    register: Arc<dyn Register>,
    executor: Arc<dyn BroadcastExecutor>,
    capabilities: Capabilities,
}

impl BroadcastControl {
    /// Control that can be shown and modified.
    pub fn new(register: Arc<dyn Register>, executor: Arc<dyn BroadcastExecutor>) -> Self {
        Self::with_capabilities(register, executor, Capabilities::all())
    }

    /// Control that can only be shown.
    pub fn read_only(register: Arc<dyn Register>, executor: Arc<dyn BroadcastExecutor>) -> Self {
        Self::with_capabilities(register, executor, Capabilities::SHOW)
    }

    /// Control with an explicit capability set.
    pub fn with_capabilities(
        register: Arc<dyn Register>,
        executor: Arc<dyn BroadcastExecutor>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            register,
            executor,
            capabilities,
        }
    }
}

impl Control for BroadcastControl {
    fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    fn show(&self) -> bool {
        self.register.status()
    }

    fn modify(&self, enable: bool) -> Result<(), PmuError> {
        let register = &self.register;
        self.executor.on_each_cpu(&|| register.apply(enable))
    }
}

/// A named entry of the control registry.
#[derive(Clone)]
pub struct ControlDescriptor {
    name: &'static str,
    control: Arc<dyn Control>,
}

impl ControlDescriptor {
    /// Pair a unique name with a control.
    pub fn new(name: &'static str, control: Arc<dyn Control>) -> Self {
        Self { name, control }
    }

    /// Protocol name of the control.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Capabilities of the control.
    pub fn capabilities(&self) -> Capabilities {
        self.control.capabilities()
    }

    /// Whether the control supports `show`.
    pub fn can_show(&self) -> bool {
        self.capabilities().contains(Capabilities::SHOW)
    }

    /// Whether the control supports `modify`.
    pub fn can_modify(&self) -> bool {
        self.capabilities().contains(Capabilities::MODIFY)
    }

    /// Current state, or `None` without the show capability.
    pub fn show(&self) -> Option<bool> {
        self.can_show().then(|| self.control.show())
    }

    /// Apply a new state on every CPU.
    ///
    /// # Errors
    /// Returns `PmuError::NotModifiable` without the modify capability and
    /// `PmuError::BroadcastIncomplete` if some CPU was not reached.
    pub fn modify(&self, enable: bool) -> Result<(), PmuError> {
        if !self.can_modify() {
            return Err(PmuError::NotModifiable(self.name.to_string()));
        }
        self.control.modify(enable)
    }
}

impl fmt::Debug for ControlDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlDescriptor")
            .field("name", &self.name)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::simulation::SimulatedMachine;
    use crate::broadcast::ThreadPerCpu;

    /// Control that implements nothing beyond its capabilities.
    struct Inert;

    impl Control for Inert {
        fn capabilities(&self) -> Capabilities {
            Capabilities::empty()
        }
    }

    #[test]
    fn broadcast_control_reaches_every_cpu() {
        let machine = SimulatedMachine::new(4);
        let exec = Arc::new(ThreadPerCpu::with_count(4).unwrap());
        let control = BroadcastControl::new(machine.registers().pmccntr, exec);

        control.modify(true).unwrap();
        assert_eq!(machine.pmccntr_states(), vec![true; 4]);
        assert_eq!(machine.write_counts(), vec![1; 4]);
        assert!(control.show());

        control.modify(false).unwrap();
        assert_eq!(machine.pmccntr_states(), vec![false; 4]);
    }

    #[test]
    fn read_only_descriptor_rejects_modify() {
        let machine = SimulatedMachine::new(1);
        let exec = Arc::new(crate::broadcast::SingleCore);
        let desc = ControlDescriptor::new(
            "RO",
            Arc::new(BroadcastControl::read_only(machine.registers().cntkctl, exec)),
        );

        assert!(desc.can_show());
        assert!(!desc.can_modify());
        assert_eq!(desc.show(), Some(false));
        assert_eq!(desc.modify(true), Err(PmuError::NotModifiable("RO".to_string())));
        assert_eq!(machine.write_counts(), vec![0]);
    }

    #[test]
    fn absent_capabilities_are_reported() {
        let desc = ControlDescriptor::new("INERT", Arc::new(Inert));
        assert_eq!(desc.show(), None);
        assert!(desc.modify(false).is_err());
        assert!(format!("{desc:?}").contains("INERT"));
    }
}
