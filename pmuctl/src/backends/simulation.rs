//! Simulation backend.
//!
//! A `SimulatedMachine` holds one register file per CPU slot. The simulated
//! registers apply exactly the bit transitions of the arm64 backend, but to
//! atomics indexed by [`current_cpu`], so broadcast and per-CPU coherence
//! can be observed from tests.

use crate::backend_registry::{BackendContext, BackendError};
use crate::broadcast::current_cpu;
use crate::register::{Register, RegisterSet};
use pmuctl_common::regs::{Cntkctl, PMUSERENR_CYCLE_ACCESS, PmCounters, Pmcr, Pmuserenr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// PMCR_EL0 reset value: IMP/IDCODE set, six event counters, all disabled.
const PMCR_RESET: u64 = 0x4100_3000 | (6 << 11);

/// CNTKCTL_EL1 reset value: virtual counter readable from EL0.
const CNTKCTL_RESET: u64 = Cntkctl::EL0VCTEN.bits();

/// Register file of one simulated CPU.
#[derive(Debug)]
pub struct SimulatedCpu {
    /// PMUSERENR_EL0
    pmuserenr: AtomicU64,
    /// Enabled counters (PMCNTENSET_EL0 / PMCNTENCLR_EL0 view)
    pmcnten: AtomicU64,
    /// Enabled overflow interrupts (PMINTENSET_EL1 / PMINTENCLR_EL1 view)
    pminten: AtomicU64,
    /// PMCR_EL0
    pmcr: AtomicU64,
    /// CNTKCTL_EL1
    cntkctl: AtomicU64,
    /// Number of register writes performed on this CPU
    writes: AtomicU64,
}

impl SimulatedCpu {
    fn new() -> Self {
        Self {
            pmuserenr: AtomicU64::new(0),
            pmcnten: AtomicU64::new(0),
            pminten: AtomicU64::new(PmCounters::C.bits()),
            pmcr: AtomicU64::new(PMCR_RESET),
            cntkctl: AtomicU64::new(CNTKCTL_RESET),
            writes: AtomicU64::new(0),
        }
    }

    fn cycle_counter_enabled(&self) -> bool {
        Pmuserenr::from_bits_retain(self.pmuserenr.load(Ordering::SeqCst)).cycle_access()
    }

    fn timer_access_enabled(&self) -> bool {
        Cntkctl::from_bits_retain(self.cntkctl.load(Ordering::SeqCst)).el0_timer_access()
    }

    /// Raw PMCR_EL0 value.
    pub fn pmcr(&self) -> u64 {
        self.pmcr.load(Ordering::SeqCst)
    }

    /// Raw CNTKCTL_EL1 value.
    pub fn cntkctl(&self) -> u64 {
        self.cntkctl.load(Ordering::SeqCst)
    }

    /// Whether the cycle counter is counting on this CPU.
    pub fn cycle_counter_running(&self) -> bool {
        PmCounters::from_bits_retain(self.pmcnten.load(Ordering::SeqCst)).contains(PmCounters::C)
            && Pmcr::from_bits_retain(self.pmcr()).contains(Pmcr::E)
    }
}

/// A set of simulated CPUs.
#[derive(Debug)]
pub struct SimulatedMachine {
    cpus: Vec<SimulatedCpu>,
}

impl SimulatedMachine {
    /// Create a machine with `cpus` CPUs in their reset state.
    pub fn new(cpus: usize) -> Arc<Self> {
        Arc::new(Self {
            cpus: (0..cpus.max(1)).map(|_| SimulatedCpu::new()).collect(),
        })
    }

    /// Number of simulated CPUs.
    pub fn cpu_count(&self) -> usize {
        self.cpus.len()
    }

    /// Register file of CPU `idx`.
    pub fn cpu(&self, idx: usize) -> Option<&SimulatedCpu> {
        self.cpus.get(idx)
    }

    /// Register file of the CPU the caller runs on.
    ///
    /// Threads outside a broadcast act as CPU 0.
    fn local(&self) -> &SimulatedCpu {
        self.cpus.get(current_cpu()).unwrap_or(&self.cpus[0])
    }

    /// Cycle counter EL0 access per CPU.
    pub fn pmccntr_states(&self) -> Vec<bool> {
        self.cpus.iter().map(SimulatedCpu::cycle_counter_enabled).collect()
    }

    /// Timer EL0 access per CPU.
    pub fn cntkctl_states(&self) -> Vec<bool> {
        self.cpus.iter().map(SimulatedCpu::timer_access_enabled).collect()
    }

    /// Register writes performed per CPU.
    pub fn write_counts(&self) -> Vec<u64> {
        self.cpus
            .iter()
            .map(|cpu| cpu.writes.load(Ordering::SeqCst))
            .collect()
    }

    /// True when every CPU holds the same enabled state for both controls.
    pub fn is_coherent(&self) -> bool {
        let all_same = |states: Vec<bool>| states.windows(2).all(|w| w[0] == w[1]);
        all_same(self.pmccntr_states()) && all_same(self.cntkctl_states())
    }

    /// Registers backed by this machine.
    pub fn registers(self: &Arc<Self>) -> RegisterSet {
        RegisterSet {
            pmccntr: Arc::new(SimCycleCounter {
                machine: Arc::clone(self),
            }),
            cntkctl: Arc::new(SimTimerControl {
                machine: Arc::clone(self),
            }),
        }
    }
}

/// Simulated cycle counter control.
#[derive(Debug)]
pub struct SimCycleCounter {
    machine: Arc<SimulatedMachine>,
}

impl Register for SimCycleCounter {
    fn apply(&self, enable: bool) {
        let cpu = self.machine.local();
        if enable {
            // PMINTENCLR_EL1.C, PMCNTENSET_EL0.C, PMUSERENR_EL0, PMCR_EL0
            cpu.pminten.fetch_and(!PmCounters::C.bits(), Ordering::SeqCst);
            cpu.pmcnten.fetch_or(PmCounters::C.bits(), Ordering::SeqCst);
            cpu.pmuserenr.store(PMUSERENR_CYCLE_ACCESS.bits(), Ordering::SeqCst);
            let pmcr = Pmcr::from_bits_retain(cpu.pmcr()).start_cycle_counter();
            cpu.pmcr.store(pmcr.bits(), Ordering::SeqCst);
        } else {
            // PMCNTENCLR_EL0.C, PMUSERENR_EL0
            cpu.pmcnten.fetch_and(!PmCounters::C.bits(), Ordering::SeqCst);
            cpu.pmuserenr.store(0, Ordering::SeqCst);
        }
        cpu.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn status(&self) -> bool {
        self.machine.local().cycle_counter_enabled()
    }
}

/// Simulated timer EL0 access control.
#[derive(Debug)]
pub struct SimTimerControl {
    machine: Arc<SimulatedMachine>,
}

impl Register for SimTimerControl {
    fn apply(&self, enable: bool) {
        let cpu = self.machine.local();
        let current = Cntkctl::from_bits_retain(cpu.cntkctl());
        let next = if enable {
            current.grant_el0_timer()
        } else {
            current.revoke_el0_timer()
        };
        cpu.cntkctl.store(next.bits(), Ordering::SeqCst);
        cpu.writes.fetch_add(1, Ordering::SeqCst);
    }

    fn status(&self) -> bool {
        self.machine.local().timer_access_enabled()
    }
}

/// Backend factory: a fresh machine sized to the broadcast executor.
pub fn create_backend(ctx: &BackendContext) -> Result<RegisterSet, BackendError> {
    Ok(SimulatedMachine::new(ctx.cpus).registers())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::with_cpu;

    #[test]
    fn reset_state_is_disabled() {
        let machine = SimulatedMachine::new(4);
        assert_eq!(machine.cpu_count(), 4);
        assert_eq!(machine.pmccntr_states(), vec![false; 4]);
        assert_eq!(machine.cntkctl_states(), vec![false; 4]);
        assert!(machine.is_coherent());
    }

    #[test]
    fn apply_only_touches_local_cpu() {
        let machine = SimulatedMachine::new(2);
        let regs = machine.registers();

        with_cpu(1, || regs.pmccntr.apply(true));
        assert_eq!(machine.pmccntr_states(), vec![false, true]);
        assert_eq!(machine.write_counts(), vec![0, 1]);
        assert!(!machine.is_coherent());

        assert!(!regs.pmccntr.status());
        assert!(with_cpu(1, || regs.pmccntr.status()));
    }

    #[test]
    fn cycle_counter_sequence() {
        let machine = SimulatedMachine::new(1);
        let regs = machine.registers();
        let cpu = machine.cpu(0).unwrap();

        regs.pmccntr.apply(true);
        assert!(regs.pmccntr.status());
        assert!(cpu.cycle_counter_running());
        assert_eq!(cpu.pmcr() & 0xFFFF_F800, PMCR_RESET & 0xFFFF_F800);

        regs.pmccntr.apply(false);
        assert!(!regs.pmccntr.status());
        assert!(!cpu.cycle_counter_running());
    }

    #[test]
    fn timer_disable_keeps_low_byte() {
        let machine = SimulatedMachine::new(1);
        let regs = machine.registers();

        regs.cntkctl.apply(true);
        assert!(regs.cntkctl.status());
        assert_eq!(machine.cpu(0).unwrap().cntkctl(), CNTKCTL_RESET | 0x300);

        regs.cntkctl.apply(false);
        assert!(!regs.cntkctl.status());
        assert_eq!(machine.cpu(0).unwrap().cntkctl(), CNTKCTL_RESET);
    }
}
