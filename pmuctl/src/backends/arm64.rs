//! arm64 backend: real system register access.
//!
//! Every access here is an EL1 operation. Running it from EL0 traps, so
//! this backend is only meaningful inside a privileged execution context.

use crate::backend_registry::{BackendContext, BackendError};
use crate::register::{Register, RegisterSet};
use pmuctl_common::regs::{Cntkctl, PMUSERENR_CYCLE_ACCESS, PmCounters, Pmcr, Pmuserenr};
use std::arch::asm;
use std::sync::Arc;

macro_rules! read_sysreg {
    ($reg:literal) => {{
        let val: u64;
        // SAFETY: reading a system register has no memory side effects.
        unsafe {
            asm!(concat!("mrs {}, ", $reg), out(reg) val, options(nomem, nostack, preserves_flags));
        }
        val
    }};
}

macro_rules! write_sysreg {
    ($reg:literal, $val:expr) => {{
        let val: u64 = $val;
        // SAFETY: the registers written here only gate EL0 access to
        // counters and start or stop the cycle counter.
        unsafe {
            asm!(concat!("msr ", $reg, ", {}"), in(reg) val, options(nostack, preserves_flags));
        }
    }};
}

#[inline(always)]
fn isb() {
    // SAFETY: instruction barrier only.
    unsafe { asm!("isb", options(nostack, preserves_flags)) }
}

/// PMCCNTR_EL0 EL0 access on the executing CPU.
#[derive(Debug, Default)]
pub struct CycleCounter;

impl Register for CycleCounter {
    fn apply(&self, enable: bool) {
        if enable {
            // No overflow interrupt for the cycle counter.
            write_sysreg!("pmintenclr_el1", PmCounters::C.bits());
            write_sysreg!("pmcntenset_el0", PmCounters::C.bits());
            write_sysreg!("pmuserenr_el0", PMUSERENR_CYCLE_ACCESS.bits());
            // Reset and start.
            let pmcr = Pmcr::from_bits_retain(read_sysreg!("pmcr_el0")).start_cycle_counter();
            isb();
            write_sysreg!("pmcr_el0", pmcr.bits());
        } else {
            write_sysreg!("pmcntenclr_el0", PmCounters::C.bits());
            write_sysreg!("pmuserenr_el0", 0);
        }
        isb();
    }

    fn status(&self) -> bool {
        Pmuserenr::from_bits_retain(read_sysreg!("pmuserenr_el0")).cycle_access()
    }
}

/// CNTKCTL_EL1 timer EL0 access on the executing CPU.
#[derive(Debug, Default)]
pub struct TimerControl;

impl Register for TimerControl {
    fn apply(&self, enable: bool) {
        let current = Cntkctl::from_bits_retain(read_sysreg!("cntkctl_el1"));
        isb();
        let next = if enable {
            current.grant_el0_timer()
        } else {
            current.revoke_el0_timer()
        };
        write_sysreg!("cntkctl_el1", next.bits());
    }

    fn status(&self) -> bool {
        Cntkctl::from_bits_retain(read_sysreg!("cntkctl_el1")).el0_timer_access()
    }
}

/// Backend factory for the arm64 registers.
pub fn create_backend(_ctx: &BackendContext) -> Result<RegisterSet, BackendError> {
    Ok(RegisterSet {
        pmccntr: Arc::new(CycleCounter),
        cntkctl: Arc::new(TimerControl),
    })
}
