//! ARMv8 system register bitfields used by the pmuctl controls.
//!
//! Each register gets a `bitflags` type plus the pure value transitions the
//! enable/disable sequences apply. Both the arm64 backend (real `msr`) and
//! the simulation backend (per-CPU atomics) go through these helpers, so the
//! two cannot drift apart.

use bitflags::bitflags;

bitflags! {
    /// PMUSERENR_EL0: Performance Monitors User Enable Register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Pmuserenr: u64 {
        /// EL0 access to all PMU registers.
        const EN = 1 << 0;
        /// EL0 software increment writes.
        const SW = 1 << 1;
        /// EL0 cycle counter reads.
        const CR = 1 << 2;
        /// EL0 event counter reads.
        const ER = 1 << 3;
    }
}

bitflags! {
    /// PMCNTENSET_EL0 / PMCNTENCLR_EL0 / PMINTENSET_EL1 / PMINTENCLR_EL1 layout.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct PmCounters: u64 {
        /// Cycle counter (PMCCNTR_EL0).
        const C = 1 << 31;
    }
}

bitflags! {
    /// PMCR_EL0: Performance Monitors Control Register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Pmcr: u64 {
        /// Enable all counters.
        const E = 1 << 0;
        /// Event counter reset.
        const P = 1 << 1;
        /// Cycle counter reset.
        const C = 1 << 2;
        /// Clock divider.
        const D = 1 << 3;
        /// Export enable.
        const X = 1 << 4;
        /// Disable cycle counter when event counting is prohibited.
        const DP = 1 << 5;
        /// Long cycle counter.
        const LC = 1 << 6;

        // Upper bits (N, IDCODE, IMP) are implementation defined.
        const _ = !0;
    }
}

bitflags! {
    /// CNTKCTL_EL1: Counter-timer Kernel Control Register.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Cntkctl: u64 {
        /// EL0 access to CNTPCT_EL0 and CNTFRQ_EL0.
        const EL0PCTEN = 1 << 0;
        /// EL0 access to CNTVCT_EL0 and CNTFRQ_EL0.
        const EL0VCTEN = 1 << 1;
        /// Event stream enable.
        const EVNTEN = 1 << 2;
        /// Event stream trigger direction.
        const EVNTDIR = 1 << 3;
        /// EL0 access to the virtual timer registers.
        const EL0VTEN = 1 << 8;
        /// EL0 access to the physical timer registers.
        const EL0PTEN = 1 << 9;

        const _ = !0;
    }
}

/// Bits PMUSERENR_EL0 must carry for EL0 cycle counter access.
pub const PMUSERENR_CYCLE_ACCESS: Pmuserenr = Pmuserenr::EN.union(Pmuserenr::CR);

/// PMCR_EL0 bits set when starting the cycle counter.
pub const PMCR_CYCLE_START: Pmcr = Pmcr::E.union(Pmcr::C);

/// CNTKCTL_EL1 bits granting EL0 timer register access.
pub const CNTKCTL_EL0_TIMER_ACCESS: Cntkctl = Cntkctl::EL0PTEN.union(Cntkctl::EL0VTEN);

/// Mask CNTKCTL_EL1 keeps when EL0 timer access is revoked.
pub const CNTKCTL_LOW_BYTE: u64 = 0xFF;

impl Pmcr {
    /// PMCR_EL0 value that starts the cycle counter from zero.
    #[inline]
    pub const fn start_cycle_counter(self) -> Self {
        self.union(PMCR_CYCLE_START)
    }
}

impl Pmuserenr {
    /// True when EL0 may read the cycle counter.
    #[inline]
    pub const fn cycle_access(self) -> bool {
        self.contains(Pmuserenr::EN)
    }
}

impl Cntkctl {
    /// CNTKCTL_EL1 value with EL0 timer access granted.
    #[inline]
    pub const fn grant_el0_timer(self) -> Self {
        self.union(CNTKCTL_EL0_TIMER_ACCESS)
    }

    /// CNTKCTL_EL1 value with EL0 timer access revoked.
    ///
    /// Only the low byte survives, which also clears any event stream
    /// configuration above it.
    #[inline]
    pub const fn revoke_el0_timer(self) -> Self {
        Self::from_bits_retain(self.bits() & CNTKCTL_LOW_BYTE)
    }

    /// True when either EL0 timer access bit is set.
    #[inline]
    pub const fn el0_timer_access(self) -> bool {
        self.intersects(CNTKCTL_EL0_TIMER_ACCESS)
    }
}
