//! pmuctl lifecycle.
//!
//! `PmuCtl` owns the dispatcher (registry + token) and the timer control.
//! Start-up forces every control to Disabled before serving requests and
//! optionally enables the configured ones; shutdown forces Disabled again,
//! exactly once, whether called explicitly or from `Drop`.

use crate::backend_registry::{BackendContext, BackendRegistry};
use crate::broadcast::{BroadcastExecutor, ThreadPerCpu};
use crate::dispatch::Dispatcher;
use crate::error::PmuCtlError;
use crate::node::DeviceNode;
use crate::register::RegisterSet;
use crate::registry::ControlRegistry;
use crate::timer::TimerControl;
use pmuctl_common::config::PmuctlConfig;
use pmuctl_common::consts::ControlId;
use pmuctl_common::error::PmuError;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info};

/// The running control registry and its protocols.
pub struct PmuCtl {
    dispatcher: Dispatcher,
    timer: Arc<TimerControl>,
    cpus: usize,
    shut_down: AtomicBool,
}

impl PmuCtl {
    /// Build from configuration and start.
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid, the executor or
    /// backend cannot be created, or a start-up control cannot be enabled.
    pub fn start(config: &PmuctlConfig, backends: &BackendRegistry) -> Result<Self, PmuCtlError> {
        config.validate()?;

        let executor = ThreadPerCpu::from_config(config.cpus, config.pin_threads)?;
        info!(
            "Broadcasting to CPUs {:?} (pinned: {})",
            executor.cpus(),
            executor.is_pinned()
        );

        let ctx = BackendContext {
            cpus: executor.cpu_count(),
        };
        let registers = backends.create(&config.backend, &ctx)?;
        info!("Using '{}' register backend", config.backend);

        let pmuctl = Self::from_parts(registers, Arc::new(executor), config.page_size);
        pmuctl.init(&config.startup_controls())?;
        Ok(pmuctl)
    }

    /// Assemble without touching the hardware. Call [`init`](Self::init)
    /// before serving requests.
    pub fn from_parts(
        registers: RegisterSet,
        executor: Arc<dyn BroadcastExecutor>,
        page_size: usize,
    ) -> Self {
        let cpus = executor.cpu_count();
        let (registry, timer) = ControlRegistry::standard(registers, executor);
        Self {
            dispatcher: Dispatcher::with_page_size(registry, page_size),
            timer,
            cpus,
            shut_down: AtomicBool::new(false),
        }
    }

    /// Force every control to Disabled, then enable `startup` controls.
    pub fn init(&self, startup: &[ControlId]) -> Result<(), PmuError> {
        self.dispatcher.reset_all()?;
        for id in startup {
            self.dispatcher.set(id.name(), true)?;
        }
        info!(
            "pmuctl initialized: {} controls, {} CPUs",
            self.dispatcher.registry().len(),
            self.cpus
        );
        Ok(())
    }

    /// The protocol dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Device-node entry points.
    pub fn device(&self) -> DeviceNode<'_> {
        DeviceNode::new(&self.dispatcher)
    }

    /// Number of CPUs broadcasts reach.
    pub fn cpu_count(&self) -> usize {
        self.cpus
    }

    /// Grant or revoke EL0 timer access on every CPU.
    pub fn timer_control_set(&self, enable: bool) -> Result<(), PmuError> {
        self.dispatcher.with_token(|_| self.timer.set(enable))
    }

    /// Revoke EL0 timer access on every CPU.
    pub fn timer_control_teardown(&self) -> Result<(), PmuError> {
        self.dispatcher.with_token(|_| self.timer.teardown())
    }

    /// One-line timer status into `buf`; returns bytes written.
    pub fn timer_control_status(&self, buf: &mut [u8]) -> usize {
        self.dispatcher.with_token(|_| self.timer.status(buf))
    }

    /// Parse and apply a textual timer value.
    pub fn timer_control_update(&self, raw: &[u8]) -> Result<(), PmuError> {
        self.dispatcher.with_token(|_| self.timer.update(raw))
    }

    /// Force every control to Disabled. Runs once; later calls are no-ops.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        match self.dispatcher.reset_all() {
            Ok(()) => info!("pmuctl shut down, all controls disabled"),
            Err(e) => error!("pmuctl shut down, controls may be left enabled: {}", e),
        }
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }
}

impl Drop for PmuCtl {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::simulation::SimulatedMachine;

    fn pmuctl(cpus: usize) -> (Arc<SimulatedMachine>, PmuCtl) {
        let machine = SimulatedMachine::new(cpus);
        let exec = Arc::new(ThreadPerCpu::with_count(cpus).unwrap());
        let pmuctl = PmuCtl::from_parts(machine.registers(), exec, 4096);
        (machine, pmuctl)
    }

    #[test]
    fn init_forces_disabled_then_enables_startup() {
        let (machine, pmuctl) = pmuctl(2);
        // Dirty state left behind by someone else.
        machine.registers().cntkctl.apply(true);

        pmuctl.init(&[ControlId::Pmccntr]).unwrap();
        assert_eq!(machine.pmccntr_states(), vec![true; 2]);
        assert_eq!(machine.cntkctl_states(), vec![false; 2]);
    }

    #[test]
    fn shutdown_runs_once() {
        let (machine, pmuctl) = pmuctl(2);
        pmuctl.init(&[]).unwrap();
        pmuctl.dispatcher().set("PMCCNTR", true).unwrap();
        let writes_before = machine.write_counts();

        pmuctl.shutdown();
        assert!(pmuctl.is_shut_down());
        assert_eq!(machine.pmccntr_states(), vec![false; 2]);

        let after_first = machine.write_counts();
        assert!(after_first.iter().zip(&writes_before).all(|(a, b)| a > b));

        pmuctl.shutdown();
        drop(pmuctl);
        assert_eq!(machine.write_counts(), after_first);
    }

    #[test]
    fn drop_restores_disabled() {
        let (machine, pmuctl) = pmuctl(3);
        pmuctl.init(&[ControlId::Pmccntr, ControlId::Cntkctl]).unwrap();
        drop(pmuctl);
        assert_eq!(machine.pmccntr_states(), vec![false; 3]);
        assert_eq!(machine.cntkctl_states(), vec![false; 3]);
    }

    #[test]
    fn timer_entry_points() {
        let (machine, pmuctl) = pmuctl(2);
        pmuctl.timer_control_set(true).unwrap();
        assert_eq!(machine.cntkctl_states(), vec![true; 2]);

        let mut buf = [0u8; 32];
        let len = pmuctl.timer_control_status(&mut buf);
        assert_eq!(&buf[..len], b"CNTKCTL EL0 access = 1\n");

        pmuctl.timer_control_update(b"0").unwrap();
        assert_eq!(machine.cntkctl_states(), vec![false; 2]);
        assert!(pmuctl.timer_control_update(b"x").is_err());

        pmuctl.timer_control_set(true).unwrap();
        pmuctl.timer_control_teardown().unwrap();
        assert_eq!(machine.cntkctl_states(), vec![false; 2]);
        assert_eq!(
            pmuctl.dispatcher().read_snapshot(4096).unwrap(),
            "PMCCNTR=0\nCNTKCTL=0\n"
        );
    }

    #[test]
    fn start_from_config() {
        let config = PmuctlConfig {
            cpus: 2,
            pin_threads: false,
            enable_on_start: vec!["CNTKCTL".to_string()],
            ..Default::default()
        };
        let pmuctl = PmuCtl::start(&config, &BackendRegistry::with_builtin()).unwrap();
        assert_eq!(pmuctl.cpu_count(), 2);
        assert_eq!(pmuctl.dispatcher().status("CNTKCTL"), Ok(Some(true)));
        assert_eq!(pmuctl.dispatcher().status("PMCCNTR"), Ok(Some(false)));
    }

    #[test]
    fn start_rejects_bad_config() {
        let config = PmuctlConfig {
            backend: "nope".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            PmuCtl::start(&config, &BackendRegistry::with_builtin()),
            Err(PmuCtlError::Config(_))
        ));
    }

    #[test]
    fn start_rejects_partial_hardware_broadcast() {
        for (cpus, pin_threads) in [(1, false), (1, true), (0, false)] {
            let config = PmuctlConfig {
                backend: "arm64".to_string(),
                cpus,
                pin_threads,
                ..Default::default()
            };
            assert!(matches!(
                PmuCtl::start(&config, &BackendRegistry::with_builtin()),
                Err(PmuCtlError::Config(_))
            ));
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn init_reports_unreached_cpus() {
        let machine = SimulatedMachine::new(1);
        let unreachable = nix::sched::CpuSet::count();
        let exec = Arc::new(ThreadPerCpu::new(vec![unreachable], true).unwrap());
        let pmuctl = PmuCtl::from_parts(machine.registers(), exec, 4096);

        assert_eq!(
            pmuctl.init(&[]),
            Err(PmuError::BroadcastIncomplete { reached: 0, total: 1 })
        );
        assert_eq!(machine.write_counts(), vec![0]);
    }
}
