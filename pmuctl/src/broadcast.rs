//! Broadcast executors: run a closure once on every CPU and wait.
//!
//! The executor is injected into every control so the registry can be
//! exercised without real multi-core fan-out. Per-CPU backends find out
//! which copy they act on through [`current_cpu`].

use nix::sched::{CpuSet, sched_getaffinity, sched_setaffinity};
use nix::unistd::Pid;
use pmuctl_common::error::PmuError;
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use thiserror::Error;
use tracing::{debug, error, warn};

thread_local! {
    static CURRENT_CPU: Cell<usize> = const { Cell::new(0) };
}

/// Index of the CPU slot the calling thread acts for.
///
/// Broadcast workers report their slot; every other thread reports 0.
pub fn current_cpu() -> usize {
    CURRENT_CPU.with(Cell::get)
}

/// Run `f` with [`current_cpu`] reporting `slot`.
pub fn with_cpu<R>(slot: usize, f: impl FnOnce() -> R) -> R {
    let previous = CURRENT_CPU.with(|cpu| cpu.replace(slot));
    let result = f();
    CURRENT_CPU.with(|cpu| cpu.set(previous));
    result
}

/// Errors raised while building an executor.
#[derive(Debug, Clone, Error)]
pub enum BroadcastError {
    /// The affinity mask could not be read.
    #[error("Failed to read CPU affinity: {0}")]
    Affinity(String),

    /// No CPU is available to broadcast to.
    #[error("No CPUs available for broadcast")]
    NoCpus,
}

/// Runs an operation on every processor and blocks until all are done.
///
/// There is no timeout: a CPU that never finishes stalls the caller.
pub trait BroadcastExecutor: Send + Sync {
    /// Number of CPU slots an operation is run on.
    fn cpu_count(&self) -> usize;

    /// Run `op` exactly once per CPU slot and return when all have finished.
    ///
    /// # Errors
    /// `PmuError::BroadcastIncomplete` if some slot could not run `op` on
    /// its CPU. The slots that could still ran it.
    fn on_each_cpu(&self, op: &(dyn Fn() + Sync)) -> Result<(), PmuError>;
}

/// Executor for a single CPU: runs the operation inline.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleCore;

impl BroadcastExecutor for SingleCore {
    fn cpu_count(&self) -> usize {
        1
    }

    fn on_each_cpu(&self, op: &(dyn Fn() + Sync)) -> Result<(), PmuError> {
        with_cpu(0, op);
        Ok(())
    }
}

/// Executor that spawns one scoped thread per CPU.
///
/// With pinning enabled each worker is bound to its CPU through
/// `sched_setaffinity` before running the operation, and a worker that
/// cannot be pinned or spawned skips it and fails the broadcast. Unpinned
/// slots only select a [`current_cpu`] index, so a failed spawn runs the
/// slot on the caller.
#[derive(Debug, Clone)]
pub struct ThreadPerCpu {
    /// Logical CPU numbers, one per slot.
    cpus: Vec<usize>,
    /// Pin workers to their CPU.
    pin: bool,
}

impl ThreadPerCpu {
    /// Executor over explicit logical CPU numbers.
    pub fn new(cpus: Vec<usize>, pin: bool) -> Result<Self, BroadcastError> {
        if cpus.is_empty() {
            return Err(BroadcastError::NoCpus);
        }
        Ok(Self { cpus, pin })
    }

    /// Unpinned executor with `count` slots.
    pub fn with_count(count: usize) -> Result<Self, BroadcastError> {
        Self::new((0..count).collect(), false)
    }

    /// Executor over every CPU in the process affinity mask.
    pub fn online(pin: bool) -> Result<Self, BroadcastError> {
        Self::new(affinity_cpus()?, pin)
    }

    /// Executor for a configured CPU count (0 = every CPU in the mask).
    ///
    /// When more CPUs are requested than the mask holds, pinning is dropped
    /// and the slots are simulated.
    pub fn from_config(cpus: usize, pin: bool) -> Result<Self, BroadcastError> {
        if cpus == 0 {
            return Self::online(pin);
        }

        let available = affinity_cpus()?;
        if available.len() >= cpus {
            Self::new(available.into_iter().take(cpus).collect(), pin)
        } else {
            if pin {
                warn!(
                    "Requested {} CPUs but only {} are in the affinity mask; pinning disabled",
                    cpus,
                    available.len()
                );
            }
            Self::with_count(cpus)
        }
    }

    /// Logical CPU numbers the executor broadcasts to.
    pub fn cpus(&self) -> &[usize] {
        &self.cpus
    }

    /// Whether workers are pinned.
    pub fn is_pinned(&self) -> bool {
        self.pin
    }
}

impl BroadcastExecutor for ThreadPerCpu {
    fn cpu_count(&self) -> usize {
        self.cpus.len()
    }

    fn on_each_cpu(&self, op: &(dyn Fn() + Sync)) -> Result<(), PmuError> {
        let pin = self.pin;
        let reached = AtomicUsize::new(0);
        thread::scope(|scope| {
            for (slot, &cpu) in self.cpus.iter().enumerate() {
                let reached = &reached;
                let work = move || {
                    if pin {
                        if let Err(e) = pin_current_thread(cpu) {
                            error!("Failed to pin broadcast worker to CPU {}: {}", cpu, e);
                            return;
                        }
                    }
                    with_cpu(slot, op);
                    reached.fetch_add(1, Ordering::SeqCst);
                };

                let spawned = thread::Builder::new()
                    .name(format!("pmuctl-cpu{cpu}"))
                    .spawn_scoped(scope, work);
                if let Err(e) = spawned {
                    if pin {
                        error!("Failed to spawn worker for CPU {}: {}", cpu, e);
                    } else {
                        warn!("Failed to spawn worker for slot {}: {}; running inline", slot, e);
                        with_cpu(slot, op);
                        reached.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        });

        let reached = reached.into_inner();
        let total = self.cpus.len();
        if reached != total {
            return Err(PmuError::BroadcastIncomplete { reached, total });
        }
        debug!("Broadcast completed on {} CPUs", total);
        Ok(())
    }
}

/// Logical CPUs in the calling process's affinity mask.
fn affinity_cpus() -> Result<Vec<usize>, BroadcastError> {
    let mask = sched_getaffinity(Pid::from_raw(0))
        .map_err(|e| BroadcastError::Affinity(e.to_string()))?;
    let cpus: Vec<usize> = (0..CpuSet::count())
        .filter(|&cpu| mask.is_set(cpu).unwrap_or(false))
        .collect();
    if cpus.is_empty() {
        return Err(BroadcastError::NoCpus);
    }
    Ok(cpus)
}

/// Bind the calling thread to one CPU.
fn pin_current_thread(cpu: usize) -> nix::Result<()> {
    let mut cpuset = CpuSet::new();
    cpuset.set(cpu)?;
    sched_setaffinity(Pid::from_raw(0), &cpuset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn single_core_runs_once_on_slot_zero() {
        let calls = AtomicUsize::new(0);
        SingleCore
            .on_each_cpu(&|| {
                assert_eq!(current_cpu(), 0);
                calls.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(SingleCore.cpu_count(), 1);
    }

    #[test]
    fn thread_per_cpu_visits_every_slot_once() {
        let exec = ThreadPerCpu::with_count(6).unwrap();
        let seen = Mutex::new(Vec::new());
        exec.on_each_cpu(&|| seen.lock().unwrap().push(current_cpu()))
            .unwrap();

        let mut seen = seen.into_inner().unwrap();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn caller_slot_is_restored() {
        with_cpu(3, || {
            assert_eq!(current_cpu(), 3);
            with_cpu(1, || assert_eq!(current_cpu(), 1));
            assert_eq!(current_cpu(), 3);
        });
        assert_eq!(current_cpu(), 0);
    }

    #[test]
    fn empty_cpu_list_rejected() {
        assert!(matches!(
            ThreadPerCpu::new(Vec::new(), false),
            Err(BroadcastError::NoCpus)
        ));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn pinned_executor_over_affinity_mask() {
        let exec = ThreadPerCpu::online(true).unwrap();
        assert!(exec.cpu_count() >= 1);
        assert!(exec.is_pinned());

        let cpus = exec.cpus().to_vec();
        let misplaced = AtomicUsize::new(0);
        exec.on_each_cpu(&|| {
            // Each worker's mask holds exactly the CPU of its slot.
            let mask = sched_getaffinity(Pid::from_raw(0)).unwrap();
            let mine = cpus[current_cpu()];
            let only_mine = (0..CpuSet::count())
                .all(|cpu| mask.is_set(cpu).unwrap_or(false) == (cpu == mine));
            if !only_mine {
                misplaced.fetch_add(1, Ordering::SeqCst);
            }
        })
        .unwrap();
        assert_eq!(misplaced.load(Ordering::SeqCst), 0);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn unpinnable_cpu_fails_the_broadcast() {
        let online = affinity_cpus().unwrap()[0];
        let exec = ThreadPerCpu::new(vec![online, CpuSet::count()], true).unwrap();

        let calls = AtomicUsize::new(0);
        let result = exec.on_each_cpu(&|| {
            calls.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(
            result,
            Err(PmuError::BroadcastIncomplete { reached: 1, total: 2 })
        );
        // The reachable CPU still ran, the other one never did.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unpinned_slots_never_fail() {
        let exec = ThreadPerCpu::new(vec![CpuSet::count(), CpuSet::count() + 1], false).unwrap();
        let calls = AtomicUsize::new(0);
        exec.on_each_cpu(&|| {
            calls.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn oversubscribed_config_falls_back_to_unpinned() {
        let exec = ThreadPerCpu::from_config(8192, true).unwrap();
        assert_eq!(exec.cpu_count(), 8192);
        assert!(!exec.is_pinned());
    }
}
