//! Register backend implementations.
//!
//! - [`simulation`] - Per-CPU software register files for development and testing
//! - [`arm64`] - Real ARMv8 system registers (aarch64 only, needs EL1)
//!
//! # Adding New Backends
//!
//! 1. Create a new submodule under `backends/`
//! 2. Provide a factory returning a `RegisterSet`
//! 3. Register it in [`register_all_backends`]

#[cfg(target_arch = "aarch64")]
pub mod arm64;
pub mod simulation;

use crate::backend_registry::BackendRegistry;

/// Register every backend built for this target.
pub fn register_all_backends(registry: &mut BackendRegistry) {
    registry.register("simulation", simulation::create_backend);

    #[cfg(target_arch = "aarch64")]
    registry.register("arm64", arm64::create_backend);
}
