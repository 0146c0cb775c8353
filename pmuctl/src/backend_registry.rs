//! Backend registry for register backends.
//!
//! Maps backend names to factories producing a [`RegisterSet`]. Built at
//! startup and passed by reference; no global state.

use crate::backends::register_all_backends;
use crate::register::RegisterSet;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while creating a backend.
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    /// No backend with this name is registered.
    #[error("Backend not found: {0}")]
    NotFound(String),

    /// The backend exists but cannot run here.
    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

/// What a backend factory gets to know about the system.
#[derive(Debug, Clone, Copy)]
pub struct BackendContext {
    /// CPU slots of the broadcast executor.
    pub cpus: usize,
}

/// Factory function type for creating backends.
pub type BackendFactory = fn(&BackendContext) -> Result<RegisterSet, BackendError>;

/// Registry of available register backends.
pub struct BackendRegistry {
    factories: HashMap<&'static str, BackendFactory>,
}

impl BackendRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry holding every backend built for this target.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        register_all_backends(&mut registry);
        registry
    }

    /// Register a backend factory.
    ///
    /// # Panics
    /// Panics if a backend with the same name is already registered.
    pub fn register(&mut self, name: &'static str, factory: BackendFactory) {
        if self.factories.contains_key(name) {
            panic!("Backend '{name}' is already registered");
        }
        self.factories.insert(name, factory);
    }

    /// Get a backend factory by name.
    pub fn get_factory(&self, name: &str) -> Option<BackendFactory> {
        self.factories.get(name).copied()
    }

    /// Create the registers of backend `name`.
    ///
    /// # Errors
    /// Returns `BackendError::NotFound` if no backend with the given name is
    /// registered, or whatever the factory reports.
    pub fn create(&self, name: &str, ctx: &BackendContext) -> Result<RegisterSet, BackendError> {
        let factory = self
            .get_factory(name)
            .ok_or_else(|| BackendError::NotFound(name.to_string()))?;
        factory(ctx)
    }

    /// List all registered backend names, sorted.
    pub fn list_backends(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.factories.keys().copied().collect();
        names.sort_unstable();
        names
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unavailable(_ctx: &BackendContext) -> Result<RegisterSet, BackendError> {
        Err(BackendError::Unavailable("no hardware".to_string()))
    }

    #[test]
    fn builtin_has_simulation() {
        let reg = BackendRegistry::with_builtin();
        assert!(reg.list_backends().contains(&"simulation"));
        let regs = reg
            .create("simulation", &BackendContext { cpus: 2 })
            .expect("should create");
        assert!(!regs.pmccntr.status());
    }

    #[test]
    fn backend_not_found() {
        let reg = BackendRegistry::new();
        let result = reg.create("nonexistent", &BackendContext { cpus: 1 });
        assert!(matches!(result, Err(BackendError::NotFound(_))));
    }

    #[test]
    fn factory_error_propagates() {
        let mut reg = BackendRegistry::new();
        reg.register("broken", unavailable);
        let result = reg.create("broken", &BackendContext { cpus: 1 });
        assert!(matches!(result, Err(BackendError::Unavailable(_))));
    }

    #[test]
    #[should_panic(expected = "already registered")]
    fn duplicate_panics() {
        let mut reg = BackendRegistry::new();
        reg.register("dup", unavailable);
        reg.register("dup", unavailable);
    }
}
