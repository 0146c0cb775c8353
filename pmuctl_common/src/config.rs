//! Configuration loading traits and types.
//!
//! pmuctl reads a single TOML file. Every field has a default, so an empty
//! file (or no file at all) yields a simulation setup with every control
//! disabled.
//!
//! # Usage
//!
//! ```rust,no_run
//! use pmuctl_common::config::{ConfigLoader, PmuctlFileConfig, ConfigError};
//! use std::path::Path;
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config = PmuctlFileConfig::load(Path::new("pmuctl.toml"))?;
//!     config.validate()?;
//!     println!("Backend: {}", config.pmuctl.backend);
//!     Ok(())
//! }
//! ```

use crate::consts::{
    ControlId, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, MIN_PAGE_SIZE, PMUCTL_SERVICE_NAME,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Common configuration fields.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "pmuctl"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: default_service_name(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if `service_name` is empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_service_name() -> String {
    PMUCTL_SERVICE_NAME.to_string()
}

/// Register backends understood by the `backend` key.
pub const KNOWN_BACKENDS: &[&str] = &["simulation", "arm64"];

/// Backends that write the registers of the CPU they run on. They must
/// broadcast to every CPU in the affinity mask with pinned workers.
pub const HARDWARE_BACKENDS: &[&str] = &["arm64"];

/// `[pmuctl]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PmuctlConfig {
    /// Register backend name ("simulation" or "arm64").
    #[serde(default = "default_backend")]
    pub backend: String,

    /// Number of CPUs to broadcast to. 0 = every CPU in the affinity mask.
    #[serde(default)]
    pub cpus: usize,

    /// Pin broadcast workers to their CPU.
    #[serde(default = "default_true")]
    pub pin_threads: bool,

    /// Textual protocol buffer cap in bytes.
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Controls enabled right after the start-up reset.
    #[serde(default)]
    pub enable_on_start: Vec<String>,
}

impl Default for PmuctlConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            cpus: 0,
            pin_threads: true,
            page_size: DEFAULT_PAGE_SIZE,
            enable_on_start: Vec::new(),
        }
    }
}

impl PmuctlConfig {
    /// Validate the section.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `backend` is not a known backend
    /// - a hardware backend is combined with `cpus != 0` or unpinned workers
    /// - `page_size` is outside `MIN_PAGE_SIZE..=MAX_PAGE_SIZE`
    /// - `enable_on_start` names an unknown control or repeats one
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !KNOWN_BACKENDS.contains(&self.backend.as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "unknown backend '{}' (expected one of {:?})",
                self.backend, KNOWN_BACKENDS
            )));
        }

        if HARDWARE_BACKENDS.contains(&self.backend.as_str()) {
            if self.cpus != 0 {
                return Err(ConfigError::ValidationError(format!(
                    "backend '{}' broadcasts to every CPU; cpus must be 0, got {}",
                    self.backend, self.cpus
                )));
            }
            if !self.pin_threads {
                return Err(ConfigError::ValidationError(format!(
                    "backend '{}' requires pin_threads = true",
                    self.backend
                )));
            }
        }

        if !(MIN_PAGE_SIZE..=MAX_PAGE_SIZE).contains(&self.page_size) {
            return Err(ConfigError::ValidationError(format!(
                "page_size {} out of range [{MIN_PAGE_SIZE}, {MAX_PAGE_SIZE}]",
                self.page_size
            )));
        }

        let mut seen = Vec::with_capacity(self.enable_on_start.len());
        for name in &self.enable_on_start {
            let id = ControlId::from_name(name).ok_or_else(|| {
                ConfigError::ValidationError(format!("enable_on_start: unknown control '{name}'"))
            })?;
            if seen.contains(&id) {
                return Err(ConfigError::ValidationError(format!(
                    "enable_on_start: duplicate control '{name}'"
                )));
            }
            seen.push(id);
        }

        Ok(())
    }

    /// Controls listed in `enable_on_start`, in file order.
    ///
    /// Unknown names are skipped; call [`validate`](Self::validate) first.
    pub fn startup_controls(&self) -> Vec<ControlId> {
        self.enable_on_start
            .iter()
            .filter_map(|name| ControlId::from_name(name))
            .collect()
    }
}

fn default_backend() -> String {
    "simulation".to_string()
}

fn default_true() -> bool {
    true
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

/// Whole `pmuctl.toml` file.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "info"
///
/// [pmuctl]
/// backend = "arm64"
/// enable_on_start = ["PMCCNTR"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PmuctlFileConfig {
    /// `[shared]` section.
    #[serde(default)]
    pub shared: SharedConfig,

    /// `[pmuctl]` section.
    #[serde(default)]
    pub pmuctl: PmuctlConfig,
}

impl PmuctlFileConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.pmuctl.validate()
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}
