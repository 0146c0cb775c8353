//! Start-up errors of the pmuctl core.

use crate::backend_registry::BackendError;
use crate::broadcast::BroadcastError;
use pmuctl_common::config::ConfigError;
use pmuctl_common::error::PmuError;
use thiserror::Error;

/// Errors raised while building or starting [`PmuCtl`](crate::core::PmuCtl).
#[derive(Debug, Error)]
pub enum PmuCtlError {
    /// Configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Register backend could not be created.
    #[error(transparent)]
    Backend(#[from] BackendError),

    /// Broadcast executor could not be created.
    #[error(transparent)]
    Broadcast(#[from] BroadcastError),

    /// A start-up control request failed.
    #[error(transparent)]
    Control(#[from] PmuError),
}
