//! Error types for the reconciler crate.

use std::time::Duration;

use app_core::Kind;
use thiserror::Error;

/// Result type alias for reconciler operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Reconciler error types.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// Queue key could not be split into namespace and name.
    #[error("invalid resource key: {0}")]
    InvalidKey(app_core::Error),

    /// A dependent with the desired name exists but is controlled by
    /// something else.
    #[error("Resource \"{name}\" already exists and is not managed by App")]
    Conflict { kind: Kind, name: String },

    /// Remote API call failed.
    #[error("api error: {0}")]
    Api(#[from] app_events::Error),

    /// Building desired state failed.
    #[error(transparent)]
    Core(#[from] app_core::Error),

    /// Caches did not sync before the startup deadline.
    #[error("timed out after {timeout:?} waiting for caches to sync (pending: {pending:?})")]
    CacheSyncTimeout { timeout: Duration, pending: Vec<Kind> },

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    /// Configuration file could not be read or parsed.
    #[error("failed to load configuration: {reason}")]
    ConfigLoad { reason: String },
}

impl Error {
    /// Create a conflict error.
    pub fn conflict(kind: Kind, name: impl Into<String>) -> Self {
        Self::Conflict {
            kind,
            name: name.into(),
        }
    }

    /// Create an invalid config error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create a config load error.
    pub fn config_load(reason: impl Into<String>) -> Self {
        Self::ConfigLoad {
            reason: reason.into(),
        }
    }

    /// Whether a failed reconcile should be requeued.
    ///
    /// Malformed keys never become valid, everything else may clear up on a
    /// later attempt.
    pub const fn is_retryable(&self) -> bool {
        !matches!(self, Self::InvalidKey(_))
    }
}
