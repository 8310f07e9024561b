//! Error types for the events crate.

use app_core::{Kind, ObjectKey};
use thiserror::Error;

/// Result type alias for store and recorder operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Object store, watch and recorder errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Object does not exist.
    #[error("{kind} '{key}' not found")]
    NotFound { kind: Kind, key: ObjectKey },

    /// Create of an object whose key is taken.
    #[error("{kind} '{key}' already exists")]
    AlreadyExists { kind: Kind, key: ObjectKey },

    /// Write based on a stale resource version.
    #[error("{kind} '{key}' was modified: expected resource version {expected}, found {actual}")]
    Conflict {
        kind: Kind,
        key: ObjectKey,
        expected: u64,
        actual: u64,
    },

    /// The store could not serve the request right now.
    #[error("{operation} unavailable: {reason}")]
    Unavailable { operation: String, reason: String },

    /// Request was rejected as malformed.
    #[error("invalid request: {reason}")]
    Invalid { reason: String },

    /// Watch consumer fell behind and missed events.
    #[error("watch lagged, {skipped} events dropped")]
    WatchLagged { skipped: u64 },

    /// Watch channel closed.
    #[error("watch channel closed")]
    ChannelClosed,

    /// Event recording failed.
    #[error("failed to record event: {reason}")]
    RecordFailed { reason: String },
}

impl Error {
    /// Create a not found error.
    pub fn not_found(kind: Kind, key: ObjectKey) -> Self {
        Self::NotFound { kind, key }
    }

    /// Create an already exists error.
    pub fn already_exists(kind: Kind, key: ObjectKey) -> Self {
        Self::AlreadyExists { kind, key }
    }

    /// Create an unavailable error.
    pub fn unavailable(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unavailable {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid request error.
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
        }
    }

    /// Create a record failed error.
    pub fn record_failed(reason: impl Into<String>) -> Self {
        Self::RecordFailed {
            reason: reason.into(),
        }
    }

    /// Whether this is a not found error.
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub const fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::not_found(Kind::Deployment, ObjectKey::new("default", "web"));
        assert_eq!(err.to_string(), "Deployment 'default/web' not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_unavailable_display() {
        let err = Error::unavailable("create", "connection refused");
        assert!(err.to_string().contains("create"));
        assert!(err.to_string().contains("connection refused"));
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_already_exists_is_distinguishable() {
        let err = Error::already_exists(Kind::Service, ObjectKey::new("default", "web"));
        assert!(err.is_already_exists());
        assert!(!err.is_not_found());
    }
}
