//! Core error types for the App controller.
//!
//! All errors are explicit, typed, and recoverable - no panics allowed.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    // Identity errors
    #[error("invalid resource key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    // Scheme errors
    #[error("kind '{kind}' is not registered in the scheme")]
    UnknownKind { kind: String },

    #[error("apiVersion '{api_version}' does not serve kind '{kind}' (expected '{expected}')")]
    ApiVersionMismatch {
        api_version: String,
        kind: String,
        expected: String,
    },

    #[error("{kind} '{name}' has no uid; it was never persisted")]
    MissingUid { kind: String, name: String },

    // Parsing errors
    #[error("YAML parse error: {reason}")]
    YamlParseFailed { reason: String },

    #[error("JSON parse error: {reason}")]
    JsonParseFailed { reason: String },

    #[error("invalid manifest: {reason}")]
    InvalidManifest { reason: String },
}

impl Error {
    /// Create an invalid key error.
    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create an unknown kind error.
    pub fn unknown_kind(kind: impl Into<String>) -> Self {
        Self::UnknownKind { kind: kind.into() }
    }

    /// Create a missing uid error.
    pub fn missing_uid(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::MissingUid {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a YAML parse error.
    pub fn yaml_parse_failed(reason: impl Into<String>) -> Self {
        Self::YamlParseFailed {
            reason: reason.into(),
        }
    }

    /// Create a JSON parse error.
    pub fn json_parse_failed(reason: impl Into<String>) -> Self {
        Self::JsonParseFailed {
            reason: reason.into(),
        }
    }

    /// Create an invalid manifest error.
    pub fn invalid_manifest(reason: impl Into<String>) -> Self {
        Self::InvalidManifest {
            reason: reason.into(),
        }
    }
}
