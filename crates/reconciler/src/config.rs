//! Controller configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is a valid
//! configuration:
//!
//! ```toml
//! workers = 4
//! max_retries = 10
//! cache_sync_timeout_secs = 30
//!
//! [rate_limit]
//! base_delay_ms = 5
//! max_delay_secs = 1000
//! qps = 10.0
//! burst = 100
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Configuration for the controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    /// Number of concurrent workers.
    pub workers: usize,
    /// Failed reconciles of a key are requeued this many times before the key
    /// is dropped.
    pub max_retries: u32,
    /// Startup deadline for every informer cache to sync.
    pub cache_sync_timeout_secs: u64,
    /// Requeue backoff.
    pub rate_limit: RateLimitConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            max_retries: 10,
            cache_sync_timeout_secs: 30,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// Requeue backoff: the larger of a per-key exponential delay and an overall
/// token bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitConfig {
    pub base_delay_ms: u64,
    pub max_delay_secs: u64,
    pub qps: f64,
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 5,
            max_delay_secs: 1000,
            qps: 10.0,
            burst: 100,
        }
    }
}

impl RateLimitConfig {
    pub const fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub const fn max_delay(&self) -> Duration {
        Duration::from_secs(self.max_delay_secs)
    }
}

impl ControllerConfig {
    /// Parse a TOML document and validate it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigLoad`] for malformed TOML or unknown keys and
    /// [`Error::InvalidConfig`] for out-of-range values.
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: Self = toml::from_str(input)
            .map_err(|e| Error::config_load(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigLoad`] if the file cannot be read or parsed and
    /// [`Error::InvalidConfig`] for out-of-range values.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config_load(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&content)
    }

    /// Check value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(Error::invalid_config("workers must be at least 1"));
        }
        if self.cache_sync_timeout_secs == 0 {
            return Err(Error::invalid_config(
                "cache_sync_timeout_secs must be at least 1",
            ));
        }
        if !(self.rate_limit.qps.is_finite() && self.rate_limit.qps > 0.0) {
            return Err(Error::invalid_config("rate_limit.qps must be positive"));
        }
        if self.rate_limit.burst == 0 {
            return Err(Error::invalid_config("rate_limit.burst must be at least 1"));
        }
        if self.rate_limit.base_delay() > self.rate_limit.max_delay() {
            return Err(Error::invalid_config(
                "rate_limit.base_delay_ms must not exceed rate_limit.max_delay_secs",
            ));
        }
        Ok(())
    }

    pub const fn cache_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_sync_timeout_secs)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ControllerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workers, 2);
        assert_eq!(config.max_retries, 10);
        assert_eq!(config.rate_limit.base_delay(), Duration::from_millis(5));
        assert_eq!(config.rate_limit.max_delay(), Duration::from_secs(1000));
    }

    #[test]
    fn test_empty_document_yields_defaults() -> Result<()> {
        assert_eq!(ControllerConfig::from_toml_str("")?, ControllerConfig::default());
        Ok(())
    }

    #[test]
    fn test_partial_document_overrides_fields() -> Result<()> {
        let config = ControllerConfig::from_toml_str(
            "workers = 8\n\n[rate_limit]\nqps = 50.0\n",
        )?;
        assert_eq!(config.workers, 8);
        assert_eq!(config.max_retries, 10);
        assert!((config.rate_limit.qps - 50.0).abs() < f64::EPSILON);
        assert_eq!(config.rate_limit.burst, 100);
        Ok(())
    }

    #[test]
    fn test_zero_workers_is_rejected() {
        let result = ControllerConfig::from_toml_str("workers = 0");
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_non_positive_qps_is_rejected() {
        let result = ControllerConfig::from_toml_str("[rate_limit]\nqps = 0.0");
        assert!(matches!(result, Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let result = ControllerConfig::from_toml_str("threads = 4");
        assert!(matches!(result, Err(Error::ConfigLoad { .. })));
    }

    #[test]
    fn test_from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "max_retries = 3").unwrap();

        let config = ControllerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_retries, 3);
    }

    #[test]
    fn test_from_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = ControllerConfig::from_file(&dir.path().join("missing.toml"));
        assert!(matches!(result, Err(Error::ConfigLoad { .. })));
    }
}
