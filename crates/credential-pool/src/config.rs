//! Acquisition options
//!
//! Deserializable from the service's TOML config; also usable as a plain
//! struct by library consumers. Per-request overrides on `AcquireRequest`
//! take precedence over these defaults.

use std::time::Duration;

use serde::Deserialize;

/// Tunables governing acquisition.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PoolOptions {
    /// Ignore caller-supplied cookies and always draw from the pool.
    pub force_pool_source: bool,
    /// Build+probe attempts per logical operation. Must be at least 1.
    pub max_tries: u32,
    /// Probe each selected credential before handing it out.
    pub validate_on_acquire: bool,
    /// Upper bound for a single probe round-trip, in seconds.
    pub probe_timeout_secs: u64,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            force_pool_source: false,
            max_tries: 3,
            validate_on_acquire: true,
            probe_timeout_secs: 10,
        }
    }
}

impl PoolOptions {
    /// Reject values the retry loop cannot work with.
    pub fn validate(&self) -> common::Result<()> {
        if self.max_tries == 0 {
            return Err(common::Error::Config("max_tries must be at least 1".into()));
        }
        if self.probe_timeout_secs == 0 {
            return Err(common::Error::Config(
                "probe_timeout_secs must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        let options = PoolOptions::default();
        assert!(options.validate().is_ok());
        assert!(!options.force_pool_source);
        assert_eq!(options.max_tries, 3);
        assert!(options.validate_on_acquire);
        assert_eq!(options.probe_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let options: PoolOptions = toml::from_str("max_tries = 5").unwrap();
        assert_eq!(options.max_tries, 5);
        assert!(options.validate_on_acquire);
        assert_eq!(options.probe_timeout_secs, 10);
    }

    #[test]
    fn zero_max_tries_rejected() {
        let options: PoolOptions = toml::from_str("max_tries = 0").unwrap();
        assert!(options.validate().is_err());
    }

    #[test]
    fn zero_probe_timeout_rejected() {
        let options: PoolOptions = toml::from_str("probe_timeout_secs = 0").unwrap();
        assert!(options.validate().is_err());
    }

    #[test]
    fn unknown_field_rejected() {
        let result: std::result::Result<PoolOptions, _> = toml::from_str("cooldown_secs = 60");
        assert!(result.is_err(), "there is no cooldown in this pool");
    }
}
