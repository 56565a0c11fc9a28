//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults. The
//! pool options live under `[pool]` and are the same struct library
//! consumers use, so a worker process and this monitor can share one file.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use credential_pool::PoolOptions;
use serde::Deserialize;

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pool: PoolOptions,
    #[serde(default)]
    pub sweep: SweepConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
}

/// HTTP listener settings
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// Credential database location
#[derive(Debug, Deserialize)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

/// Background validation sweep settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 900,
        }
    }
}

/// Reference-factory probe settings
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    /// Probe every platform against one fixed URL instead of the
    /// per-platform defaults (staging environments).
    pub url_override: Option<String>,
}

fn default_max_connections() -> usize {
    1000
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;

        config.pool.validate()?;

        if config.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if config.sweep.enabled && config.sweep.interval_secs == 0 {
            return Err(common::Error::Config(
                "sweep.interval_secs must be greater than 0 when the sweep is enabled".into(),
            ));
        }

        Ok(config)
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("pool-monitor.toml")
    }
}
