//! Configuration-layer error types

use thiserror::Error;

/// Errors from loading and validating configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result alias for configuration loading.
pub type Result<T> = std::result::Result<T, Error>;
