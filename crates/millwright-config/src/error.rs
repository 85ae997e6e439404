//! Error type for document loading, environment overrides, and
//! cross-reference validation.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found at {0}")]
    FileNotFound(String),
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config document: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid environment override {key}={value}: {reason}")]
    InvalidEnvOverride {
        key: String,
        value: String,
        reason: String,
    },
    #[error("validation failed: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
