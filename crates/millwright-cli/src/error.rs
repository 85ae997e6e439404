//! Error type for the `millwright` binary.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] millwright_config::ConfigError),

    #[error("failed to wire simulation objects: {0}")]
    Build(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;
