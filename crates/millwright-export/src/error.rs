//! Error type for the CSV/JSONL exporters.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to open export file {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write export row: {0}")]
    Write(#[from] std::io::Error),
    #[error("failed to write csv row: {0}")]
    Csv(#[from] csv::Error),
}

pub type Result<T> = std::result::Result<T, ExportError>;
