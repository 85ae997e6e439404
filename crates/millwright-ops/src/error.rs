//! Error type for maintenance, operator and sensor routines.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum OpsError {
    /// An issue kind reached a fix routine with no handling defined for it.
    /// Per spec §7 this is a design bug; the caller is expected to treat it
    /// as fatal rather than retry.
    #[error("no fix routine for issue: {0}")]
    UnknownIssue(String),
    #[error(transparent)]
    Machine(#[from] millwright_machine::MachineError),
    #[error(transparent)]
    Model(#[from] millwright_model::ModelError),
}

pub type Result<T> = std::result::Result<T, OpsError>;
