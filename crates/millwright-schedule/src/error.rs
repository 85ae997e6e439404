//! Error type for cron parsing, block actions, and schedule arbitration.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron field: {0}")]
    InvalidCron(String),
    #[error("cron expression can never be satisfied")]
    UnsatisfiableCron,
    #[error("unknown program \"{0}\" for switch-program action")]
    UnknownProgram(String),
    #[error("unknown content \"{0}\" for procurement action")]
    UnknownContent(String),
    #[error("operating schedule has no machine bound yet")]
    NoMachineBound,
    #[error("maintenance action requires a maintenance crew bound in the action context")]
    NoMaintenanceBound,
    #[error(transparent)]
    Machine(#[from] millwright_machine::MachineError),
    #[error(transparent)]
    Model(#[from] millwright_model::ModelError),
}

pub type Result<T> = std::result::Result<T, ScheduleError>;
