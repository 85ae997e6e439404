//! Error types for program execution and the machine state machine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MachineError>;

#[derive(Error, Debug)]
pub enum MachineError {
    #[error("no container of the required type is attached for \"{0}\"")]
    ContainerMissing(String),

    #[error("container level too low to run the program safely")]
    LowContainerLevel,

    #[error(transparent)]
    Model(#[from] millwright_model::ModelError),

    #[error("program \"{0}\" is not registered on this machine")]
    UnknownProgram(String),
}
