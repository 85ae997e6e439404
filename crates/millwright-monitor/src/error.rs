//! Error types for collector validation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, MonitorError>;

#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("collector variable id \"{0}\" is not in \"owner_uid.attribute\" form")]
    MalformedVariableId(String),
}
