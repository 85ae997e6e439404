//! Error types for the clock, event loop and resource primitives.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("event loop has no more scheduled events but a process is still waiting on {0}")]
    Starvation(&'static str),

    #[error("resource \"{0}\" was dropped while a waiter was still queued")]
    ResourceDropped(String),

    #[error("timeout duration must be non-negative, got {0:?}")]
    NegativeTimeout(std::time::Duration),
}
