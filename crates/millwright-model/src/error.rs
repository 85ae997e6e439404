//! Error types for the data model and batch container algebra.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ModelError>;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("requested quantity {requested} exceeds available {available} across containers")]
    InsufficientQuantity { requested: f64, available: f64 },

    #[error("requested quantity {quantity} exceeds container level {level}")]
    ExceedsLevel { quantity: f64, level: f64 },

    #[error("unknown container-selection strategy \"{0}\"")]
    UnknownStrategy(String),

    #[error("fetch accumulated to {fetched}, overshooting requested {requested}")]
    Overshoot { fetched: f64, requested: f64 },
}
