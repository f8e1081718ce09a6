//! Error types for the Motus engine.
//!
//! Numeric variants (`InsufficientData`, `DegenerateGeometry`,
//! `NumericInstability`) are produced by the fallible `try_*` computations
//! and recovered locally into neutral values; they never reach the caller of
//! a session. The remaining variants describe API misuse.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Insufficient data: need {required} samples, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    #[error("Numeric instability: {0}")]
    NumericInstability(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No active session")]
    SessionNotActive,

    #[error("Engine worker has stopped")]
    EngineStopped,

    #[error("Motion source error: {0}")]
    Source(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Reject NaN and infinite intermediates at a computation boundary.
pub fn ensure_finite(value: f64, what: &str) -> Result<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(Error::NumericInstability(format!("{what} is {value}")))
    }
}
