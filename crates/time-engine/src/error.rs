//! Error types for time-engine operations.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TimeEngineError {
    /// The zone name is not in the IANA database. This is a configuration
    /// problem, never a user input problem.
    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid datetime: {0}")]
    InvalidDatetime(String),

    #[error("Invalid expression: {0}")]
    InvalidExpression(String),
}

pub type Result<T> = std::result::Result<T, TimeEngineError>;
