//! Error types for the intake pipeline.

use thiserror::Error;
use time_engine::TimeEngineError;

#[derive(Error, Debug)]
pub enum IntakeError {
    /// Zone or datetime problem reported by the time engine.
    #[error(transparent)]
    TimeEngine(#[from] TimeEngineError),

    /// The provider kept failing transiently until the attempt budget ran out.
    #[error("LLM transient error after {attempts} attempts: {last_error}")]
    LlmTransient { attempts: u32, last_error: String },

    /// The provider answered, but not with the agreed schema. Never retried.
    #[error("LLM malformed response: {0}")]
    LlmMalformedResponse(String),

    /// The provider rejected the request (auth, bad request). Never retried.
    #[error("LLM provider rejected request: {0}")]
    LlmProvider(String),

    #[error("LLM call timed out after {0:?}")]
    LlmTimeout(std::time::Duration),

    #[error("operation cancelled")]
    Cancelled,

    #[error("config error: {0}")]
    Config(String),

    /// The settings collaborator could not produce a timezone profile.
    #[error("timezone directory error: {0}")]
    Directory(String),

    /// The task-creation collaborator refused the result.
    #[error("dispatch error: {0}")]
    Dispatch(String),
}

/// A flush cycle for one user failed downstream. Its buffered content is gone;
/// the next event from the same user starts a fresh buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("thread flush failed for user {user_id}: {reason}")]
pub struct ThreadFlushError {
    pub user_id: String,
    pub reason: String,
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, IntakeError>;
