//! LLM fallback for time expressions the rule engine cannot resolve, and for
//! task title/description synthesis.
//!
//! - [`LlmProvider`] is the network boundary (one completion per call).
//! - [`http::OpenAiCompatibleProvider`] speaks the OpenAI chat completions API.
//! - [`prompt`] builds the request from a fixed set of context variables.
//! - [`schema`] strictly validates the structured answer.
//! - [`resolver::LlmTimeResolver`] adds retries, timeouts, cancellation and the
//!   sanity filter on top.

pub mod http;
pub mod prompt;
pub mod resolver;
pub mod schema;

use async_trait::async_trait;
use thiserror::Error;

pub use http::OpenAiCompatibleProvider;
pub use resolver::LlmTimeResolver;
pub use schema::{SchemaViolation, StructuredTimeResponse};

/// A single completion request.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmRequest {
    pub system: String,
    pub user: String,
    pub temperature: f64,
}

/// Errors reported by a provider attempt.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Timeout, 429, 5xx, connection refused. Worth retrying.
    #[error("transient provider error: {0}")]
    Transient(String),
    /// Auth failure or other 4xx. Retrying will not help.
    #[error("permanent provider error: {0}")]
    Permanent(String),
    /// The provider answered with an envelope we cannot read.
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Completion boundary to an external LLM provider.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Return the raw text content of the model's answer.
    async fn complete(&self, request: &LlmRequest) -> Result<String, ProviderError>;
}
