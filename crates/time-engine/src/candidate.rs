//! The value every time resolver produces.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which resolver produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateSource {
    Rule,
    Llm,
}

/// Coarse trust tag. Only `High` candidates are scheduled without asking the
/// user to confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    High,
    Low,
}

/// A resolved due time. Always an absolute instant; never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedTimeCandidate {
    pub due_at_utc: DateTime<Utc>,
    pub source: CandidateSource,
    pub confidence: Confidence,
    /// Name of the rule family that matched (`None` for LLM candidates).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern_name: Option<&'static str>,
}

impl ParsedTimeCandidate {
    /// A high-confidence candidate from the named rule family.
    pub fn from_rule(due_at_utc: DateTime<Utc>, pattern_name: &'static str) -> Self {
        Self {
            due_at_utc,
            source: CandidateSource::Rule,
            confidence: Confidence::High,
            pattern_name: Some(pattern_name),
        }
    }

    pub fn from_llm(due_at_utc: DateTime<Utc>, confidence: Confidence) -> Self {
        Self {
            due_at_utc,
            source: CandidateSource::Llm,
            confidence,
            pattern_name: None,
        }
    }

    pub fn is_confident(&self) -> bool {
        self.confidence == Confidence::High
    }
}
