//! The common interface every time resolver implements.
//!
//! The arbiter holds an ordered list of [`TimeResolver`]s and walks it until
//! one returns a confident [`Verdict::Match`]. Each resolver answers with a
//! tri-state: `Ok(Match | Demoted | NoMatch)` or `Err`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use time_engine::{ParsedTimeCandidate, RuleBasedTimeCalculator};

use crate::error::Result;

/// Maximum title length produced by [`TextDetails`].
pub const MAX_TITLE_CHARS: usize = 60;

/// What a resolver is asked to resolve.
#[derive(Debug, Clone, Copy)]
pub struct ResolutionRequest<'a> {
    pub text: &'a str,
    pub reference: DateTime<Utc>,
    pub zone: &'a str,
}

/// Human-readable summary of the task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskDetails {
    pub title: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// A trusted due time.
    Match(ParsedTimeCandidate),
    /// A time was proposed but not trusted (low confidence or implausible).
    Demoted {
        candidate: ParsedTimeCandidate,
        reason: String,
    },
    NoMatch,
}

/// One resolver's answer, optionally with task details it produced on the way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub verdict: Verdict,
    pub details: Option<TaskDetails>,
}

impl Resolution {
    pub fn no_match() -> Self {
        Self {
            verdict: Verdict::NoMatch,
            details: None,
        }
    }
}

#[async_trait]
pub trait TimeResolver: Send + Sync {
    /// Stable name used in logs.
    fn name(&self) -> &'static str;

    async fn try_resolve(&self, request: &ResolutionRequest<'_>) -> Result<Resolution>;
}

/// Produces a title and description for a task whose time is already known.
#[async_trait]
pub trait DetailsSynthesizer: Send + Sync {
    async fn synthesize(&self, request: &ResolutionRequest<'_>) -> Result<TaskDetails>;
}

/// [`TimeResolver`] over the offline rule engine.
#[derive(Debug, Clone, Default)]
pub struct RuleResolver {
    calculator: RuleBasedTimeCalculator,
}

impl RuleResolver {
    pub fn new(calculator: RuleBasedTimeCalculator) -> Self {
        Self { calculator }
    }
}

#[async_trait]
impl TimeResolver for RuleResolver {
    fn name(&self) -> &'static str {
        "rule"
    }

    async fn try_resolve(&self, request: &ResolutionRequest<'_>) -> Result<Resolution> {
        let verdict = match self
            .calculator
            .try_resolve(request.text, request.reference, request.zone)?
        {
            Some(candidate) => Verdict::Match(candidate),
            None => Verdict::NoMatch,
        };
        Ok(Resolution {
            verdict,
            details: None,
        })
    }
}

/// Derives details from the text itself: the first line, shortened, as the
/// title and the full text as the description.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDetails;

impl TextDetails {
    pub fn derive(text: &str) -> TaskDetails {
        let first_line = text.lines().map(str::trim).find(|l| !l.is_empty()).unwrap_or("");
        let title = if first_line.is_empty() {
            "Reminder".to_owned()
        } else {
            shorten_title(first_line)
        };
        TaskDetails {
            title,
            description: text.trim().to_owned(),
        }
    }
}

/// Cut a title to [`MAX_TITLE_CHARS`], marking the cut with an ellipsis.
pub fn shorten_title(title: &str) -> String {
    let title = title.trim();
    if title.chars().count() <= MAX_TITLE_CHARS {
        return title.to_owned();
    }
    let cut: String = title.chars().take(MAX_TITLE_CHARS - 1).collect();
    format!("{}…", cut.trim_end())
}

#[async_trait]
impl DetailsSynthesizer for TextDetails {
    async fn synthesize(&self, request: &ResolutionRequest<'_>) -> Result<TaskDetails> {
        Ok(Self::derive(request.text))
    }
}
