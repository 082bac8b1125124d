//! The artifacts handed to collaborators: [`ResolvedTask`] on success,
//! [`ResolutionFailure`] when the user has to be asked again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use time_engine::{CandidateSource, ParsedTimeCandidate, TimeEngineError};

use crate::error::IntakeError;
use crate::resolver::TaskDetails;

/// A task ready for the task-creation collaborator, which owns it from here on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTask {
    pub title: String,
    pub description: String,
    pub due_at_utc: DateTime<Utc>,
    pub timezone_name: String,
    pub attachment_refs: Vec<String>,
    /// Which resolver supplied `due_at_utc`.
    pub source: CandidateSource,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NoTimeExpressionFound,
    AmbiguousTimeExpression,
    /// Unknown or misconfigured zone. Needs operator attention, not a retry.
    TimezoneResolution,
    LlmTransient,
    LlmMalformedResponse,
    /// The provider refused the request or the call was cancelled.
    LlmUnavailable,
}

/// Why no task was produced, with a hint the conversational layer can show.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionFailure {
    pub kind: FailureKind,
    pub user_facing_hint: String,
}

impl ResolutionFailure {
    pub fn new(kind: FailureKind, user_facing_hint: impl Into<String>) -> Self {
        Self {
            kind,
            user_facing_hint: user_facing_hint.into(),
        }
    }

    pub fn no_time_found() -> Self {
        Self::new(
            FailureKind::NoTimeExpressionFound,
            "I couldn't find a time in your message. When should I remind you?",
        )
    }

    pub fn ambiguous() -> Self {
        Self::new(
            FailureKind::AmbiguousTimeExpression,
            "I'm not sure exactly when you mean. Could you give me a specific day and time?",
        )
    }

    pub fn timezone(zone: &str) -> Self {
        Self::new(
            FailureKind::TimezoneResolution,
            format!("Your timezone setting '{zone}' isn't recognized. Please update it in settings."),
        )
    }

    pub fn llm_transient() -> Self {
        Self::new(
            FailureKind::LlmTransient,
            "I couldn't process that right now. Please try again in a moment.",
        )
    }

    pub fn llm_malformed() -> Self {
        Self::new(
            FailureKind::LlmMalformedResponse,
            "Something went wrong reading your reminder. Could you rephrase it with a specific time?",
        )
    }

    pub fn llm_unavailable() -> Self {
        Self::new(
            FailureKind::LlmUnavailable,
            "I can't interpret that one right now. Try an explicit time like \"tomorrow at 9am\".",
        )
    }

    /// Classify a resolver error.
    pub fn from_error(err: &IntakeError) -> Self {
        match err {
            IntakeError::TimeEngine(TimeEngineError::InvalidTimezone(zone)) => {
                Self::timezone(zone.trim_matches('\''))
            }
            IntakeError::TimeEngine(_) => Self::no_time_found(),
            IntakeError::LlmTransient { .. } | IntakeError::LlmTimeout(_) => Self::llm_transient(),
            IntakeError::LlmMalformedResponse(_) => Self::llm_malformed(),
            IntakeError::LlmProvider(_)
            | IntakeError::Cancelled
            | IntakeError::Config(_)
            | IntakeError::Directory(_)
            | IntakeError::Dispatch(_) => Self::llm_unavailable(),
        }
    }
}

/// Packages a trusted candidate and the task details into a [`ResolvedTask`].
pub struct TaskAssembler;

impl TaskAssembler {
    pub fn assemble(
        details: TaskDetails,
        candidate: &ParsedTimeCandidate,
        zone: &str,
        attachment_refs: Vec<String>,
    ) -> ResolvedTask {
        ResolvedTask {
            title: details.title,
            description: details.description,
            due_at_utc: candidate.due_at_utc,
            timezone_name: zone.to_owned(),
            attachment_refs,
            source: candidate.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_assemble_copies_candidate_and_details() {
        let due = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let task = TaskAssembler::assemble(
            TaskDetails {
                title: "Call mom".into(),
                description: "call mom in 2 hours".into(),
            },
            &ParsedTimeCandidate::from_rule(due, "relative_offset"),
            "Europe/Berlin",
            vec!["photo-1".into()],
        );
        assert_eq!(task.due_at_utc, due);
        assert_eq!(task.source, CandidateSource::Rule);
        assert_eq!(task.timezone_name, "Europe/Berlin");
        assert_eq!(task.attachment_refs, vec!["photo-1".to_owned()]);

        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["due_at_utc"], "2024-01-01T12:00:00Z");
        assert_eq!(json["source"], "rule");
    }

    #[test]
    fn test_failure_kinds_from_errors() {
        let tz = IntakeError::TimeEngine(TimeEngineError::InvalidTimezone("Mars/Base".into()));
        let failure = ResolutionFailure::from_error(&tz);
        assert_eq!(failure.kind, FailureKind::TimezoneResolution);
        assert!(failure.user_facing_hint.contains("Mars/Base"));

        let transient = IntakeError::LlmTransient {
            attempts: 3,
            last_error: "HTTP 503".into(),
        };
        assert_eq!(
            ResolutionFailure::from_error(&transient).kind,
            FailureKind::LlmTransient
        );
        assert_eq!(
            ResolutionFailure::from_error(&IntakeError::LlmTimeout(std::time::Duration::from_secs(30)))
                .kind,
            FailureKind::LlmTransient
        );
        assert_eq!(
            ResolutionFailure::from_error(&IntakeError::LlmMalformedResponse("x".into())).kind,
            FailureKind::LlmMalformedResponse
        );
        assert_eq!(
            ResolutionFailure::from_error(&IntakeError::LlmProvider("401".into())).kind,
            FailureKind::LlmUnavailable
        );
    }

    #[test]
    fn test_failure_serializes_snake_case() {
        let json = serde_json::to_value(ResolutionFailure::ambiguous()).unwrap();
        assert_eq!(json["kind"], "ambiguous_time_expression");
        assert!(json["user_facing_hint"].as_str().unwrap().len() > 10);
    }
}
