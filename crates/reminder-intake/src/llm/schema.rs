//! Strict validation of the structured LLM answer.
//!
//! Anything other than exactly the agreed object is a [`SchemaViolation`];
//! partially parsed fields are never used.

use serde::Deserialize;
use thiserror::Error;
use time_engine::Confidence;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct SchemaViolation(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StructuredTimeResponse {
    pub title: String,
    pub description: String,
    /// The key is mandatory; `null` means the message names no time.
    #[serde(deserialize_with = "Option::deserialize")]
    pub iso_local_time: Option<String>,
    pub confidence: Confidence,
}

/// Parse and validate a raw model answer.
pub fn parse_response(raw: &str) -> Result<StructuredTimeResponse, SchemaViolation> {
    let body = strip_code_fence(raw);
    let response: StructuredTimeResponse =
        serde_json::from_str(body).map_err(|e| SchemaViolation(e.to_string()))?;

    if response.title.trim().is_empty() {
        return Err(SchemaViolation("title is empty".into()));
    }
    if response
        .iso_local_time
        .as_deref()
        .is_some_and(|t| t.trim().is_empty())
    {
        return Err(SchemaViolation("iso_local_time is an empty string".into()));
    }
    Ok(response)
}

/// Models like to wrap JSON in ```json fences.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_response() {
        let parsed = parse_response(
            r#"{"title":"Call mom","description":"Weekly call","iso_local_time":"2024-01-15T17:00:00","confidence":"high"}"#,
        )
        .unwrap();
        assert_eq!(parsed.title, "Call mom");
        assert_eq!(parsed.iso_local_time.as_deref(), Some("2024-01-15T17:00:00"));
        assert_eq!(parsed.confidence, Confidence::High);
    }

    #[test]
    fn test_null_time_is_allowed() {
        let parsed = parse_response(
            r#"{"title":"Buy milk","description":"","iso_local_time":null,"confidence":"low"}"#,
        )
        .unwrap();
        assert!(parsed.iso_local_time.is_none());
    }

    #[test]
    fn test_code_fence_is_stripped() {
        let raw = "```json\n{\"title\":\"T\",\"description\":\"D\",\"iso_local_time\":null,\"confidence\":\"low\"}\n```";
        assert!(parse_response(raw).is_ok());
    }

    #[test]
    fn test_missing_time_key_is_violation() {
        let err = parse_response(r#"{"title":"T","description":"D","confidence":"high"}"#)
            .unwrap_err();
        assert!(err.0.contains("iso_local_time"), "got: {err}");
    }

    #[test]
    fn test_unknown_key_is_violation() {
        assert!(parse_response(
            r#"{"title":"T","description":"D","iso_local_time":null,"confidence":"high","mood":"happy"}"#
        )
        .is_err());
    }

    #[test]
    fn test_wrong_types_are_violations() {
        assert!(parse_response(
            r#"{"title":"T","description":"D","iso_local_time":1705338000,"confidence":"high"}"#
        )
        .is_err());
        assert!(parse_response(
            r#"{"title":"T","description":"D","iso_local_time":null,"confidence":"medium"}"#
        )
        .is_err());
        assert!(parse_response(
            r#"{"title":"","description":"D","iso_local_time":null,"confidence":"low"}"#
        )
        .is_err());
    }

    #[test]
    fn test_prose_is_violation() {
        assert!(parse_response("Sure! The reminder is for 5pm.").is_err());
    }
}
