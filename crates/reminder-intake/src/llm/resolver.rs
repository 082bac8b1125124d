//! [`TimeResolver`] backed by an [`LlmProvider`].
//!
//! Transient provider failures are retried with exponential backoff up to
//! `llm.max_attempts`. Permanent and malformed answers fail at once. The whole
//! call, retries included, is bounded by `llm.timeout_secs` and aborts early
//! when the cancellation token fires.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Months, NaiveDateTime, NaiveTime, Utc};
use time_engine::{parse_rfc3339, to_local, to_utc, utc_offset_at, ParsedTimeCandidate};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::prompt::{build_request, PromptContext};
use super::schema::{parse_response, StructuredTimeResponse};
use super::{LlmProvider, LlmRequest, ProviderError};
use crate::config::{IntakeConfig, LlmConfig, SanityConfig};
use crate::error::{IntakeError, Result};
use crate::resolver::{
    shorten_title, DetailsSynthesizer, Resolution, ResolutionRequest, TaskDetails, TimeResolver,
    Verdict,
};

/// Local formats accepted in `iso_local_time` besides full RFC 3339.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

pub struct LlmTimeResolver {
    provider: Arc<dyn LlmProvider>,
    llm: LlmConfig,
    sanity: SanityConfig,
    default_time: NaiveTime,
    cancel: CancellationToken,
}

impl std::fmt::Debug for LlmTimeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmTimeResolver")
            .field("max_attempts", &self.llm.max_attempts)
            .field("timeout_secs", &self.llm.timeout_secs)
            .field("sanity", &self.sanity)
            .finish_non_exhaustive()
    }
}

impl LlmTimeResolver {
    pub fn new(provider: Arc<dyn LlmProvider>, config: &IntakeConfig) -> Result<Self> {
        Ok(Self {
            provider,
            llm: config.llm.clone(),
            sanity: config.sanity.clone(),
            default_time: config.rules.default_naive_time()?,
            cancel: CancellationToken::new(),
        })
    }

    /// Abort in-flight calls when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Ask the provider and validate the answer against the schema.
    async fn ask(&self, request: &ResolutionRequest<'_>) -> Result<StructuredTimeResponse> {
        let local_now = to_local(&request.reference, request.zone)?;
        let zone_offset = utc_offset_at(&request.reference, request.zone)?;
        let prompt = build_request(
            &PromptContext {
                current_utc: request.reference,
                local_now,
                zone_name: request.zone,
                zone_offset: &zone_offset,
                merged_text: request.text,
                default_time: self.default_time,
            },
            self.llm.temperature,
        );

        let raw = self.complete_with_retry(&prompt).await?;
        parse_response(&raw).map_err(|e| {
            warn!(error = %e, "LLM answer violates schema");
            IntakeError::LlmMalformedResponse(e.0)
        })
    }

    async fn complete_with_retry(&self, request: &LlmRequest) -> Result<String> {
        let budget = self.llm.timeout();
        tokio::select! {
            _ = self.cancel.cancelled() => Err(IntakeError::Cancelled),
            outcome = tokio::time::timeout(budget, self.attempt_loop(request)) => {
                outcome.map_err(|_| IntakeError::LlmTimeout(budget))?
            }
        }
    }

    async fn attempt_loop(&self, request: &LlmRequest) -> Result<String> {
        let max_attempts = self.llm.max_attempts;
        let mut backoff = self.llm.initial_backoff();
        let mut last_error = String::new();

        for attempt in 1..=max_attempts {
            match self.provider.complete(request).await {
                Ok(raw) => {
                    debug!(attempt, "LLM answered");
                    return Ok(raw);
                }
                Err(ProviderError::Transient(msg)) => {
                    warn!(attempt, max_attempts, error = %msg, "LLM transient error");
                    last_error = msg;
                    if attempt < max_attempts {
                        tokio::time::sleep(backoff).await;
                        backoff = backoff.saturating_mul(2);
                    }
                }
                Err(ProviderError::Permanent(msg)) => return Err(IntakeError::LlmProvider(msg)),
                Err(ProviderError::Malformed(msg)) => {
                    return Err(IntakeError::LlmMalformedResponse(msg))
                }
            }
        }

        Err(IntakeError::LlmTransient {
            attempts: max_attempts,
            last_error,
        })
    }

    /// Decide whether an LLM-proposed instant can be trusted.
    fn judge(&self, candidate: ParsedTimeCandidate, reference: DateTime<Utc>) -> Verdict {
        let floor = i64::try_from(self.sanity.past_tolerance_secs)
            .ok()
            .and_then(ChronoDuration::try_seconds)
            .and_then(|tolerance| reference.checked_sub_signed(tolerance));
        let horizon = reference.checked_add_months(Months::new(
            self.sanity.max_future_years.saturating_mul(12),
        ));

        let reason = if floor.is_some_and(|f| candidate.due_at_utc < f) {
            Some(format!(
                "{} is in the past",
                candidate.due_at_utc.to_rfc3339()
            ))
        } else if horizon.is_some_and(|h| candidate.due_at_utc > h) {
            Some(format!(
                "{} is more than {} years ahead",
                candidate.due_at_utc.to_rfc3339(),
                self.sanity.max_future_years
            ))
        } else if !candidate.is_confident() {
            Some("model reported low confidence".to_owned())
        } else {
            None
        };

        match reason {
            Some(reason) => {
                debug!(%reason, "demoting LLM candidate");
                Verdict::Demoted { candidate, reason }
            }
            None => Verdict::Match(candidate),
        }
    }
}

/// Read `iso_local_time`: RFC 3339 with an offset is taken as an instant,
/// anything else as wall-clock time in `zone`.
fn interpret_time(value: &str, zone: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(instant) = parse_rfc3339(value) {
        return Ok(instant);
    }
    let local = NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .ok_or_else(|| {
            IntakeError::LlmMalformedResponse(format!("iso_local_time '{value}' is not ISO 8601"))
        })?;
    Ok(to_utc(&local, zone)?)
}

fn details_from(response: &StructuredTimeResponse) -> TaskDetails {
    TaskDetails {
        title: shorten_title(&response.title),
        description: response.description.trim().to_owned(),
    }
}

#[async_trait]
impl TimeResolver for LlmTimeResolver {
    fn name(&self) -> &'static str {
        "llm"
    }

    async fn try_resolve(&self, request: &ResolutionRequest<'_>) -> Result<Resolution> {
        let response = self.ask(request).await?;
        let details = details_from(&response);
        let verdict = match response.iso_local_time.as_deref() {
            None => Verdict::NoMatch,
            Some(value) => {
                let due = interpret_time(value, request.zone)?;
                self.judge(
                    ParsedTimeCandidate::from_llm(due, response.confidence),
                    request.reference,
                )
            }
        };
        Ok(Resolution {
            verdict,
            details: Some(details),
        })
    }
}

#[async_trait]
impl DetailsSynthesizer for LlmTimeResolver {
    async fn synthesize(&self, request: &ResolutionRequest<'_>) -> Result<TaskDetails> {
        let response = self.ask(request).await?;
        Ok(details_from(&response))
    }
}
