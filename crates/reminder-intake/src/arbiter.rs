//! Picks one due time out of an ordered list of resolvers.
//!
//! Resolvers are consulted in order and the first confident
//! [`Verdict::Match`] wins; later resolvers never override it. With the usual
//! rule-first ordering the deterministic rule engine owns every time it can
//! parse, and the LLM only fills in what the rules cannot.
//!
//! Title and description come from the resolver that matched when it produced
//! them, otherwise from the [`DetailsSynthesizer`]. A synthesizer failure falls
//! back to [`TextDetails`] so a good rule match is never lost to an LLM outage.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use time_engine::{parse_timezone, RuleBasedTimeCalculator};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::IntakeConfig;
use crate::error::{IntakeError, Result};
use crate::event::MergedIntent;
use crate::llm::{LlmProvider, LlmTimeResolver};
use crate::resolver::{
    DetailsSynthesizer, Resolution, ResolutionRequest, RuleResolver, TaskDetails, TextDetails,
    TimeResolver, Verdict,
};
use crate::task::{ResolutionFailure, ResolvedTask, TaskAssembler};

pub struct ResolutionArbiter {
    resolvers: Vec<Arc<dyn TimeResolver>>,
    synthesizer: Arc<dyn DetailsSynthesizer>,
}

impl std::fmt::Debug for ResolutionArbiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionArbiter")
            .field("resolvers", &self.resolver_names())
            .finish_non_exhaustive()
    }
}

impl ResolutionArbiter {
    pub fn new(
        resolvers: Vec<Arc<dyn TimeResolver>>,
        synthesizer: Arc<dyn DetailsSynthesizer>,
    ) -> Self {
        Self {
            resolvers,
            synthesizer,
        }
    }

    /// Rule engine first, LLM as fallback and as title/description writer.
    pub fn rule_first(calculator: RuleBasedTimeCalculator, llm: Arc<LlmTimeResolver>) -> Self {
        Self::new(
            vec![Arc::new(RuleResolver::new(calculator)), llm.clone()],
            llm,
        )
    }

    /// Rule engine only, with titles derived from the text.
    pub fn offline(calculator: RuleBasedTimeCalculator) -> Self {
        Self::new(
            vec![Arc::new(RuleResolver::new(calculator))],
            Arc::new(TextDetails),
        )
    }

    /// Build the arbiter a config describes. `provider` is ignored when the
    /// config has no LLM endpoint.
    pub fn from_config(
        config: &IntakeConfig,
        provider: Option<Arc<dyn LlmProvider>>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let calculator = RuleBasedTimeCalculator::new(config.rules.rule_options()?);
        match provider {
            Some(provider) if config.llm.is_enabled() => {
                let llm = LlmTimeResolver::new(provider, config)?.with_cancellation(cancel);
                Ok(Self::rule_first(calculator, Arc::new(llm)))
            }
            _ => Ok(Self::offline(calculator)),
        }
    }

    pub fn resolver_names(&self) -> Vec<&'static str> {
        self.resolvers.iter().map(|r| r.name()).collect()
    }

    /// Resolve `text` written at `reference` by a user in `zone`.
    pub async fn arbitrate(
        &self,
        text: &str,
        reference: DateTime<Utc>,
        zone: &str,
    ) -> std::result::Result<ResolvedTask, ResolutionFailure> {
        self.arbitrate_with_attachments(text, reference, zone, Vec::new())
            .await
    }

    /// Resolve a flushed thread, carrying its attachments into the task.
    pub async fn arbitrate_intent(
        &self,
        intent: &MergedIntent,
        zone: &str,
    ) -> std::result::Result<ResolvedTask, ResolutionFailure> {
        self.arbitrate_with_attachments(
            &intent.text,
            intent.reference_time,
            zone,
            intent.attachment_refs.clone(),
        )
        .await
    }

    async fn arbitrate_with_attachments(
        &self,
        text: &str,
        reference: DateTime<Utc>,
        zone: &str,
        attachment_refs: Vec<String>,
    ) -> std::result::Result<ResolvedTask, ResolutionFailure> {
        if let Err(e) = parse_timezone(zone) {
            error!(zone, error = %e, "cannot resolve reminder: unknown timezone");
            return Err(ResolutionFailure::timezone(zone));
        }

        let request = ResolutionRequest {
            text,
            reference,
            zone,
        };
        let mut demoted = false;
        let mut last_error: Option<IntakeError> = None;

        for resolver in &self.resolvers {
            let name = resolver.name();
            match resolver.try_resolve(&request).await {
                Ok(Resolution {
                    verdict: Verdict::Match(candidate),
                    details,
                }) => {
                    let details = match details {
                        Some(details) => details,
                        None => self.synthesize(&request).await,
                    };
                    info!(
                        resolver = name,
                        pattern = candidate.pattern_name.unwrap_or("-"),
                        due_at_utc = %candidate.due_at_utc,
                        "reminder resolved"
                    );
                    return Ok(TaskAssembler::assemble(
                        details,
                        &candidate,
                        zone,
                        attachment_refs,
                    ));
                }
                Ok(Resolution {
                    verdict: Verdict::Demoted { candidate, reason },
                    ..
                }) => {
                    warn!(
                        resolver = name,
                        due_at_utc = %candidate.due_at_utc,
                        %reason,
                        "time candidate not trusted"
                    );
                    demoted = true;
                }
                Ok(Resolution {
                    verdict: Verdict::NoMatch,
                    ..
                }) => debug!(resolver = name, "no time expression"),
                Err(e) => {
                    warn!(resolver = name, error = %e, "resolver failed");
                    last_error = Some(e);
                }
            }
        }

        Err(if demoted {
            ResolutionFailure::ambiguous()
        } else if let Some(e) = last_error {
            ResolutionFailure::from_error(&e)
        } else {
            ResolutionFailure::no_time_found()
        })
    }

    async fn synthesize(&self, request: &ResolutionRequest<'_>) -> TaskDetails {
        match self.synthesizer.synthesize(request).await {
            Ok(details) => details,
            Err(e) => {
                warn!(error = %e, "title synthesis failed; deriving from text");
                TextDetails::derive(request.text)
            }
        }
    }
}
