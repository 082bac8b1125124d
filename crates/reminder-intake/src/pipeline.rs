//! Glue between the thread coordinator and the outside world.
//!
//! [`ReminderPipeline`] is the [`IntentHandler`] that the coordinator flushes
//! into. It looks up the user's zone, asks the [`ResolutionArbiter`] for a
//! task and hands the outcome to the [`TaskDispatcher`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::arbiter::ResolutionArbiter;
use crate::config::IntakeConfig;
use crate::error::{IntakeError, Result, ThreadFlushError};
use crate::event::{MergedIntent, UserTimezoneProfile};
use crate::llm::LlmProvider;
use crate::task::{FailureKind, ResolutionFailure, ResolvedTask};
use crate::thread::{IntentHandler, MessageThreadCoordinator};

/// Settings collaborator that knows each user's zone.
#[async_trait]
pub trait TimezoneDirectory: Send + Sync {
    async fn profile(&self, user_id: &str) -> anyhow::Result<UserTimezoneProfile>;

    /// Called when a user's configured zone is not a valid IANA name.
    async fn report_invalid_zone(&self, user_id: &str, zone: &str, reason: &str) {
        error!(user_id, zone, reason, "invalid timezone in user profile");
    }
}

/// Task-creation and conversational collaborators.
#[async_trait]
pub trait TaskDispatcher: Send + Sync {
    async fn dispatch(&self, user_id: &str, task: ResolvedTask) -> anyhow::Result<()>;

    /// Ask the user to clarify.
    async fn clarify(&self, user_id: &str, failure: ResolutionFailure) -> anyhow::Result<()>;
}

/// A zone reported through [`TimezoneDirectory::report_invalid_zone`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidZoneReport {
    pub user_id: String,
    pub zone: String,
}

/// In-memory directory: a default zone plus per-user overrides.
#[derive(Debug)]
pub struct StaticTimezoneDirectory {
    default_zone: String,
    zones: HashMap<String, String>,
    reports: StdMutex<Vec<InvalidZoneReport>>,
}

impl StaticTimezoneDirectory {
    pub fn new(default_zone: impl Into<String>) -> Self {
        Self {
            default_zone: default_zone.into(),
            zones: HashMap::new(),
            reports: StdMutex::new(Vec::new()),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>, zone: impl Into<String>) -> Self {
        self.zones.insert(user_id.into(), zone.into());
        self
    }

    pub fn reports(&self) -> Vec<InvalidZoneReport> {
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl TimezoneDirectory for StaticTimezoneDirectory {
    async fn profile(&self, user_id: &str) -> anyhow::Result<UserTimezoneProfile> {
        let zone = self.zones.get(user_id).unwrap_or(&self.default_zone);
        Ok(UserTimezoneProfile {
            user_id: user_id.to_owned(),
            iana_zone_name: zone.clone(),
        })
    }

    async fn report_invalid_zone(&self, user_id: &str, zone: &str, reason: &str) {
        error!(user_id, zone, reason, "invalid timezone in user profile");
        self.reports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(InvalidZoneReport {
                user_id: user_id.to_owned(),
                zone: zone.to_owned(),
            });
    }
}

pub struct ReminderPipeline {
    arbiter: Arc<ResolutionArbiter>,
    directory: Arc<dyn TimezoneDirectory>,
    dispatcher: Arc<dyn TaskDispatcher>,
}

impl ReminderPipeline {
    pub fn new(
        arbiter: Arc<ResolutionArbiter>,
        directory: Arc<dyn TimezoneDirectory>,
        dispatcher: Arc<dyn TaskDispatcher>,
    ) -> Self {
        Self {
            arbiter,
            directory,
            dispatcher,
        }
    }
}

#[async_trait]
impl IntentHandler for ReminderPipeline {
    async fn handle(&self, intent: MergedIntent) -> anyhow::Result<()> {
        let user_id = intent.user_id.as_str();
        let profile = self
            .directory
            .profile(user_id)
            .await
            .map_err(|e| IntakeError::Directory(format!("{e:#}")))?;
        let zone = profile.iana_zone_name.as_str();

        match self.arbiter.arbitrate_intent(&intent, zone).await {
            Ok(task) => {
                info!(user_id, due_at_utc = %task.due_at_utc, title = %task.title, "dispatching task");
                self.dispatcher
                    .dispatch(user_id, task)
                    .await
                    .map_err(|e| IntakeError::Dispatch(format!("{e:#}")))?;
            }
            Err(failure) => {
                if failure.kind == FailureKind::TimezoneResolution {
                    self.directory
                        .report_invalid_zone(user_id, zone, &failure.user_facing_hint)
                        .await;
                }
                info!(user_id, kind = ?failure.kind, "asking user to clarify");
                self.dispatcher
                    .clarify(user_id, failure)
                    .await
                    .map_err(|e| IntakeError::Dispatch(format!("{e:#}")))?;
            }
        }
        Ok(())
    }
}

/// Wire a coordinator to a pipeline built from `config`.
///
/// The coordinator and the LLM resolver share one cancellation token, so
/// [`MessageThreadCoordinator::shutdown`] also aborts in-flight LLM calls.
pub fn start_intake(
    config: &IntakeConfig,
    provider: Option<Arc<dyn LlmProvider>>,
    directory: Arc<dyn TimezoneDirectory>,
    dispatcher: Arc<dyn TaskDispatcher>,
) -> Result<(
    MessageThreadCoordinator,
    mpsc::UnboundedReceiver<ThreadFlushError>,
)> {
    config.validate()?;
    let cancel = CancellationToken::new();
    let arbiter = ResolutionArbiter::from_config(config, provider, cancel.clone())?;
    info!(resolvers = ?arbiter.resolver_names(), window_ms = config.thread.window_ms, "intake started");
    let pipeline = ReminderPipeline::new(Arc::new(arbiter), directory, dispatcher);
    Ok(MessageThreadCoordinator::new(
        Arc::new(pipeline),
        config.thread.window(),
        cancel,
    ))
}
