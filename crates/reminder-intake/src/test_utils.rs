//! Test doubles shared by unit and integration tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::event::MergedIntent;
use crate::llm::{LlmProvider, LlmRequest, ProviderError};
use crate::pipeline::TaskDispatcher;
use crate::task::{ResolutionFailure, ResolvedTask};
use crate::thread::IntentHandler;

/// A well-formed model answer.
pub fn answer(title: &str, iso_local_time: Option<&str>, confidence: &str) -> String {
    serde_json::json!({
        "title": title,
        "description": format!("{title} (details)"),
        "iso_local_time": iso_local_time,
        "confidence": confidence,
    })
    .to_string()
}

/// Replays a fixed script of provider results, then fails transiently.
#[derive(Debug, Default)]
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<String, ProviderError>>>,
    requests: Mutex<Vec<LlmRequest>>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn new(script: impl IntoIterator<Item = Result<String, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<LlmRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

#[async_trait]
impl LlmProvider for ScriptedProvider {
    async fn complete(&self, request: &LlmRequest) -> Result<String, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());
        self.script
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Transient("script exhausted".into())))
    }
}

/// Never answers.
#[derive(Debug, Default)]
pub struct HangingProvider;

#[async_trait]
impl LlmProvider for HangingProvider {
    async fn complete(&self, _request: &LlmRequest) -> Result<String, ProviderError> {
        std::future::pending().await
    }
}

/// Forwards every flushed intent to a channel. Fails intents whose text
/// contains the configured marker.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::UnboundedSender<MergedIntent>,
    fail_marker: Option<String>,
}

impl ChannelHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MergedIntent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                fail_marker: None,
            },
            rx,
        )
    }

    pub fn failing_on(mut self, marker: &str) -> Self {
        self.fail_marker = Some(marker.to_owned());
        self
    }
}

#[async_trait]
impl IntentHandler for ChannelHandler {
    async fn handle(&self, intent: MergedIntent) -> anyhow::Result<()> {
        if let Some(marker) = &self.fail_marker {
            if intent.text.contains(marker.as_str()) {
                anyhow::bail!("handler rejected '{}'", intent.text);
            }
        }
        self.tx.send(intent)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Dispatched { user_id: String, task: ResolvedTask },
    Clarified { user_id: String, failure: ResolutionFailure },
}

/// Records dispatches and clarifications on a channel.
#[derive(Debug, Clone)]
pub struct RecordingDispatcher {
    tx: mpsc::UnboundedSender<Outcome>,
    fail: bool,
}

impl RecordingDispatcher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Outcome>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx, fail: false }, rx)
    }

    /// Reject every dispatch and clarification.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

#[async_trait]
impl TaskDispatcher for RecordingDispatcher {
    async fn dispatch(&self, user_id: &str, task: ResolvedTask) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("task service unavailable");
        }
        self.tx.send(Outcome::Dispatched {
            user_id: user_id.to_owned(),
            task,
        })?;
        Ok(())
    }

    async fn clarify(&self, user_id: &str, failure: ResolutionFailure) -> anyhow::Result<()> {
        if self.fail {
            anyhow::bail!("chat service unavailable");
        }
        self.tx.send(Outcome::Clarified {
            user_id: user_id.to_owned(),
            failure,
        })?;
        Ok(())
    }
}
