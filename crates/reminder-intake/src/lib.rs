//! # reminder-intake
//!
//! Turns bursts of chat messages into reminder tasks.
//!
//! ```text
//! RawMessageEvent ─▶ MessageThreadCoordinator ─▶ MergedIntent
//!                        (per-user debounce)          │
//!                                                     ▼
//!                    ResolutionArbiter: [rule engine, LLM] ─▶ ResolvedTask | ResolutionFailure
//! ```
//!
//! ## Modules
//!
//! - [`thread`] — Per-user debounce and merge of message bursts
//! - [`event`] — Input events and the merged intent
//! - [`resolver`] — The resolver interface and the rule-engine resolver
//! - [`llm`] — LLM fallback: provider boundary, prompt, strict schema, retries
//! - [`arbiter`] — Ordered resolver chain producing one task or one failure
//! - [`task`] — Output artifacts and the task assembler
//! - [`pipeline`] — Collaborator traits and the coordinator-to-arbiter glue
//! - [`config`] — TOML configuration
//! - [`error`] — Error types

pub mod arbiter;
pub mod config;
pub mod error;
pub mod event;
pub mod llm;
pub mod pipeline;
pub mod resolver;
pub mod task;
pub mod thread;

#[cfg(any(test, feature = "test-utils"))]
#[doc(hidden)]
pub mod test_utils;

pub use arbiter::ResolutionArbiter;
pub use config::IntakeConfig;
pub use error::{IntakeError, ThreadFlushError};
pub use event::{ContentType, MergedIntent, RawMessageEvent, UserTimezoneProfile};
pub use llm::{LlmProvider, LlmTimeResolver, OpenAiCompatibleProvider, ProviderError};
pub use pipeline::{
    start_intake, ReminderPipeline, StaticTimezoneDirectory, TaskDispatcher, TimezoneDirectory,
};
pub use resolver::{TaskDetails, TimeResolver, Verdict};
pub use task::{FailureKind, ResolutionFailure, ResolvedTask, TaskAssembler};
pub use thread::{IntentHandler, MessageThreadCoordinator, ShutdownMode, THREAD_WINDOW};
