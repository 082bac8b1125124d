//! Configuration for the intake pipeline, loaded from TOML.
//!
//! Every field has a default, so an empty file is a valid configuration.

use std::path::Path;
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use time_engine::{PastTimePolicy, RuleOptions, WeekStartDay, DEFAULT_HOUR, DEFAULT_MINUTE};

use crate::error::{IntakeError, Result};

/// Environment variable consulted when `llm.api_key` is empty.
pub const API_KEY_ENV: &str = "REMINDER_LLM_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakeConfig {
    pub thread: ThreadConfig,
    pub llm: LlmConfig,
    pub sanity: SanityConfig,
    pub rules: RulesConfig,
}

/// Debounce settings for message threading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadConfig {
    /// Quiet period after the latest event before a burst is flushed.
    pub window_ms: u64,
}

impl Default for ThreadConfig {
    fn default() -> Self {
        Self { window_ms: 1000 }
    }
}

impl ThreadConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }
}

/// Connection and retry settings for the LLM provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of an OpenAI-compatible API. Empty disables the LLM.
    pub api_url: String,
    pub api_model: String,
    pub api_key: String,
    pub temperature: f64,
    /// Upper bound on one resolution call, retries included.
    pub timeout_secs: u64,
    pub max_attempts: u32,
    /// First retry delay; doubles on every further attempt.
    pub initial_backoff_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            api_model: "gpt-4o-mini".to_owned(),
            api_key: String::new(),
            temperature: 0.0,
            timeout_secs: 30,
            max_attempts: 3,
            initial_backoff_ms: 500,
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        !self.api_url.trim().is_empty()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    /// The configured key, falling back to [`API_KEY_ENV`].
    pub fn effective_api_key(&self) -> String {
        if self.api_key.is_empty() {
            std::env::var(API_KEY_ENV).unwrap_or_default()
        } else {
            self.api_key.clone()
        }
    }
}

/// Bounds applied to LLM-derived due times before they are trusted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SanityConfig {
    pub past_tolerance_secs: u64,
    pub max_future_years: u32,
}

impl Default for SanityConfig {
    fn default() -> Self {
        Self {
            past_tolerance_secs: 300,
            max_future_years: 5,
        }
    }
}

/// Rule-engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// "HH:MM" used when an expression names a day but no time.
    pub default_time: String,
    pub past_time_policy: PastTimePolicy,
    pub week_start: WeekStartDay,
}

impl Default for RulesConfig {
    fn default() -> Self {
        Self {
            default_time: format!("{DEFAULT_HOUR:02}:{DEFAULT_MINUTE:02}"),
            past_time_policy: PastTimePolicy::default(),
            week_start: WeekStartDay::default(),
        }
    }
}

impl RulesConfig {
    pub fn default_naive_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(&self.default_time, "%H:%M").map_err(|e| {
            IntakeError::Config(format!(
                "rules.default_time '{}' is not HH:MM: {e}",
                self.default_time
            ))
        })
    }

    pub fn rule_options(&self) -> Result<RuleOptions> {
        Ok(RuleOptions {
            default_time: self.default_naive_time()?,
            past_time_policy: self.past_time_policy,
            week_start: self.week_start,
        })
    }
}

impl IntakeConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| IntakeError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            IntakeError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<()> {
        if self.thread.window_ms == 0 {
            return Err(IntakeError::Config("thread.window_ms must be > 0".into()));
        }
        if self.llm.max_attempts == 0 {
            return Err(IntakeError::Config("llm.max_attempts must be >= 1".into()));
        }
        if self.llm.timeout_secs == 0 {
            return Err(IntakeError::Config("llm.timeout_secs must be > 0".into()));
        }
        if self.sanity.max_future_years == 0 {
            return Err(IntakeError::Config(
                "sanity.max_future_years must be >= 1".into(),
            ));
        }
        self.rules.default_naive_time()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = IntakeConfig::from_toml_str("").unwrap();
        assert_eq!(config, IntakeConfig::default());
        assert_eq!(config.thread.window(), Duration::from_secs(1));
        assert_eq!(config.llm.timeout(), Duration::from_secs(30));
        assert_eq!(config.llm.max_attempts, 3);
        assert_eq!(config.rules.default_time, "09:00");
        assert!(!config.llm.is_enabled());
    }

    #[test]
    fn test_partial_document() {
        let config = IntakeConfig::from_toml_str(
            r#"
            [thread]
            window_ms = 1500

            [llm]
            api_url = "http://localhost:11434"
            api_model = "llama3"

            [rules]
            past_time_policy = "roll_forward"
            week_start = "sunday"
            default_time = "08:30"
            "#,
        )
        .unwrap();
        assert_eq!(config.thread.window_ms, 1500);
        assert!(config.llm.is_enabled());
        assert_eq!(config.llm.max_attempts, 3);
        let options = config.rules.rule_options().unwrap();
        assert_eq!(options.past_time_policy, PastTimePolicy::RollForward);
        assert_eq!(options.week_start, WeekStartDay::Sunday);
        assert_eq!(options.default_time, NaiveTime::from_hms_opt(8, 30, 0).unwrap());
    }

    #[test]
    fn test_rejects_bad_default_time() {
        let err = IntakeConfig::from_toml_str("[rules]\ndefault_time = \"9am\"").unwrap_err();
        assert!(matches!(err, IntakeError::Config(_)));
    }

    #[test]
    fn test_rejects_zero_attempts() {
        let err = IntakeConfig::from_toml_str("[llm]\nmax_attempts = 0").unwrap_err();
        assert!(err.to_string().contains("max_attempts"), "got: {err}");
    }

    #[test]
    fn test_rejects_unknown_policy() {
        let err =
            IntakeConfig::from_toml_str("[rules]\npast_time_policy = \"whenever\"").unwrap_err();
        assert!(err.to_string().contains("invalid TOML"), "got: {err}");
    }
}
