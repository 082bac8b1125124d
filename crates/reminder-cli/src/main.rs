//! CLI binary for reminder resolution.
//!
//! ```bash
//! remind resolve "call mom tomorrow at 6pm" --zone Europe/Berlin
//! remind convert 2024-03-10T07:30:00Z --zone America/New_York
//! remind to-utc 2024-03-10T02:30 --zone America/New_York
//! printf 'buy milk\ncaption: for the party\n' | remind listen --zone UTC --offline
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use clap::{Parser, Subcommand};
use reminder_intake::{
    start_intake, ContentType, IntakeConfig, LlmProvider, OpenAiCompatibleProvider,
    RawMessageEvent, ResolutionArbiter, ResolutionFailure, ResolvedTask, ShutdownMode,
    StaticTimezoneDirectory, TaskDispatcher,
};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Exit status when text could not be turned into a task.
const EXIT_UNRESOLVED: i32 = 2;

/// Resolve reminder times and convert between timezones.
#[derive(Parser)]
#[command(name = "remind", version, about)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve a message into a task (JSON). Exits with 2 when unresolved.
    Resolve {
        /// The message text.
        text: String,

        /// IANA timezone of the user.
        #[arg(short, long)]
        zone: String,

        /// Reference instant (RFC 3339). Defaults to now.
        #[arg(long)]
        now: Option<String>,

        /// Path to TOML configuration file.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Use the rule engine only, even if an LLM is configured.
        #[arg(long)]
        offline: bool,
    },

    /// Show an RFC 3339 instant in a timezone.
    Convert {
        datetime: String,

        #[arg(short, long)]
        zone: String,
    },

    /// Convert a local wall-clock time to UTC.
    ToUtc {
        /// Local time, YYYY-MM-DDTHH:MM[:SS].
        local: String,

        #[arg(short, long)]
        zone: String,
    },

    /// Read messages from stdin, one per line, and thread them like a chat.
    ///
    /// Lines starting with "caption:" or "ocr:" are treated as a photo
    /// caption or screenshot text.
    Listen {
        #[arg(short, long)]
        zone: String,

        #[arg(short, long)]
        config: Option<PathBuf>,

        #[arg(long)]
        offline: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                EnvFilter::new(format!(
                    "reminder_intake={default_level},time_engine={default_level},remind={default_level},warn"
                ))
            }),
        )
        .init();

    match cli.command {
        Command::Resolve {
            text,
            zone,
            now,
            config,
            offline,
        } => {
            let resolved = run_resolve(&text, &zone, now.as_deref(), config, offline).await?;
            if !resolved {
                std::process::exit(EXIT_UNRESOLVED);
            }
            Ok(())
        }
        Command::Convert { datetime, zone } => run_convert(&datetime, &zone),
        Command::ToUtc { local, zone } => run_to_utc(&local, &zone),
        Command::Listen {
            zone,
            config,
            offline,
        } => run_listen(&zone, config, offline).await,
    }
}

fn load_config(path: Option<PathBuf>) -> Result<IntakeConfig> {
    match path {
        Some(path) => IntakeConfig::load(&path)
            .with_context(|| format!("loading config from {}", path.display())),
        None => Ok(IntakeConfig::default()),
    }
}

fn provider_for(config: &IntakeConfig, offline: bool) -> Option<Arc<dyn LlmProvider>> {
    if offline || !config.llm.is_enabled() {
        return None;
    }
    Some(Arc::new(OpenAiCompatibleProvider::from_config(&config.llm)))
}

/// Prints the task or the failure. Returns whether a task was produced.
async fn run_resolve(
    text: &str,
    zone: &str,
    now: Option<&str>,
    config: Option<PathBuf>,
    offline: bool,
) -> Result<bool> {
    let config = load_config(config)?;
    let reference: DateTime<Utc> = match now {
        Some(now) => time_engine::parse_rfc3339(now).context("parsing --now")?,
        None => Utc::now(),
    };

    let arbiter = ResolutionArbiter::from_config(
        &config,
        provider_for(&config, offline),
        CancellationToken::new(),
    )?;

    match arbiter.arbitrate(text, reference, zone).await {
        Ok(task) => {
            println!("{}", serde_json::to_string_pretty(&task)?);
            Ok(true)
        }
        Err(failure) => {
            println!("{}", serde_json::to_string_pretty(&failure)?);
            Ok(false)
        }
    }
}

fn run_convert(datetime: &str, zone: &str) -> Result<()> {
    let converted = time_engine::convert_timezone(datetime, zone)?;
    println!("{}", serde_json::to_string_pretty(&converted)?);
    Ok(())
}

fn run_to_utc(local: &str, zone: &str) -> Result<()> {
    let naive = ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(local, fmt).ok())
        .with_context(|| format!("'{local}' is not YYYY-MM-DDTHH:MM[:SS]"))?;
    let instant = time_engine::to_utc(&naive, zone)?;
    println!("{}", instant.to_rfc3339_opts(SecondsFormat::Secs, true));
    Ok(())
}

/// Writes every outcome as one JSON line on stdout.
struct StdoutDispatcher;

#[async_trait]
impl TaskDispatcher for StdoutDispatcher {
    async fn dispatch(&self, user_id: &str, task: ResolvedTask) -> Result<()> {
        println!("{}", json!({ "user_id": user_id, "task": task }));
        Ok(())
    }

    async fn clarify(&self, user_id: &str, failure: ResolutionFailure) -> Result<()> {
        println!("{}", json!({ "user_id": user_id, "clarify": failure }));
        Ok(())
    }
}

fn parse_line(line: &str) -> (ContentType, &str) {
    if let Some(rest) = line.strip_prefix("caption:") {
        (ContentType::PhotoCaption, rest.trim())
    } else if let Some(rest) = line.strip_prefix("ocr:") {
        (ContentType::ScreenshotText, rest.trim())
    } else {
        (ContentType::Text, line.trim())
    }
}

async fn run_listen(zone: &str, config: Option<PathBuf>, offline: bool) -> Result<()> {
    let config = load_config(config)?;
    let (coordinator, mut failures) = start_intake(
        &config,
        provider_for(&config, offline),
        Arc::new(StaticTimezoneDirectory::new(zone)),
        Arc::new(StdoutDispatcher),
    )?;

    tokio::spawn(async move {
        while let Some(failure) = failures.recv().await {
            warn!(user_id = %failure.user_id, reason = %failure.reason, "flush failed");
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("reading stdin")? else { break };
                let (content_type, text) = parse_line(&line);
                if text.is_empty() {
                    continue;
                }
                let event = RawMessageEvent::text("cli", Utc::now(), text)
                    .with_content_type(content_type);
                coordinator.submit(event).await?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("received Ctrl+C, shutting down");
                break;
            }
        }
    }

    coordinator.shutdown(ShutdownMode::Flush).await;
    Ok(())
}
