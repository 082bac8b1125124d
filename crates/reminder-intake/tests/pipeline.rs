//! End-to-end: events in, tasks or clarification requests out.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reminder_intake::test_utils::{answer, Outcome, RecordingDispatcher, ScriptedProvider};
use reminder_intake::{
    start_intake, ContentType, FailureKind, IntakeConfig, LlmProvider, RawMessageEvent,
    ShutdownMode, StaticTimezoneDirectory,
};
use time_engine::CandidateSource;

fn config() -> IntakeConfig {
    IntakeConfig::from_toml_str("[llm]\napi_url = \"http://llm.invalid\"\n").unwrap()
}

fn at(ms: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap() + chrono::Duration::milliseconds(ms)
}

#[tokio::test(start_paused = true)]
async fn test_relative_offset_end_to_end() {
    let provider = ScriptedProvider::new([Ok(answer("Take out the bins", None, "low"))]);
    let llm: Arc<dyn LlmProvider> = provider.clone();
    let (dispatcher, mut outcomes) = RecordingDispatcher::new();
    let (coordinator, _failures) = start_intake(
        &config(),
        Some(llm),
        Arc::new(StaticTimezoneDirectory::new("Asia/Tokyo")),
        Arc::new(dispatcher),
    )
    .unwrap();

    coordinator
        .submit(RawMessageEvent::text("u1", at(0), "remind me in 2 hours"))
        .await
        .unwrap();

    match outcomes.recv().await.unwrap() {
        Outcome::Dispatched { user_id, task } => {
            assert_eq!(user_id, "u1");
            assert_eq!(task.due_at_utc, Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
            assert_eq!(task.source, CandidateSource::Rule);
            assert_eq!(task.title, "Take out the bins");
            assert_eq!(task.timezone_name, "Asia/Tokyo");
        }
        other => panic!("expected dispatch, got {other:?}"),
    }
    // One call, for the title only.
    assert_eq!(provider.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_vague_time_asks_for_clarification() {
    let provider = ScriptedProvider::new([Ok(answer(
        "Free time",
        Some("2024-01-08T09:00:00"),
        "low",
    ))]);
    let (dispatcher, mut outcomes) = RecordingDispatcher::new();
    let (coordinator, _failures) = start_intake(
        &config(),
        Some(provider),
        Arc::new(StaticTimezoneDirectory::new("Europe/London")),
        Arc::new(dispatcher),
    )
    .unwrap();

    coordinator
        .submit(RawMessageEvent::text("u1", at(0), "sometime next week when I'm free"))
        .await
        .unwrap();

    match outcomes.recv().await.unwrap() {
        Outcome::Clarified { failure, .. } => {
            assert_eq!(failure.kind, FailureKind::AmbiguousTimeExpression)
        }
        other => panic!("expected clarification, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_photo_burst_becomes_one_task() {
    let (dispatcher, mut outcomes) = RecordingDispatcher::new();
    let (coordinator, _failures) = start_intake(
        &IntakeConfig::default(),
        None,
        Arc::new(StaticTimezoneDirectory::new("UTC")),
        Arc::new(dispatcher),
    )
    .unwrap();

    coordinator
        .submit(
            RawMessageEvent::text("u1", at(0), "INVOICE 2291 Total 120.00 EUR")
                .with_content_type(ContentType::ScreenshotText)
                .with_attachment("screenshot-1"),
        )
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    coordinator
        .submit(
            RawMessageEvent::text("u1", at(400), "pay this tomorrow at 9am")
                .with_content_type(ContentType::PhotoCaption)
                .with_attachment("photo-1"),
        )
        .await
        .unwrap();

    match outcomes.recv().await.unwrap() {
        Outcome::Dispatched { task, .. } => {
            assert_eq!(task.due_at_utc, Utc.with_ymd_and_hms(2024, 1, 2, 9, 0, 0).unwrap());
            assert!(task.title.starts_with("pay this tomorrow at 9am"), "title: {}", task.title);
            assert_eq!(task.attachment_refs, vec!["screenshot-1", "photo-1"]);
        }
        other => panic!("expected dispatch, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_dispatch_failure_is_scoped_to_one_flush() {
    let (dispatcher, _outcomes) = RecordingDispatcher::new();
    let (coordinator, mut failures) = start_intake(
        &IntakeConfig::default(),
        None,
        Arc::new(StaticTimezoneDirectory::new("UTC")),
        Arc::new(dispatcher.failing()),
    )
    .unwrap();

    coordinator
        .submit(RawMessageEvent::text("u1", at(0), "in 10 minutes"))
        .await
        .unwrap();
    let failure = failures.recv().await.unwrap();
    assert_eq!(failure.user_id, "u1");
    assert!(failure.reason.contains("task service unavailable"), "got: {}", failure.reason);

    // The coordinator keeps working for the same user.
    coordinator
        .submit(RawMessageEvent::text("u1", at(5000), "in 20 minutes"))
        .await
        .unwrap();
    assert_eq!(failures.recv().await.unwrap().user_id, "u1");
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_flushes_pending_threads() {
    let (dispatcher, mut outcomes) = RecordingDispatcher::new();
    let (coordinator, _failures) = start_intake(
        &IntakeConfig::default(),
        None,
        Arc::new(StaticTimezoneDirectory::new("UTC")),
        Arc::new(dispatcher),
    )
    .unwrap();

    for user in ["a", "b", "c"] {
        coordinator
            .submit(RawMessageEvent::text(user, at(0), "in 1 hour"))
            .await
            .unwrap();
    }
    coordinator.shutdown(ShutdownMode::Flush).await;

    let mut users = Vec::new();
    while let Ok(outcome) = outcomes.try_recv() {
        match outcome {
            Outcome::Dispatched { user_id, .. } => users.push(user_id),
            other => panic!("expected dispatch, got {other:?}"),
        }
    }
    users.sort();
    assert_eq!(users, vec!["a", "b", "c"]);
}
