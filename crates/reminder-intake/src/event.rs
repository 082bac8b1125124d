//! Input events and the merged intent built from them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How the upstream transport obtained the text of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Text,
    PhotoCaption,
    ScreenshotText,
    VoiceTranscript,
}

/// One inbound chat message or attachment, already reduced to plain text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawMessageEvent {
    pub user_id: String,
    pub arrival_time: DateTime<Utc>,
    pub content_type: ContentType,
    pub text: String,
    #[serde(default)]
    pub attachment_refs: Vec<String>,
}

impl RawMessageEvent {
    pub fn text(user_id: impl Into<String>, arrival_time: DateTime<Utc>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            arrival_time,
            content_type: ContentType::Text,
            text: text.into(),
            attachment_refs: Vec::new(),
        }
    }

    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    pub fn with_attachment(mut self, attachment_ref: impl Into<String>) -> Self {
        self.attachment_refs.push(attachment_ref.into());
        self
    }
}

/// A flushed burst of events from one user, treated as a single intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedIntent {
    pub user_id: String,
    pub text: String,
    pub attachment_refs: Vec<String>,
    /// Arrival time of the earliest event in the burst.
    pub reference_time: DateTime<Utc>,
    pub event_count: usize,
}

impl MergedIntent {
    /// Merge events (given in arrival order) into one intent.
    ///
    /// Texts are joined in arrival order, except that when the burst holds
    /// both a photo caption and OCR screenshot text, captions move to the
    /// front: they carry what the user actually typed. Attachments keep
    /// arrival order regardless of content type.
    ///
    /// Returns `None` for an empty burst.
    pub fn merge(user_id: &str, events: &[RawMessageEvent]) -> Option<Self> {
        let reference_time = events.iter().map(|e| e.arrival_time).min()?;

        let has_caption = events
            .iter()
            .any(|e| e.content_type == ContentType::PhotoCaption);
        let has_screenshot = events
            .iter()
            .any(|e| e.content_type == ContentType::ScreenshotText);

        let mut ordered: Vec<&RawMessageEvent> = events.iter().collect();
        if has_caption && has_screenshot {
            // Stable sort keeps arrival order within each group.
            ordered.sort_by_key(|e| e.content_type != ContentType::PhotoCaption);
        }

        let text = ordered
            .iter()
            .map(|e| e.text.trim())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        let attachment_refs = events
            .iter()
            .flat_map(|e| e.attachment_refs.iter().cloned())
            .collect();

        Some(Self {
            user_id: user_id.to_string(),
            text,
            attachment_refs,
            reference_time,
            event_count: events.len(),
        })
    }
}

/// A user's configured zone, as supplied by the settings collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserTimezoneProfile {
    pub user_id: String,
    pub iana_zone_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap() + chrono::Duration::milliseconds(ms)
    }

    #[test]
    fn test_merge_joins_in_arrival_order() {
        let events = vec![
            RawMessageEvent::text("u1", at(0), "buy milk"),
            RawMessageEvent::text("u1", at(500), "for the party")
                .with_content_type(ContentType::PhotoCaption),
        ];
        let intent = MergedIntent::merge("u1", &events).unwrap();
        assert_eq!(intent.text, "buy milk for the party");
        assert_eq!(intent.reference_time, at(0));
        assert_eq!(intent.event_count, 2);
    }

    #[test]
    fn test_merge_caption_precedes_screenshot_text() {
        let events = vec![
            RawMessageEvent::text("u1", at(0), "Invoice #42 due 30 days")
                .with_content_type(ContentType::ScreenshotText)
                .with_attachment("img-1"),
            RawMessageEvent::text("u1", at(200), "pay this tomorrow")
                .with_content_type(ContentType::PhotoCaption)
                .with_attachment("img-2"),
            RawMessageEvent::text("u1", at(400), "please"),
        ];
        let intent = MergedIntent::merge("u1", &events).unwrap();
        assert_eq!(intent.text, "pay this tomorrow Invoice #42 due 30 days please");
        // Attachments ignore the caption reordering.
        assert_eq!(intent.attachment_refs, vec!["img-1", "img-2"]);
    }

    #[test]
    fn test_merge_skips_blank_texts() {
        let events = vec![
            RawMessageEvent::text("u1", at(0), "  ").with_attachment("voice-1"),
            RawMessageEvent::text("u1", at(100), " call mom ")
                .with_content_type(ContentType::VoiceTranscript),
        ];
        let intent = MergedIntent::merge("u1", &events).unwrap();
        assert_eq!(intent.text, "call mom");
        assert_eq!(intent.attachment_refs, vec!["voice-1"]);
    }

    #[test]
    fn test_merge_empty_is_none() {
        assert!(MergedIntent::merge("u1", &[]).is_none());
    }
}
