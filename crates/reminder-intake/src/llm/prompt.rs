//! Request composition for the time/title extraction call.

use chrono::{DateTime, NaiveDateTime, NaiveTime, Utc};

use super::LlmRequest;

/// The only variables the prompt depends on.
#[derive(Debug, Clone)]
pub struct PromptContext<'a> {
    pub current_utc: DateTime<Utc>,
    pub local_now: NaiveDateTime,
    pub zone_name: &'a str,
    pub zone_offset: &'a str,
    pub merged_text: &'a str,
    pub default_time: NaiveTime,
}

const SYSTEM_PROMPT: &str = "\
You turn a user's message into a reminder. Reply with a single JSON object and nothing else.
The object must have exactly these keys:
  \"title\": short imperative title, at most 60 characters, in the user's language
  \"description\": one or two sentences with any useful detail from the message
  \"iso_local_time\": the due time as ISO 8601 local time YYYY-MM-DDTHH:MM:SS in the user's timezone, or null if the message names no time
  \"confidence\": \"high\" if the message states an unambiguous time, otherwise \"low\"
Never invent a time the user did not imply. Times must be in the future.";

pub fn build_request(ctx: &PromptContext<'_>, temperature: f64) -> LlmRequest {
    let user = format!(
        "Current UTC time: {current_utc}\n\
         User timezone: {zone} (UTC{offset})\n\
         User local time: {local_now}\n\
         Default time when only a day is given: {default_time}\n\
         Message:\n{text}",
        current_utc = ctx.current_utc.format("%Y-%m-%dT%H:%M:%SZ"),
        zone = ctx.zone_name,
        offset = ctx.zone_offset,
        local_now = ctx.local_now.format("%Y-%m-%dT%H:%M:%S (%A)"),
        default_time = ctx.default_time.format("%H:%M"),
        text = ctx.merged_text,
    );
    LlmRequest {
        system: SYSTEM_PROMPT.to_owned(),
        user,
        temperature,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone};

    #[test]
    fn test_prompt_carries_context_variables() {
        let ctx = PromptContext {
            current_utc: Utc.with_ymd_and_hms(2024, 1, 15, 15, 0, 0).unwrap(),
            local_now: NaiveDate::from_ymd_opt(2024, 1, 15)
                .unwrap()
                .and_hms_opt(10, 0, 0)
                .unwrap(),
            zone_name: "America/New_York",
            zone_offset: "-05:00",
            merged_text: "dentist sometime after lunch",
            default_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        };
        let request = build_request(&ctx, 0.0);
        assert!(request.user.contains("Current UTC time: 2024-01-15T15:00:00Z"));
        assert!(request.user.contains("America/New_York (UTC-05:00)"));
        assert!(request.user.contains("2024-01-15T10:00:00 (Monday)"));
        assert!(request.user.contains("Default time when only a day is given: 09:00"));
        assert!(request.user.ends_with("dentist sometime after lunch"));
        assert!(request.system.contains("iso_local_time"));
    }
}
