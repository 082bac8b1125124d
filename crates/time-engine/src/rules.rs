//! Rule-based resolution of time expressions embedded in free-form text.
//!
//! The calculator scans a sentence ("remind me to call mom today at 5pm") for
//! a fixed, ordered list of pattern families. Families are evaluated top to
//! bottom and the first one that yields an instant wins:
//!
//! 1. `relative_offset` — "in 2 hours", "in a week" (pure UTC arithmetic)
//! 2. `same_day` — "today at 5am", "today 17:30", "noon", "midnight"
//! 3. `next_day` — "tomorrow", "tomorrow at 8pm", "5pm tomorrow"
//! 4. `month_day` — "Nov 25", "25th of November at 3pm"
//! 5. `weekday` — "Monday", "next Friday at 10:30am", "at 5 p.m. on Friday"
//!
//! No match is a legitimate outcome (`Ok(None)`): it tells the caller to
//! escalate to a slower resolver. No network calls and no clock reads happen
//! here; the reference instant is always supplied by the caller.

use std::sync::LazyLock;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::candidate::ParsedTimeCandidate;
use crate::error::Result;
use crate::timezone::{local_to_utc, parse_timezone};

/// Hour used when an expression names a day but no time ("Nov 25", "Monday").
pub const DEFAULT_HOUR: u32 = 9;
/// Minute used together with [`DEFAULT_HOUR`].
pub const DEFAULT_MINUTE: u32 = 0;

/// The default time-of-day as a `NaiveTime`.
pub fn default_time() -> NaiveTime {
    NaiveTime::from_hms_opt(DEFAULT_HOUR, DEFAULT_MINUTE, 0).unwrap_or(NaiveTime::MIN)
}

// ── Options ─────────────────────────────────────────────────────────────────

/// Which day begins a week. Only affects "next <weekday>", which skips to the
/// week after the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeekStartDay {
    /// ISO 8601 standard (Monday = day 0 of the week).
    #[default]
    Monday,
    /// US/Canada convention (Sunday = day 0 of the week).
    Sunday,
}

/// What to do with "today at <time>" when that time has already passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PastTimePolicy {
    /// Return today's instant even though it is in the past.
    #[default]
    KeepToday,
    /// Move the instant to the same wall-clock time tomorrow.
    RollForward,
}

/// Tuning knobs for [`RuleBasedTimeCalculator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOptions {
    pub default_time: NaiveTime,
    pub past_time_policy: PastTimePolicy,
    pub week_start: WeekStartDay,
}

impl Default for RuleOptions {
    fn default() -> Self {
        Self {
            default_time: default_time(),
            past_time_policy: PastTimePolicy::default(),
            week_start: WeekStartDay::default(),
        }
    }
}

// ── Calculator ──────────────────────────────────────────────────────────────

/// Everything a pattern family needs to turn a match into an instant.
struct Context<'a> {
    reference: DateTime<Utc>,
    local: DateTime<Tz>,
    tz: Tz,
    options: &'a RuleOptions,
}

struct PatternFamily {
    name: &'static str,
    resolve: fn(&Context<'_>, &str) -> Option<DateTime<Utc>>,
}

/// Evaluation order is significant: first match wins.
const FAMILIES: &[PatternFamily] = &[
    PatternFamily {
        name: "relative_offset",
        resolve: resolve_relative_offset,
    },
    PatternFamily {
        name: "same_day",
        resolve: resolve_same_day,
    },
    PatternFamily {
        name: "next_day",
        resolve: resolve_next_day,
    },
    PatternFamily {
        name: "month_day",
        resolve: resolve_month_day,
    },
    PatternFamily {
        name: "weekday",
        resolve: resolve_weekday,
    },
];

/// Deterministic, offline resolver for the common time expressions.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedTimeCalculator {
    options: RuleOptions,
}

impl RuleBasedTimeCalculator {
    pub fn new(options: RuleOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RuleOptions {
        &self.options
    }

    /// Names of the pattern families, in evaluation order.
    pub fn family_names() -> Vec<&'static str> {
        FAMILIES.iter().map(|f| f.name).collect()
    }

    /// Try to resolve a time expression found anywhere in `text`.
    ///
    /// Returns `Ok(None)` when no family matches.
    ///
    /// # Errors
    ///
    /// Returns [`TimeEngineError::InvalidTimezone`](crate::TimeEngineError::InvalidTimezone)
    /// if `zone` is not a valid IANA timezone.
    ///
    /// # Examples
    ///
    /// ```
    /// use chrono::{TimeZone, Utc};
    /// use time_engine::RuleBasedTimeCalculator;
    ///
    /// let calc = RuleBasedTimeCalculator::default();
    /// let reference = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
    /// let candidate = calc
    ///     .try_resolve("remind me in 2 hours", reference, "Europe/Paris")
    ///     .unwrap()
    ///     .unwrap();
    /// assert_eq!(candidate.due_at_utc, Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap());
    /// ```
    pub fn try_resolve(
        &self,
        text: &str,
        reference: DateTime<Utc>,
        zone: &str,
    ) -> Result<Option<ParsedTimeCandidate>> {
        let tz = parse_timezone(zone)?;
        let ctx = Context {
            reference,
            local: reference.with_timezone(&tz),
            tz,
            options: &self.options,
        };
        let normalized = normalize_text(text);

        for family in FAMILIES {
            if let Some(due) = (family.resolve)(&ctx, &normalized) {
                debug!(pattern = family.name, due = %due, "rule family matched");
                return Ok(Some(ParsedTimeCandidate::from_rule(due, family.name)));
            }
        }
        Ok(None)
    }
}

// ── Patterns ────────────────────────────────────────────────────────────────

/// Any time reading that may follow "at". Accepts "5pm", "5 p.m." and "5".
const TIME_ANY: &str = r"\d{1,2}(?::\d{2})?(?:\s*(?:a\.?m|p\.?m)\b\.?|\b)|noon|midnight|morning|afternoon|evening|night";
/// A time reading that is unambiguous without a preceding "at".
const TIME_STRICT: &str = r"\d{1,2}(?::\d{2})?\s*(?:a\.?m|p\.?m)\b\.?|\d{1,2}:\d{2}\b|noon|midnight|morning|afternoon|evening|night";
const MONTH: &str = r"jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?|aug(?:ust)?|sept?(?:ember)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?";
const WEEKDAY: &str = r"monday|tuesday|wednesday|thursday|friday|saturday|sunday|mon|tues?|wed|thu(?:rs?)?|fri";

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("invalid built-in pattern {pattern}: {e}"))
}

/// Optional trailing time: ", at 3pm", " 15:30", " evening".
fn trailing_time() -> String {
    format!(r"(?:,?\s+(?:at\s+(?P<time>{TIME_ANY})|(?P<bare>{TIME_STRICT})))?")
}

/// Optional time placed before the day: "5pm ", "at 5 on ", "noon on ".
fn leading_time() -> String {
    format!(
        r"(?:\b(?:at\s+(?P<lead_at>{TIME_ANY})|(?P<lead>{TIME_STRICT}))\s+(?:on\s+)?)?"
    )
}

static RELATIVE_OFFSET: LazyLock<Regex> = LazyLock::new(|| {
    compile(r"\bin\s+(?P<n>\d+|an?|one)\s+(?P<unit>minutes?|mins?|hours?|hrs?|days?|weeks?|wks?)\b")
});

static TODAY_AT: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"\btoday\s+(?:at\s+)?(?P<time>{TIME_ANY})")));

static AT_TODAY: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"\bat\s+(?P<time>{TIME_ANY})\s+today\b")));

static NOON_OR_MIDNIGHT: LazyLock<Regex> = LazyLock::new(|| compile(r"\b(?P<time>noon|midnight)\b"));

static TOMORROW_AT: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(r"{}\btomorrow\b{}", leading_time(), trailing_time()))
});

static MONTH_DAY: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"{}\b(?P<month>{MONTH})\.?\s+(?P<day>\d{{1,2}})(?:st|nd|rd|th)?\b(?:,?\s+(?P<year>\d{{4}})\b)?{}",
        leading_time(),
        trailing_time()
    ))
});

static DAY_MONTH: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"{}\b(?P<day>\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?(?P<month>{MONTH})\b(?:,?\s+(?P<year>\d{{4}})\b)?{}",
        leading_time(),
        trailing_time()
    ))
});

static WEEKDAY_REF: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"{}\b(?:(?P<modifier>next|this|on)\s+)?(?P<weekday>{WEEKDAY})\b{}",
        leading_time(),
        trailing_time()
    ))
});

/// Any expression that names a specific day other than today.
static OTHER_DAY: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"\btomorrow\b|\b(?:{WEEKDAY})\b|\b(?:{MONTH})\.?\s+\d{{1,2}}\b|\b\d{{1,2}}(?:st|nd|rd|th)?\s+(?:of\s+)?(?:{MONTH})\b"
    ))
});

// ── Pattern families ────────────────────────────────────────────────────────

/// "in N (minute|hour|day|week)s": computed directly in UTC.
fn resolve_relative_offset(ctx: &Context<'_>, s: &str) -> Option<DateTime<Utc>> {
    let caps = RELATIVE_OFFSET.captures(s)?;
    let n = match &caps["n"] {
        "a" | "an" | "one" => 1,
        digits => digits.parse::<i64>().ok()?,
    };
    let seconds = unit_to_seconds(n, normalize_time_unit(&caps["unit"])?)?;
    ctx.reference
        .checked_add_signed(Duration::try_seconds(seconds)?)
}

/// "today (at) H(:MM)(am|pm)", and bare "noon"/"midnight" when no other day is
/// named in the text.
fn resolve_same_day(ctx: &Context<'_>, s: &str) -> Option<DateTime<Utc>> {
    let time_text = TODAY_AT
        .captures(s)
        .or_else(|| AT_TODAY.captures(s))
        .map(|caps| caps["time"].to_string())
        .or_else(|| {
            if OTHER_DAY.find_iter(s).any(|m| !follows_apostrophe(s, m.start())) {
                return None;
            }
            NOON_OR_MIDNIGHT
                .captures(s)
                .map(|caps| caps["time"].to_string())
        })?;

    let time = parse_time_string(&time_text)?;
    let today = ctx.local.date_naive();
    let due = local_to_utc(&today.and_time(time), &ctx.tz).ok()?;

    if due <= ctx.reference && ctx.options.past_time_policy == PastTimePolicy::RollForward {
        let tomorrow = today.succ_opt()?;
        return local_to_utc(&tomorrow.and_time(time), &ctx.tz).ok();
    }
    Some(due)
}

/// "tomorrow", "tomorrow at 8pm", "at 8pm tomorrow", "5pm tomorrow".
fn resolve_next_day(ctx: &Context<'_>, s: &str) -> Option<DateTime<Utc>> {
    let caps = TOMORROW_AT.captures(s)?;
    let time = captured_time(&caps, ctx.options)?;
    let tomorrow = ctx.local.date_naive().succ_opt()?;
    local_to_utc(&tomorrow.and_time(time), &ctx.tz).ok()
}

/// "Nov 25", "25 Nov", "november 25th at 3pm": nearest future occurrence.
fn resolve_month_day(ctx: &Context<'_>, s: &str) -> Option<DateTime<Utc>> {
    // "july 18:00" is a month followed by a time, not July 18.
    let caps = [&*MONTH_DAY, &*DAY_MONTH]
        .into_iter()
        .filter_map(|re| re.captures(s))
        .filter(|caps| caps.name("day").is_some_and(|d| !s[d.end()..].starts_with(':')))
        .min_by_key(|caps| caps.get(0).map_or(usize::MAX, |m| m.start()))?;
    let month = parse_month(&caps["month"])?;
    let day: u32 = caps["day"].parse().ok()?;
    let time = captured_time(&caps, ctx.options)?;

    if let Some(year) = caps.name("year") {
        let year: i32 = year.as_str().parse().ok()?;
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        return local_to_utc(&date.and_time(time), &ctx.tz).ok();
    }

    // Feb 29 may be up to eight years away.
    let this_year = ctx.local.year();
    (this_year..=this_year + 8)
        .filter_map(|year| NaiveDate::from_ymd_opt(year, month, day))
        .filter_map(|date| local_to_utc(&date.and_time(time), &ctx.tz).ok())
        .find(|due| *due > ctx.reference)
}

/// "Monday" / "this Monday" / "on Monday": nearest future occurrence.
/// "next Monday": the occurrence in the following week, even if this week's
/// Monday is still ahead.
fn resolve_weekday(ctx: &Context<'_>, s: &str) -> Option<DateTime<Utc>> {
    // "c'mon" is not Monday.
    let caps = WEEKDAY_REF
        .captures_iter(s)
        .find(|caps| caps.name("weekday").is_some_and(|w| !follows_apostrophe(s, w.start())))?;
    let weekday = parse_weekday(&caps["weekday"])?;
    let time = captured_time(&caps, ctx.options)?;
    let today = ctx.local.date_naive();
    let current = ctx.local.weekday();

    let is_next = caps.name("modifier").map(|m| m.as_str()) == Some("next");
    if is_next {
        let ws = ctx.options.week_start;
        let days_to_next_week = 7 - days_from_week_start(current, ws);
        let date =
            today + Duration::days(days_to_next_week + days_from_week_start(weekday, ws));
        return local_to_utc(&date.and_time(time), &ctx.tz).ok();
    }

    let days_ahead = (i64::from(weekday.num_days_from_monday())
        - i64::from(current.num_days_from_monday())
        + 7)
        % 7;
    let date = today + Duration::days(days_ahead);
    let due = local_to_utc(&date.and_time(time), &ctx.tz).ok()?;
    if due > ctx.reference {
        return Some(due);
    }
    local_to_utc(&(date + Duration::days(7)).and_time(time), &ctx.tz).ok()
}

// ── Parsing helpers ─────────────────────────────────────────────────────────

/// Lowercase and collapse runs of whitespace.
fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// The time captured by [`trailing_time`] or [`leading_time`], or the
/// configured default when the expression names no time.
fn captured_time(caps: &Captures<'_>, options: &RuleOptions) -> Option<NaiveTime> {
    let found = ["time", "bare", "lead_at", "lead"]
        .into_iter()
        .find_map(|name| caps.name(name));
    match found {
        Some(m) => parse_time_string(m.as_str()),
        None => Some(options.default_time),
    }
}

fn follows_apostrophe(s: &str, start: usize) -> bool {
    s[..start].ends_with(['\'', '\u{2019}'])
}

/// How many days `weekday` is from the week-start day.
fn days_from_week_start(weekday: Weekday, week_start: WeekStartDay) -> i64 {
    match week_start {
        WeekStartDay::Monday => i64::from(weekday.num_days_from_monday()),
        WeekStartDay::Sunday => i64::from(weekday.num_days_from_sunday()),
    }
}

/// Parse a weekday name (full or abbreviated).
fn parse_weekday(s: &str) -> Option<Weekday> {
    match s {
        "monday" | "mon" => Some(Weekday::Mon),
        "tuesday" | "tue" | "tues" => Some(Weekday::Tue),
        "wednesday" | "wed" => Some(Weekday::Wed),
        "thursday" | "thu" | "thur" | "thurs" => Some(Weekday::Thu),
        "friday" | "fri" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

/// Parse a month name to number (1-12).
fn parse_month(s: &str) -> Option<u32> {
    match s {
        "january" | "jan" => Some(1),
        "february" | "feb" => Some(2),
        "march" | "mar" => Some(3),
        "april" | "apr" => Some(4),
        "may" => Some(5),
        "june" | "jun" => Some(6),
        "july" | "jul" => Some(7),
        "august" | "aug" => Some(8),
        "september" | "sep" | "sept" => Some(9),
        "october" | "oct" => Some(10),
        "november" | "nov" => Some(11),
        "december" | "dec" => Some(12),
        _ => None,
    }
}

/// Map named time to NaiveTime.
fn named_time_to_naive(s: &str) -> Option<NaiveTime> {
    match s {
        "morning" => NaiveTime::from_hms_opt(9, 0, 0),
        "noon" => NaiveTime::from_hms_opt(12, 0, 0),
        "afternoon" => NaiveTime::from_hms_opt(13, 0, 0),
        "evening" => NaiveTime::from_hms_opt(18, 0, 0),
        "night" => NaiveTime::from_hms_opt(21, 0, 0),
        "midnight" => NaiveTime::from_hms_opt(0, 0, 0),
        _ => None,
    }
}

/// Parse a time string: "5", "5am", "2:30pm", "2 p.m.", "14:00", "noon".
fn parse_time_string(s: &str) -> Option<NaiveTime> {
    let s = s.trim();
    if let Some(t) = named_time_to_naive(s) {
        return Some(t);
    }

    let compact = s.replace([' ', '.'], "");
    let (time_part, meridiem) = if let Some(rest) = compact.strip_suffix("pm") {
        (rest, Some(true))
    } else if let Some(rest) = compact.strip_suffix("am") {
        (rest, Some(false))
    } else {
        (compact.as_str(), None)
    };

    let mut parts = time_part.split(':');
    let hour: u32 = parts.next()?.parse().ok()?;
    let minute: u32 = match parts.next() {
        Some(m) => m.parse().ok()?,
        None => 0,
    };
    if parts.next().is_some() {
        return None;
    }

    let hour24 = match (hour, meridiem) {
        (h, Some(_)) if h == 0 || h > 12 => return None,
        (12, Some(true)) => 12,
        (12, Some(false)) => 0,
        (h, Some(true)) => h + 12,
        (h, _) => h,
    };

    NaiveTime::from_hms_opt(hour24, minute, 0)
}

/// Normalize a time unit name to a standard form.
fn normalize_time_unit(s: &str) -> Option<&'static str> {
    match s {
        "minute" | "minutes" | "min" | "mins" => Some("minutes"),
        "hour" | "hours" | "hr" | "hrs" => Some("hours"),
        "day" | "days" => Some("days"),
        "week" | "weeks" | "wk" | "wks" => Some("weeks"),
        _ => None,
    }
}

/// Convert a number and unit to total seconds.
fn unit_to_seconds(n: i64, unit: &str) -> Option<i64> {
    let multiplier = match unit {
        "minutes" => 60,
        "hours" => 3600,
        "days" => 86400,
        "weeks" => 604800,
        _ => return None,
    };
    n.checked_mul(multiplier)
}

// ── Tests ───────────────────────────────────────────────────────────────────
