//! DST-aware conversion between local wall-clock time and UTC instants.
//!
//! All functions are pure: they consult the IANA transition tables bundled
//! with `chrono-tz` and never read the system clock.
//!
//! # DST policy
//!
//! Two local readings do not map to exactly one instant, and both are resolved
//! deterministically:
//!
//! - **Spring-forward gap** (the reading never occurs, e.g. 02:30 on the US
//!   transition day): the reading is resolved on the post-transition side, as
//!   if the clock had already jumped. The offset applied is the one in force
//!   *before* the transition, so 02:30 becomes 03:30 EDT (07:30Z), not 02:30
//!   read at the new offset (06:30Z).
//! - **Fall-back overlap** (the reading occurs twice): the earlier of the two
//!   instants is used.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc,
};
use chrono_tz::Tz;
use serde::Serialize;

use crate::error::{Result, TimeEngineError};

/// Parse an IANA timezone name into `Tz`.
///
/// # Errors
///
/// Returns [`TimeEngineError::InvalidTimezone`] for names outside the IANA
/// database.
pub fn parse_timezone(zone: &str) -> Result<Tz> {
    zone.parse::<Tz>()
        .map_err(|_| TimeEngineError::InvalidTimezone(format!("'{}'", zone)))
}

/// Convert a local wall-clock reading in `zone` to an absolute UTC instant.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use time_engine::timezone::to_utc;
///
/// let local = NaiveDate::from_ymd_opt(2024, 1, 15)
///     .unwrap()
///     .and_hms_opt(5, 0, 0)
///     .unwrap();
/// let utc = to_utc(&local, "America/New_York").unwrap();
/// assert_eq!(utc.to_rfc3339(), "2024-01-15T10:00:00+00:00");
/// ```
///
/// # Errors
///
/// Returns [`TimeEngineError::InvalidTimezone`] when the zone is unknown.
pub fn to_utc(local: &NaiveDateTime, zone: &str) -> Result<DateTime<Utc>> {
    let tz = parse_timezone(zone)?;
    local_to_utc(local, &tz)
}

/// Express a UTC instant as a wall-clock reading in `zone`.
///
/// # Errors
///
/// Returns [`TimeEngineError::InvalidTimezone`] when the zone is unknown.
pub fn to_local(utc: &DateTime<Utc>, zone: &str) -> Result<NaiveDateTime> {
    let tz = parse_timezone(zone)?;
    Ok(utc.with_timezone(&tz).naive_local())
}

/// [`to_utc`] with an already-parsed zone.
pub fn local_to_utc(local: &NaiveDateTime, tz: &Tz) -> Result<DateTime<Utc>> {
    match tz.from_local_datetime(local) {
        LocalResult::Single(dt) => Ok(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest.with_timezone(&Utc)),
        LocalResult::None => resolve_gap(local, tz),
    }
}

/// Resolve a reading inside a spring-forward gap.
///
/// Applying the offset that was in force just before the gap pushes the
/// reading forward by the gap length, landing on the post-transition side.
fn resolve_gap(local: &NaiveDateTime, tz: &Tz) -> Result<DateTime<Utc>> {
    let day_before = *local - Duration::days(1);
    let before = tz.from_local_datetime(&day_before).earliest().ok_or_else(|| {
        TimeEngineError::InvalidDatetime(format!(
            "no offset found before the DST gap at {} in {}",
            local,
            tz.name()
        ))
    })?;
    let offset_secs = before.offset().fix().local_minus_utc();
    let utc_naive = *local - Duration::seconds(i64::from(offset_secs));
    Ok(Utc.from_utc_datetime(&utc_naive))
}

/// The UTC offset of `zone` at `instant`, formatted like `"-05:00"`.
///
/// # Errors
///
/// Returns [`TimeEngineError::InvalidTimezone`] when the zone is unknown.
pub fn utc_offset_at(instant: &DateTime<Utc>, zone: &str) -> Result<String> {
    let tz = parse_timezone(zone)?;
    Ok(format_utc_offset(&instant.with_timezone(&tz)))
}

// ── convert_timezone ────────────────────────────────────────────────────────

/// The result of converting a datetime to a target timezone.
#[derive(Debug, Clone, Serialize)]
pub struct ConvertedDatetime {
    /// The instant in UTC (RFC 3339).
    pub utc: String,
    /// The instant in the target timezone (RFC 3339 with offset).
    pub local: String,
    /// The IANA timezone name used.
    pub timezone: String,
    /// The UTC offset at this instant (e.g., "-05:00").
    pub utc_offset: String,
    /// Whether Daylight Saving Time is active at this instant.
    pub dst_active: bool,
}

/// Convert an RFC 3339 datetime string to a different timezone representation.
///
/// # Errors
///
/// Returns [`TimeEngineError::InvalidDatetime`] if the datetime string cannot
/// be parsed, or [`TimeEngineError::InvalidTimezone`] if the timezone name is
/// not a valid IANA timezone.
pub fn convert_timezone(datetime: &str, target_timezone: &str) -> Result<ConvertedDatetime> {
    let dt = parse_rfc3339(datetime)?;
    let tz = parse_timezone(target_timezone)?;

    let local = dt.with_timezone(&tz);

    Ok(ConvertedDatetime {
        utc: dt.to_rfc3339(),
        local: local.to_rfc3339(),
        timezone: target_timezone.to_string(),
        utc_offset: format_utc_offset(&local),
        dst_active: is_dst_active(&local, &tz),
    })
}

/// Parse an RFC 3339 datetime string into `DateTime<Utc>`.
pub fn parse_rfc3339(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| TimeEngineError::InvalidDatetime(format!("'{}': {}", s, e)))
}

/// Determine if DST is active for a datetime in a timezone.
///
/// The standard offset is the smaller of the January and July offsets, which
/// holds for both hemispheres.
pub fn is_dst_active<T: TimeZone>(dt: &DateTime<T>, tz: &Tz) -> bool {
    let utc = dt.with_timezone(&Utc);
    let year = utc.year();

    let offset_on = |month: u32| {
        Utc.with_ymd_and_hms(year, month, 1, 12, 0, 0)
            .single()
            .map(|sample| sample.with_timezone(tz).offset().fix().local_minus_utc())
    };

    let current_offset = dt.offset().fix().local_minus_utc();
    match (offset_on(1), offset_on(7)) {
        (Some(jan), Some(jul)) => current_offset != jan.min(jul),
        _ => false,
    }
}

/// Format the UTC offset as a string (e.g., "-05:00", "+09:00").
pub fn format_utc_offset<T: TimeZone>(dt: &DateTime<T>) -> String {
    let offset_secs = dt.offset().fix().local_minus_utc();
    let sign = if offset_secs >= 0 { "+" } else { "-" };
    let abs_secs = offset_secs.unsigned_abs();
    let hours = abs_secs / 3600;
    let minutes = (abs_secs % 3600) / 60;
    format!("{sign}{hours:02}:{minutes:02}")
}

// ── Tests ───────────────────────────────────────────────────────────────────
