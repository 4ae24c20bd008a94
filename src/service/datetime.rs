//! Datetime normalization between the scheduler's representations and UTC.
//!
//! The scheduler reports the same instant in several shapes depending on the
//! endpoint: ISO-8601 with a compact `-0400` offset, a human date/time pair
//! ("June 17, 2026" / "10:15am") plus an IANA timezone name, and naive local
//! strings from relays. Everything is stored as UTC.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum DateTimeError {
    #[error("unrecognized datetime {0:?}")]
    Unrecognized(String),
    #[error("unrecognized date {0:?}")]
    UnrecognizedDate(String),
    #[error("unrecognized time of day {0:?}")]
    UnrecognizedTime(String),
}

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];
const DATE_FORMATS: &[&str] = &["%B %d, %Y", "%b %d, %Y", "%Y-%m-%d", "%m/%d/%Y"];
const CLOCK_FORMATS: &[&str] = &["%I:%M%p", "%I:%M %p", "%I%p", "%I %p", "%H:%M:%S", "%H:%M"];

pub fn resolve_timezone(name: Option<&str>, fallback: Tz) -> Tz {
    name.map(str::trim)
        .filter(|n| !n.is_empty())
        .and_then(|n| n.parse::<Tz>().ok())
        .unwrap_or(fallback)
}

/// Parses any supported start representation into UTC. Strings without an
/// offset are read as wall-clock time in `tz`.
pub fn normalize_datetime(raw: &str, tz: Tz) -> Result<DateTime<Utc>, DateTimeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(DateTimeError::Unrecognized(raw.to_string()));
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    let rewritten = rewrite_offset(trimmed);
    if let Ok(dt) = DateTime::parse_from_rfc3339(&rewritten) {
        return Ok(dt.with_timezone(&Utc));
    }

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(localize(naive, tz));
        }
    }

    Err(DateTimeError::Unrecognized(raw.to_string()))
}

/// Combines the scheduler's separate human date and time fields.
pub fn combine_date_time(date: &str, time: &str, tz: Tz) -> Result<DateTime<Utc>, DateTimeError> {
    let day = parse_date(date)?;
    let clock = parse_clock(time)?;
    Ok(localize(day.and_time(clock), tz))
}

pub fn parse_date(raw: &str) -> Result<NaiveDate, DateTimeError> {
    let trimmed = raw.trim();
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(trimmed, f).ok())
        .ok_or_else(|| DateTimeError::UnrecognizedDate(raw.to_string()))
}

pub fn parse_clock(raw: &str) -> Result<NaiveTime, DateTimeError> {
    let cleaned = raw.trim().to_ascii_uppercase();
    CLOCK_FORMATS
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(&cleaned, f).ok())
        .ok_or_else(|| DateTimeError::UnrecognizedTime(raw.to_string()))
}

/// Wall-clock time in `tz` to UTC. A time that falls in a DST gap moves
/// forward by an hour; an ambiguous time takes the earlier instant.
pub fn localize(naive: NaiveDateTime, tz: Tz) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => dt.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
        }
    }
}

/// Formats an instant the way the scheduler expects on create/reschedule.
pub fn format_for_scheduler(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz)
        .format("%Y-%m-%dT%H:%M:%S%:z")
        .to_string()
}

// "2026-06-17 10:15:00-0400" -> "2026-06-17T10:15:00-04:00"
// "2026-06-17T10:15:00+02"   -> "2026-06-17T10:15:00+02:00"
fn rewrite_offset(raw: &str) -> String {
    let mut value = raw.to_string();
    if value.len() > 10 && value.as_bytes()[10] == b' ' {
        value.replace_range(10..11, "T");
    }

    let bytes = value.as_bytes();
    let len = bytes.len();
    let is_digit = |i: usize| bytes.get(i).is_some_and(u8::is_ascii_digit);
    let is_sign = |i: usize| matches!(bytes.get(i), Some(b'+') | Some(b'-'));

    if len >= 6 && is_sign(len - 5) && (len - 4..len).all(is_digit) && is_digit(len - 6) {
        value.insert(len - 2, ':');
    } else if len >= 4 && is_sign(len - 3) && (len - 2..len).all(is_digit) && is_digit(len - 4) {
        value.push_str(":00");
    }
    value
}
