//! Due-date handling shared by the server and the client.
//!
//! Due dates travel as plain strings. Input from a date picker is composed
//! into `"YYYY-MM-DD HH:MM:00"` without any timezone shifting; the server
//! stores an instant and returns it as `"YYYY-MM-DDTHH:MM:SS.ffffffZ"`.
//!
//! Accepted grammar for [`parse`]:
//!
//! - `YYYY-MM-DD`
//! - `YYYY-MM-DD HH:MM[:SS[.fff]]` or with a `T` separator
//! - either of the above followed by `Z` or by a `±HH:MM` offset
//!
//! Values without a zone are read as UTC. Anything else comes back as
//! [`DueDate::Unparsed`] carrying the original text, so callers can still
//! display it.

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc,
};
use uuid::Uuid;

use crate::models::{Task, TaskStatus};

/// Clock time used when a due date is picked without a time.
pub const END_OF_DAY: &str = "23:59";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Result of reading a due-date string.
#[derive(Debug, Clone, PartialEq)]
pub enum DueDate {
    Instant(DateTime<FixedOffset>),
    Unparsed(String),
}

impl DueDate {
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            DueDate::Instant(at) => Some(at.with_timezone(&Utc)),
            DueDate::Unparsed(_) => None,
        }
    }

    pub fn is_instant(&self) -> bool {
        matches!(self, DueDate::Instant(_))
    }
}

/// Joins a picked date and optional clock time into the canonical wire form.
pub fn compose(date: &str, time: Option<&str>) -> String {
    let time = time
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(END_OF_DAY);
    format!("{} {}:00", date.trim(), time)
}

/// Like [`compose`], but an empty date means "no due date" and the time is ignored.
pub fn compose_optional(date: &str, time: Option<&str>) -> Option<String> {
    if date.trim().is_empty() {
        None
    } else {
        Some(compose(date, time))
    }
}

pub fn parse(raw: &str) -> DueDate {
    match parse_instant(raw.trim()) {
        Some(at) => DueDate::Instant(at),
        None => DueDate::Unparsed(raw.to_string()),
    }
}

pub fn parse_utc(raw: &str) -> Option<DateTime<Utc>> {
    parse(raw).instant()
}

fn parse_instant(s: &str) -> Option<DateTime<FixedOffset>> {
    if s.is_empty() {
        return None;
    }

    if let Some(naive) = s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        return parse_naive(naive).map(|at| at.and_utc().fixed_offset());
    }

    if let Some((naive, offset)) = split_offset(s) {
        let offset = parse_offset(offset)?;
        let naive = parse_naive(naive)?;
        return offset.from_local_datetime(&naive).single();
    }

    parse_naive(s).map(|at| at.and_utc().fixed_offset())
}

fn parse_naive(s: &str) -> Option<NaiveDateTime> {
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(s, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

// Splits a trailing `±HH:MM`. Only applies when a clock time is present, so
// the dashes of a bare date are never mistaken for an offset.
fn split_offset(s: &str) -> Option<(&str, &str)> {
    if s.len() <= 16 || !s.is_char_boundary(s.len() - 6) {
        return None;
    }
    let (head, tail) = s.split_at(s.len() - 6);
    let bytes = tail.as_bytes();
    let shaped = matches!(bytes[0], b'+' | b'-')
        && bytes[1].is_ascii_digit()
        && bytes[2].is_ascii_digit()
        && bytes[3] == b':'
        && bytes[4].is_ascii_digit()
        && bytes[5].is_ascii_digit();
    shaped.then_some((head, tail))
}

fn parse_offset(offset: &str) -> Option<FixedOffset> {
    let sign = if offset.starts_with('-') { -1 } else { 1 };
    let hours: i32 = offset.get(1..3)?.parse().ok()?;
    let minutes: i32 = offset.get(4..6)?.parse().ok()?;
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

/// Wire format for instants: microsecond precision, `Z` suffix.
pub fn format_wire(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DueKind {
    Overdue,
    Today,
    Soon,
    Normal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DueLabel {
    pub kind: DueKind,
    pub text: String,
}

/// Classifies a due instant relative to `now` by whole days, rounding up.
pub fn relative_label(due: DateTime<Utc>, now: DateTime<Utc>) -> DueLabel {
    let day_ms = Duration::days(1).num_milliseconds() as f64;
    let diff_days = ((due - now).num_milliseconds() as f64 / day_ms).ceil() as i64;

    match diff_days {
        d if d < 0 => {
            let n = d.abs();
            DueLabel {
                kind: DueKind::Overdue,
                text: format!("Overdue by {} day{}", n, if n != 1 { "s" } else { "" }),
            }
        }
        0 => DueLabel {
            kind: DueKind::Today,
            text: "Due today".to_string(),
        },
        1 => DueLabel {
            kind: DueKind::Soon,
            text: "Due tomorrow".to_string(),
        },
        d if d <= 3 => DueLabel {
            kind: DueKind::Soon,
            text: format!("Due in {} days", d),
        },
        d => DueLabel {
            kind: DueKind::Normal,
            text: format!("Due in {} days", d),
        },
    }
}

/// `"Aug 15, 2025 at 09:15 AM"` in `tz`, or the raw text when it cannot be read.
pub fn format_display<Tz>(raw: &str, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match parse(raw) {
        DueDate::Instant(at) => at
            .with_timezone(tz)
            .format("%b %-d, %Y at %I:%M %p")
            .to_string(),
        DueDate::Unparsed(original) => original,
    }
}

/// Splits a stored due date back into picker values `("YYYY-MM-DD", "HH:MM")`.
/// Unreadable or missing values give two empty strings.
pub fn split_for_edit<Tz>(raw: Option<&str>, tz: &Tz) -> (String, String)
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    match raw.map(parse) {
        Some(DueDate::Instant(at)) => {
            let local = at.with_timezone(tz);
            (
                local.format("%Y-%m-%d").to_string(),
                local.format("%H:%M").to_string(),
            )
        }
        _ => (String::new(), String::new()),
    }
}

/// Ids of tasks whose due instant has passed and that are neither completed
/// nor already marked overdue.
pub fn find_overdue(tasks: &[Task], now: DateTime<Utc>) -> Vec<Uuid> {
    tasks
        .iter()
        .filter(|task| task.status != TaskStatus::Completed)
        .filter(|task| task.status != TaskStatus::Overdue)
        .filter(|task| task.due_date.is_some_and(|due| due < now))
        .map(|task| task.id)
        .collect()
}

pub mod serde_instant {
    use chrono::{DateTime, Utc};
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::format_wire(at))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        super::parse_utc(&raw).ok_or_else(|| D::Error::custom(format!("invalid date-time: {raw}")))
    }
}

/// Optional due dates. A value that cannot be read becomes `None` so one bad
/// row does not fail a whole listing.
pub mod serde_instant_opt {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        at: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match at {
            Some(at) => serializer.serialize_str(&super::format_wire(at)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let Some(raw) = Option::<String>::deserialize(deserializer)? else {
            return Ok(None);
        };
        let at = super::parse_utc(&raw);
        if at.is_none() {
            tracing::warn!(%raw, "ignoring unreadable due date");
        }
        Ok(at)
    }
}
