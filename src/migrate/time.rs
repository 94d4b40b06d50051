//! Time Normalizer
//!
//! Turns legacy timestamp text into an absolute UTC instant.
//!
//! Candidate formats are tried in table order and the first one whose
//! layout matches the token is selected, so dated layouts win over bare
//! times. A selected format flagged `requires_context` carries no year: the
//! caller's calendar date supplies it. Month and day come from the token
//! when it has them, so a record written just after midnight keeps its day.
//!
//! A leading weekday name is checked for spelling only.
//!
//! Zone abbreviations (`UTC`, `EST`, ...) are split off the end of the
//! token for `zoned` formats and folded into the instant. Unknown
//! all-caps abbreviations are read as offset zero.

use crate::migrate::error::{TimeParseError, TimeParseReason};
use crate::migrate::types::CANONICAL_DATE_FORMAT;
use chrono::format::{parse, Parsed, StrftimeItems};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};

/// One candidate timestamp layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeFormat {
    /// strftime layout of the token, without any zone suffix
    pub pattern: &'static str,
    /// The token ends with a zone abbreviation
    pub zoned: bool,
    /// The layout has no usable date and needs a calendar date from context
    pub requires_context: bool,
}

impl TimeFormat {
    const fn dated(pattern: &'static str, zoned: bool) -> Self {
        Self {
            pattern,
            zoned,
            requires_context: false,
        }
    }

    const fn ambiguous(pattern: &'static str, zoned: bool) -> Self {
        Self {
            pattern,
            zoned,
            requires_context: true,
        }
    }
}

/// Default precedence: full dates first, bare times last
pub const TIME_FORMATS: &[TimeFormat] = &[
    TimeFormat::dated("%Y-%m-%d %H:%M:%S", true),
    TimeFormat::dated("%b %d %Y %H:%M:%S", true),
    TimeFormat::dated("%b %d %Y %H:%M:%S", false),
    TimeFormat::dated("%m/%d/%Y %I:%M:%S %p", false),
    TimeFormat::dated("%m/%d/%Y %H:%M:%S", false),
    TimeFormat::dated("%m/%d/%Y %H:%M:%S", true),
    TimeFormat::dated("%Y/%m/%d %H:%M:%S", true),
    TimeFormat::dated("%a %b %d %Y %H:%M:%S", true),
    TimeFormat::ambiguous("%b %d %H:%M:%S", true),
    TimeFormat::ambiguous("%I:%M:%S %p", false),
    TimeFormat::ambiguous("%H:%M:%S", false),
];

/// Date-only layouts found in legacy file names: month-first, then ISO
pub const DATE_FORMATS: &[&str] = &["%m-%d-%Y", "%Y-%m-%d"];

/// Offset in seconds east of UTC for a zone abbreviation
fn zone_offset_secs(abbr: &str) -> Option<i64> {
    let hours = match abbr {
        "UTC" | "GMT" | "Z" | "UT" => 0,
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        "CET" | "BST" => 1,
        "CEST" => 2,
        other => {
            if (3..=5).contains(&other.len()) && other.bytes().all(|b| b.is_ascii_uppercase()) {
                tracing::debug!(zone = other, "unknown zone abbreviation, using UTC");
                0
            } else {
                return None;
            }
        }
    };
    Some(hours * 3600)
}

/// Split `body ZONE` into the body and the zone's offset
fn split_zone(token: &str) -> Option<(&str, i64)> {
    let (body, zone) = token.rsplit_once(' ')?;
    let offset = zone_offset_secs(zone)?;
    Some((body.trim_end(), offset))
}

fn to_utc(naive: NaiveDateTime, offset_secs: i64) -> DateTime<Utc> {
    (naive - Duration::seconds(offset_secs)).and_utc()
}

/// Converts timestamp tokens into instants using an ordered format table
#[derive(Debug, Clone)]
pub struct TimeNormalizer {
    formats: Vec<TimeFormat>,
}

impl Default for TimeNormalizer {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeNormalizer {
    /// Normalizer over the default format table
    pub fn new() -> Self {
        Self::with_formats(TIME_FORMATS.to_vec())
    }

    /// Normalizer over a custom table, tried in the given order
    pub fn with_formats(formats: Vec<TimeFormat>) -> Self {
        Self { formats }
    }

    pub fn formats(&self) -> &[TimeFormat] {
        &self.formats
    }

    /// Parse `token`, resolving date-less layouts against `context`
    pub fn normalize(
        &self,
        token: &str,
        context: Option<NaiveDate>,
    ) -> Result<DateTime<Utc>, TimeParseError> {
        let token = token.trim();

        for format in &self.formats {
            let (body, offset) = if format.zoned {
                match split_zone(token) {
                    Some(split) => split,
                    None => continue,
                }
            } else {
                (token, 0)
            };

            let Some((body, pattern)) = strip_weekday(body, format.pattern) else {
                continue;
            };

            let mut parsed = Parsed::new();
            if parse(&mut parsed, body, StrftimeItems::new(pattern)).is_err() {
                continue;
            }

            if !format.requires_context {
                // A layout match with inconsistent fields (day 31 in a 30
                // day month) falls through to later formats.
                match parsed.to_naive_datetime_with_offset(0) {
                    Ok(naive) => return Ok(to_utc(naive, offset)),
                    Err(_) => continue,
                }
            }

            let Some(date) = context else {
                return Err(TimeParseError::new(token, TimeParseReason::MissingContext));
            };
            return resolve_with_context(token, body, pattern, date)
                .map(|naive| to_utc(naive, offset));
        }

        Err(TimeParseError::new(token, TimeParseReason::NoMatchingFormat))
    }
}

/// Check and drop a leading weekday name
///
/// The weekday must be a valid name but is not checked against the date.
fn strip_weekday<'a>(body: &'a str, pattern: &'static str) -> Option<(&'a str, &'static str)> {
    let Some(rest_pattern) = pattern.strip_prefix("%a ") else {
        return Some((body, pattern));
    };
    let (weekday, rest) = body.split_once(' ')?;
    parse(&mut Parsed::new(), weekday, StrftimeItems::new("%a")).ok()?;
    Some((rest.trim_start(), rest_pattern))
}

/// Place a date-less token on the calendar
///
/// A layout carrying its own month and day keeps them and only takes the
/// year from `context`; a bare time takes the whole context date.
fn resolve_with_context(
    token: &str,
    body: &str,
    pattern: &str,
    context: NaiveDate,
) -> Result<NaiveDateTime, TimeParseError> {
    let carries_day = ["%b", "%m", "%d"].iter().any(|field| pattern.contains(field));
    let (combined, full_pattern) = if carries_day {
        (format!("{} {}", context.year(), body), format!("%Y {pattern}"))
    } else {
        (
            format!("{} {}", context.format(CANONICAL_DATE_FORMAT), body),
            format!("{CANONICAL_DATE_FORMAT} {pattern}"),
        )
    };

    let naive = NaiveDateTime::parse_from_str(&combined, &full_pattern)
        .map_err(|_| TimeParseError::new(token, TimeParseReason::ContextMismatch))?;
    if naive.date() != context {
        tracing::warn!(
            token,
            context = %context,
            "timestamp date differs from the file date, keeping the token's date"
        );
    }
    Ok(naive)
}

/// Parse a date embedded in a file name, trying `DATE_FORMATS` in order
pub fn parse_calendar_date(token: &str) -> Result<NaiveDate, TimeParseError> {
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(token, format).ok())
        .ok_or_else(|| TimeParseError::new(token, TimeParseReason::NoMatchingFormat))
}

/// Canonical `YYYY-MM-DD` form of a file-name date
pub fn normalize_date(token: &str) -> Result<String, TimeParseError> {
    parse_calendar_date(token).map(|date| date.format(CANONICAL_DATE_FORMAT).to_string())
}
