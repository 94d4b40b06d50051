//! Core data types for the migration pipeline
//!
//! - `RawRecord`: one line pulled out of a legacy log, still as text
//! - `CanonicalEvent`: a record placed on the time line, ready for output
//! - `DayFileTask`: one legacy day file and where its canonical copy goes

use chrono::{DateTime, NaiveDate, Utc};
use std::path::PathBuf;

/// Timestamp layout used inside canonical lines
pub const CANONICAL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Date layout used for context dates and destination file names
pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

/// One structured line extracted from a raw buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRecord {
    pub timestamp_text: String,
    pub speaker: String,
    pub message: String,
}

/// One bracketed sidecar record (`[timestamp] text`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaRecord {
    pub timestamp_text: String,
    pub text: String,
}

/// A record with an absolute instant, the unit written to output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalEvent {
    pub instant: DateTime<Utc>,
    pub speaker: String,
    pub message: String,
}

impl CanonicalEvent {
    pub fn new(instant: DateTime<Utc>, speaker: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            instant,
            speaker: speaker.into(),
            message: message.into(),
        }
    }

    /// Render as `[YYYY-MM-DD HH:MM:SS UTC] speaker: message\n`
    pub fn to_line(&self) -> String {
        format_line(&self.instant, &self.speaker, &self.message)
    }
}

/// Format one canonical output line
pub fn format_line(instant: &DateTime<Utc>, speaker: &str, message: &str) -> String {
    format!(
        "[{}] {}: {}\n",
        instant.format(CANONICAL_TIME_FORMAT),
        speaker,
        message
    )
}

/// One legacy day file scheduled for migration
///
/// The calendar date is parsed once when the task is built so sorting a
/// month's tasks never does fallible work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayFileTask {
    pub source_path: PathBuf,
    pub destination_path: PathBuf,
    pub calendar_date: NaiveDate,
}

impl DayFileTask {
    /// Canonical `YYYY-MM-DD` form of the task's date
    pub fn date_string(&self) -> String {
        self.calendar_date.format(CANONICAL_DATE_FORMAT).to_string()
    }
}
