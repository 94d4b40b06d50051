//! Legacy log migration
//!
//! Converts a legacy chat log archive into the canonical per-day format:
//!
//! ```text
//! ┌───────────────┐   ┌─────────────────┐   ┌────────────┐
//! │ ArchiveWalker │──▶│ MergeWriter     │──▶│ <date>.txt │──▶ post-processing
//! └───────────────┘   │  LineExtractor  │   └────────────┘
//!                     │  TimeNormalizer │
//!                     │  EventInjector  │◀── bans.txt / subs.txt
//!                     └─────────────────┘
//! ```
//!
//! Every output line has the form `[YYYY-MM-DD HH:MM:SS UTC] speaker: message`.

pub mod cursor;
pub mod error;
pub mod extract;
pub mod injector;
pub mod manifest;
pub mod merge;
pub mod time;
pub mod types;
pub mod walker;

pub use cursor::ByteCursor;
pub use error::{ExtractError, InjectorError, MigrateError, MigrateResult, TimeParseError, TimeParseReason};
pub use extract::{LineExtractor, MetaExtractor, DEFAULT_SENTINEL_SPEAKER};
pub use injector::EventInjector;
pub use manifest::{Manifest, ManifestEntry};
pub use merge::{DayFileStatus, MergeReport, MergeStats, MergeWriter, DEFAULT_NOTIFICATION_LABEL};
pub use time::{normalize_date, parse_calendar_date, TimeFormat, TimeNormalizer, TIME_FORMATS};
pub use types::{CanonicalEvent, DayFileTask, MetaRecord, RawRecord};
pub use walker::{day_file_tasks, ArchiveWalker, RunSummary};
