//! # Chatvault
//!
//! Chat history archive tooling. Normalizes legacy chat log dumps, with their
//! assorted timestamp layouts, into one canonical per-day log format and
//! merges ban/subscriber sidecar events into each day in time order.
//!
//! ## Features
//!
//! - **Tolerant extraction**: skips garbage between records, keeps partial output
//! - **Time normalization**: dated and date-less layouts, zone abbreviations
//! - **Chronological merge**: sidecar events interleaved by instant
//! - **Manifest**: one JSON line per day file with status and CRC32
//! - **Post-processing**: speaker index rebuild and LZ4 compression in the background
//!
//! ## Modules
//!
//! - [`migrate`]: extraction, normalization, injection, merge and the archive walk
//! - [`postprocess`]: background queue for finished files
//! - [`index`]: per-file speaker index
//! - [`compression`]: LZ4 frame copies of finished files
//! - [`config`]: TOML + environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chatvault::config::MigrateConfig;
//! use chatvault::migrate::ArchiveWalker;
//! use chatvault::postprocess::NoopTrigger;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let walker = ArchiveWalker::new("legacy-logs", "logs", MigrateConfig::default());
//!     let summary = walker.run(&NoopTrigger)?;
//!
//!     println!("{}", summary);
//!     Ok(())
//! }
//! ```

pub mod compression;
pub mod config;
pub mod index;
pub mod migrate;
pub mod postprocess;

// Re-export top-level types for convenience
pub use migrate::{
    ArchiveWalker, CanonicalEvent, DayFileStatus, DayFileTask, EventInjector, ExtractError,
    LineExtractor, MergeReport, MergeWriter, MigrateError, MigrateResult, RunSummary,
    TimeNormalizer, TimeParseError,
};

pub use postprocess::{
    CompressTask, FileTask, IndexTask, NoopTrigger, PostProcessError, PostProcessQueue,
    PostProcessReport, PostProcessTrigger,
};

pub use index::{IndexError, SpeakerIndex};

pub use compression::{compress_file, decompress_file, CompressionError};

pub use config::{Config, ConfigError, IndexMode, LoggingConfig, MigrateConfig, PostProcessConfig};
