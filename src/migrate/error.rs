//! Migration pipeline error types
//!
//! Failures are isolated to the smallest enclosing unit (record, file,
//! month, channel). `ExtractError::EndOfInput` is not a failure at all; it
//! is how the extractor and injectors signal normal completion.

use std::path::PathBuf;
use thiserror::Error;

/// Outcomes of pulling one line out of a byte cursor
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractError {
    /// The buffer is exhausted
    #[error("end of input")]
    EndOfInput,

    /// No line-shaped region could be matched in the remaining buffer
    #[error("line not found in input at offset {offset}")]
    LineNotFound { offset: usize },

    /// Garbage precedes the next line and no line boundary follows it
    #[error("garbage data in input at offset {offset} with no line boundary")]
    UnrecoverableGarbage { offset: usize },
}

/// Why a timestamp token could not be turned into an instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeParseReason {
    /// No candidate format matched the token
    NoMatchingFormat,
    /// The matching format needs a calendar date and none was supplied
    MissingContext,
    /// The token combined with the calendar date did not parse
    ContextMismatch,
}

impl std::fmt::Display for TimeParseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeParseReason::NoMatchingFormat => write!(f, "no known format matched"),
            TimeParseReason::MissingContext => write!(f, "ambiguous format without date context"),
            TimeParseReason::ContextMismatch => {
                write!(f, "ambiguous format invalid in the context year")
            }
        }
    }
}

/// A timestamp token that matched no known format
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot parse time {token:?}{}: {reason}", describe_location(.location))]
pub struct TimeParseError {
    /// The original token text
    pub token: String,
    /// Source location (file and byte offset) when known
    pub location: Option<String>,
    pub reason: TimeParseReason,
}

fn describe_location(location: &Option<String>) -> String {
    location
        .as_ref()
        .map(|l| format!(" at {l}"))
        .unwrap_or_default()
}

impl TimeParseError {
    pub fn new(token: impl Into<String>, reason: TimeParseReason) -> Self {
        Self {
            token: token.into(),
            location: None,
            reason,
        }
    }

    /// Attach the source location for diagnostics
    pub fn at(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

/// Errors raised while opening or advancing an event injector
#[derive(Error, Debug)]
pub enum InjectorError {
    #[error("failed to read sidecar {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed sidecar record: {0}")]
    Extract(#[from] ExtractError),

    #[error("unparseable sidecar timestamp: {0}")]
    TimeParse(#[from] TimeParseError),
}

/// Errors from the migration pipeline
#[derive(Error, Debug)]
pub enum MigrateError {
    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Writing the destination file failed; aborts the current file only
    #[error("write failed for {path:?}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Listing a channel or month directory failed; aborts that subtree only
    #[error("cannot enumerate {path:?}: {source}")]
    DirectoryEnumeration {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    TimeParse(#[from] TimeParseError),

    #[error(transparent)]
    Injector(#[from] InjectorError),

    /// The migration manifest could not be written
    #[error("manifest error: {0}")]
    Manifest(String),
}

impl From<serde_json::Error> for MigrateError {
    fn from(err: serde_json::Error) -> Self {
        MigrateError::Manifest(err.to_string())
    }
}

/// Result type alias for migration operations
pub type MigrateResult<T> = Result<T, MigrateError>;
