//! Event Injector
//!
//! A forward-only cursor over one auxiliary event source (ban or
//! subscriber notices) that yields `(instant, canonical line)` pairs in
//! file order. Sidecar files are expected to be sorted ascending already.
//!
//! Sidecar timestamps are normalized without a date context, so records
//! using a date-less layout cannot be placed; hitting one retires the
//! injector.

use crate::migrate::cursor::ByteCursor;
use crate::migrate::error::{ExtractError, InjectorError};
use crate::migrate::extract::MetaExtractor;
use crate::migrate::time::TimeNormalizer;
use crate::migrate::types::CanonicalEvent;
use chrono::{DateTime, Utc};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Forward-only cursor over one sidecar event file
#[derive(Debug)]
pub struct EventInjector {
    speaker: String,
    path: PathBuf,
    cursor: ByteCursor,
    normalizer: TimeNormalizer,
    current: Option<CanonicalEvent>,
    current_line: String,
}

impl EventInjector {
    /// Open a sidecar file and load its first event
    ///
    /// Returns `Ok(None)` when the file does not exist or holds no records.
    pub fn open(
        speaker: impl Into<String>,
        path: impl AsRef<Path>,
        normalizer: TimeNormalizer,
    ) -> Result<Option<Self>, InjectorError> {
        let path = path.as_ref().to_path_buf();
        let data = match std::fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(InjectorError::Io { path, source }),
        };

        let mut injector = Self::from_bytes(speaker, data, normalizer);
        injector.path = path;
        match injector.advance() {
            Ok(()) => Ok(Some(injector)),
            Err(InjectorError::Extract(ExtractError::EndOfInput)) => {
                tracing::debug!(path = ?injector.path, "sidecar holds no events");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Build an injector over in-memory bytes without advancing it
    pub fn from_bytes(speaker: impl Into<String>, data: Vec<u8>, normalizer: TimeNormalizer) -> Self {
        Self {
            speaker: speaker.into(),
            path: PathBuf::new(),
            cursor: ByteCursor::new(data),
            normalizer,
            current: None,
            current_line: String::new(),
        }
    }

    pub fn speaker(&self) -> &str {
        &self.speaker
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Instant of the cached event, if any
    pub fn current_instant(&self) -> Option<DateTime<Utc>> {
        self.current.as_ref().map(|event| event.instant)
    }

    /// The cached event rendered as a canonical line
    pub fn current_line(&self) -> &str {
        &self.current_line
    }

    pub fn current_event(&self) -> Option<&CanonicalEvent> {
        self.current.as_ref()
    }

    /// Load the next event into the cache
    ///
    /// On any error the cache is cleared; the caller retires the injector.
    pub fn advance(&mut self) -> Result<(), InjectorError> {
        self.current = None;
        self.current_line.clear();

        let record = MetaExtractor.next_record(&mut self.cursor)?;
        let instant = self
            .normalizer
            .normalize(&record.timestamp_text, None)
            .map_err(|e| e.at(format!("{}:{}", self.path.display(), self.cursor.offset())))?;

        let event = CanonicalEvent::new(instant, self.speaker.clone(), record.text);
        self.current_line = event.to_line();
        self.current = Some(event);
        Ok(())
    }

    /// Count events not yet emitted, the cached one included
    ///
    /// Consumes the injector; used to report what a month left unmerged.
    pub fn drain_count(mut self) -> usize {
        let mut count = usize::from(self.current.is_some());
        while self.advance().is_ok() {
            count += 1;
        }
        count
    }
}
