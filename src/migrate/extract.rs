//! Line Extractor
//!
//! Pulls one structured record out of a raw byte buffer with a tolerant
//! pattern. Legacy dumps mix several layouts, for example:
//!
//! ```text
//! Jan 2 2016 10:00:00 UTC user1: hi
//! [01/02/2016 3:04:05 PM] <user2>: hello
//! [2016-01-02 10:00:00 UTC] user3: canonical already
//! ```
//!
//! When a match exists but does not start at the cursor, the bytes up to
//! the next line boundary are treated as garbage and skipped. Sidecar
//! event files use the bracketed `[timestamp] text` variant.

use crate::migrate::cursor::ByteCursor;
use crate::migrate::error::ExtractError;
use crate::migrate::types::{MetaRecord, RawRecord};
use regex::bytes::Regex;
use std::sync::OnceLock;

/// Placeholder speaker used by legacy dumps for platform notifications
pub const DEFAULT_SENTINEL_SPEAKER: &str = "##################################";

const PREVIEW_BYTES: usize = 200;

fn primary_pattern(sentinel: &str) -> String {
    format!(
        concat!(
            r"\s*\[?",
            r"([a-zA-Z0-9/ -]*?[0-9]+:[0-9]+:[0-9]+[a-zA-Z0-9/ -]*?)",
            r"\]? ?[^a-zA-Z0-9_\r\n]?",
            r"([a-zA-Z0-9_]+|{})",
            r"[^a-zA-Z0-9_\r\n]?: ([^\r\n]*)(?:\r\n|\r|\n|$)"
        ),
        regex::escape(sentinel)
    )
}

fn meta_regex() -> &'static Regex {
    static META: OnceLock<Regex> = OnceLock::new();
    META.get_or_init(|| {
        Regex::new(r"\s*\[([^\r\n]+?)\] ?([^\r\n]*)(?:\r\n|\r|\n|$)")
            .expect("meta line pattern is valid")
    })
}

/// Extracts `timestamp speaker: message` records from primary day logs
#[derive(Debug, Clone)]
pub struct LineExtractor {
    regex: Regex,
}

impl LineExtractor {
    /// Build an extractor that also accepts `sentinel` as a speaker token
    pub fn new(sentinel: &str) -> Self {
        let regex = Regex::new(&primary_pattern(sentinel))
            .expect("primary line pattern is valid for any escaped sentinel");
        Self { regex }
    }

    /// Pull the next record and advance the cursor past it
    pub fn next_record(&self, cursor: &mut ByteCursor) -> Result<RawRecord, ExtractError> {
        let mut fields = read_fields(&self.regex, cursor)?.into_iter();
        Ok(RawRecord {
            timestamp_text: fields.next().unwrap_or_default(),
            speaker: fields.next().unwrap_or_default(),
            message: fields.next().unwrap_or_default(),
        })
    }
}

impl Default for LineExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_SENTINEL_SPEAKER)
    }
}

/// Extracts `[timestamp] text` records from sidecar event files
#[derive(Debug, Clone, Copy, Default)]
pub struct MetaExtractor;

impl MetaExtractor {
    pub fn next_record(&self, cursor: &mut ByteCursor) -> Result<MetaRecord, ExtractError> {
        let mut fields = read_fields(meta_regex(), cursor)?.into_iter();
        Ok(MetaRecord {
            timestamp_text: fields.next().unwrap_or_default(),
            text: fields.next().unwrap_or_default(),
        })
    }
}

/// Match `regex` at the cursor, skipping garbage lines until it does
///
/// A buffer holding only whitespace counts as exhausted.
fn read_fields(regex: &Regex, cursor: &mut ByteCursor) -> Result<Vec<String>, ExtractError> {
    loop {
        if cursor.remaining().iter().all(u8::is_ascii_whitespace) {
            cursor.advance(cursor.remaining().len());
            return Err(ExtractError::EndOfInput);
        }

        let offset = cursor.offset();
        let parsed = match regex.captures(cursor.remaining()) {
            None => None,
            Some(caps) => {
                let start = caps.get(0).map_or(0, |m| m.start());
                if start == 0 {
                    let end = caps.get(0).map_or(0, |m| m.end());
                    let fields = (1..caps.len())
                        .map(|i| {
                            caps.get(i)
                                .map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
                                .unwrap_or_default()
                        })
                        .collect::<Vec<_>>();
                    Some(Ok((end, fields)))
                } else {
                    Some(Err(start))
                }
            }
        };

        match parsed {
            None => {
                tracing::warn!(
                    offset,
                    remaining = cursor.remaining().len(),
                    preview = %cursor.preview(PREVIEW_BYTES),
                    "line not found in input"
                );
                return Err(ExtractError::LineNotFound { offset });
            }
            Some(Ok((end, fields))) => {
                cursor.advance(end);
                return Ok(fields);
            }
            Some(Err(match_start)) => {
                tracing::warn!(
                    offset,
                    match_start,
                    preview = %cursor.preview(PREVIEW_BYTES.min(match_start)),
                    "skipping garbage preceding line"
                );
                if !cursor.skip_line() {
                    return Err(ExtractError::UnrecoverableGarbage { offset });
                }
            }
        }
    }
}
