//! Speaker Index - speaker → line offsets for one canonical day file
//!
//! Maps lower-cased speaker names to the byte offsets of their lines so a
//! viewer can jump straight to everything one user said.
//!
//! # Example
//! ```ignore
//! let index = SpeakerIndex::load(&index_path("chan/January 2016/2016-01-02.txt"))?;
//! let offsets = index.lookup("User1");
//! // offsets = [0, 128, 512]
//! ```
//!
//! # Design Notes
//! - Built by re-reading the finished file with the migration's line extractor
//! - Compressed `.lz4` copies are indexed through the decompressor
//! - JSON persistence next to the text file (`<file>.nicks.json`)

use crate::compression::{self, CompressionError};
use crate::migrate::cursor::ByteCursor;
use crate::migrate::error::ExtractError;
use crate::migrate::extract::LineExtractor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Suffix of persisted index files
pub const INDEX_SUFFIX: &str = ".nicks.json";

const INDEX_VERSION: u32 = 1;

/// Errors from building, saving or loading a speaker index
#[derive(Error, Debug)]
pub enum IndexError {
    /// I/O operation failed
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The canonical file could not be read back
    #[error(transparent)]
    Read(#[from] CompressionError),

    /// The canonical file holds a line the extractor rejects
    #[error("malformed line in {path:?}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: ExtractError,
    },

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("unsupported index version {0}")]
    UnsupportedVersion(u32),
}

impl From<serde_json::Error> for IndexError {
    fn from(err: serde_json::Error) -> Self {
        IndexError::Serialization(err.to_string())
    }
}

pub type IndexResult<T> = Result<T, IndexError>;

/// Where the index for `log_path` is stored
///
/// A compressed copy shares the index of its text file, so
/// `2016-01-02.txt.lz4` maps to `2016-01-02.txt.nicks.json`.
pub fn index_path(log_path: &Path) -> PathBuf {
    let base = if compression::is_compressed(log_path) {
        log_path.with_extension("")
    } else {
        log_path.to_path_buf()
    };
    let mut name = base.into_os_string();
    name.push(INDEX_SUFFIX);
    PathBuf::from(name)
}

/// Serialization format for JSON persistence
#[derive(Serialize, Deserialize)]
struct SpeakerIndexData {
    version: u32,
    source: PathBuf,
    lines: u64,
    speakers: BTreeMap<String, Vec<u64>>,
}

/// Speaker lookup table for one canonical file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeakerIndex {
    source: PathBuf,
    lines: u64,
    /// lower-cased speaker → line byte offsets, ascending
    speakers: BTreeMap<String, Vec<u64>>,
}

impl SpeakerIndex {
    /// Build the index for `log_path`, plain or `.lz4`
    pub fn build(log_path: &Path, extractor: &LineExtractor) -> IndexResult<Self> {
        let data = compression::read_log_file(log_path)?;
        let mut cursor = ByteCursor::new(data);
        let mut speakers: BTreeMap<String, Vec<u64>> = BTreeMap::new();
        let mut lines = 0;

        loop {
            let offset = cursor.offset() as u64;
            let record = match extractor.next_record(&mut cursor) {
                Ok(record) => record,
                Err(ExtractError::EndOfInput) => break,
                Err(source) => {
                    return Err(IndexError::Malformed {
                        path: log_path.to_path_buf(),
                        source,
                    })
                }
            };
            speakers
                .entry(record.speaker.to_lowercase())
                .or_default()
                .push(offset);
            lines += 1;
        }

        Ok(Self {
            source: log_path.to_path_buf(),
            lines,
            speakers,
        })
    }

    /// Load a persisted index file
    pub fn load(path: &Path) -> IndexResult<Self> {
        let file = File::open(path).map_err(|source| IndexError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let data: SpeakerIndexData = serde_json::from_reader(BufReader::new(file))?;
        if data.version != INDEX_VERSION {
            return Err(IndexError::UnsupportedVersion(data.version));
        }
        Ok(Self {
            source: data.source,
            lines: data.lines,
            speakers: data.speakers,
        })
    }

    /// Persist next to the source file, returning the index path
    pub fn save(&self) -> IndexResult<PathBuf> {
        let path = index_path(&self.source);
        let io_error = |source| IndexError::Io {
            path: path.clone(),
            source,
        };

        let data = SpeakerIndexData {
            version: INDEX_VERSION,
            source: self.source.clone(),
            lines: self.lines,
            speakers: self.speakers.clone(),
        };

        let mut writer = BufWriter::new(File::create(&path).map_err(io_error)?);
        serde_json::to_writer(&mut writer, &data)?;
        writer.flush().map_err(io_error)?;
        Ok(path)
    }

    /// Line offsets for `speaker`, matched case-insensitively
    pub fn lookup(&self, speaker: &str) -> &[u64] {
        self.speakers
            .get(&speaker.to_lowercase())
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Indexed speakers, sorted
    pub fn speakers(&self) -> impl Iterator<Item = &str> {
        self.speakers.keys().map(String::as_str)
    }

    pub fn speaker_count(&self) -> usize {
        self.speakers.len()
    }

    pub fn line_count(&self) -> u64 {
        self.lines
    }

    pub fn source(&self) -> &Path {
        &self.source
    }
}

/// Build and persist the index for one file
pub fn rebuild_index(log_path: &Path, extractor: &LineExtractor) -> IndexResult<SpeakerIndex> {
    let index = SpeakerIndex::build(log_path, extractor)?;
    let saved = index.save()?;
    tracing::debug!(
        file = ?log_path,
        index = ?saved,
        speakers = index.speaker_count(),
        lines = index.line_count(),
        "rebuilt speaker index"
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const DAY: &str = "\
[2016-01-02 10:00:00 UTC] User1: hi\n\
[2016-01-02 10:02:00 UTC] Ban: baduser\n\
[2016-01-02 10:05:00 UTC] user1: anyone here?\n";

    #[test]
    fn test_index_path() {
        assert_eq!(
            index_path(Path::new("out/2016-01-02.txt")),
            PathBuf::from("out/2016-01-02.txt.nicks.json")
        );
        assert_eq!(
            index_path(Path::new("out/2016-01-02.txt.lz4")),
            PathBuf::from("out/2016-01-02.txt.nicks.json")
        );
    }

    #[test]
    fn test_build_groups_speakers_case_insensitively() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("2016-01-02.txt");
        std::fs::write(&path, DAY).unwrap();

        let index = SpeakerIndex::build(&path, &LineExtractor::default()).unwrap();

        assert_eq!(index.line_count(), 3);
        assert_eq!(index.speakers().collect::<Vec<_>>(), vec!["ban", "user1"]);
        let second_user1_line = DAY.rfind("[2016-01-02 10:05").unwrap() as u64;
        assert_eq!(index.lookup("USER1"), &[0, second_user1_line]);
        assert!(index.lookup("nobody").is_empty());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("2016-01-02.txt");
        std::fs::write(&path, DAY).unwrap();

        let index = rebuild_index(&path, &LineExtractor::default()).unwrap();
        let loaded = SpeakerIndex::load(&index_path(&path)).unwrap();

        assert_eq!(loaded, index);
    }

    #[test]
    fn test_build_from_compressed_copy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("2016-01-02.txt");
        std::fs::write(&path, DAY).unwrap();
        let (compressed, _) = compression::compress_file(&path, true).unwrap();

        let index = rebuild_index(&compressed, &LineExtractor::default()).unwrap();

        assert_eq!(index.lookup("ban").len(), 1);
        assert!(dir.path().join("2016-01-02.txt.nicks.json").exists());
    }

    #[test]
    fn test_missing_file() {
        let dir = tempdir().unwrap();
        let err = SpeakerIndex::build(&dir.path().join("missing.txt"), &LineExtractor::default())
            .unwrap_err();
        assert!(matches!(err, IndexError::Read(_)));
    }
}
