//! Compression of finished canonical files
//!
//! Writes an LZ4 frame copy next to the text file:
//!
//! ```text
//! chan/January 2016/2016-01-02.txt  ──▶  chan/January 2016/2016-01-02.txt.lz4
//! ```
//!
//! Copies use the LZ4 frame format, so `lz4 -d` can read them too.

use lz4_flex::frame::{FrameDecoder, FrameEncoder};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Extension appended to compressed copies
pub const COMPRESSED_EXTENSION: &str = "lz4";

/// Errors from compressing or decompressing a file
#[derive(Error, Debug)]
pub enum CompressionError {
    /// I/O operation failed
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The LZ4 frame could not be written or read
    #[error("LZ4 frame error on {path:?}: {message}")]
    Frame { path: PathBuf, message: String },
}

pub type CompressionResult<T> = Result<T, CompressionError>;

/// Sizes before and after compression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionStats {
    pub original_bytes: u64,
    pub compressed_bytes: u64,
}

impl CompressionStats {
    pub fn ratio(&self) -> f64 {
        if self.compressed_bytes == 0 {
            return 0.0;
        }
        self.original_bytes as f64 / self.compressed_bytes as f64
    }
}

/// `<file>.lz4`
pub fn compressed_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(COMPRESSED_EXTENSION);
    PathBuf::from(name)
}

/// Whether `path` names a compressed copy
pub fn is_compressed(path: &Path) -> bool {
    path.extension().map_or(false, |ext| ext == COMPRESSED_EXTENSION)
}

fn io_error(path: &Path) -> impl Fn(std::io::Error) -> CompressionError + '_ {
    move |source| CompressionError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Compress `path` to `<path>.lz4`, replacing any earlier copy
///
/// With `remove_source` the text file is deleted once the copy is complete.
pub fn compress_file(path: &Path, remove_source: bool) -> CompressionResult<(PathBuf, CompressionStats)> {
    let target = compressed_path(path);

    let mut input = BufReader::new(File::open(path).map_err(io_error(path))?);
    let output = BufWriter::new(File::create(&target).map_err(io_error(&target))?);

    let mut encoder = FrameEncoder::new(output);
    let original_bytes = std::io::copy(&mut input, &mut encoder).map_err(io_error(path))?;
    let mut output = encoder.finish().map_err(|e| CompressionError::Frame {
        path: target.clone(),
        message: e.to_string(),
    })?;
    output.flush().map_err(io_error(&target))?;
    drop(output);

    let compressed_bytes = std::fs::metadata(&target).map_err(io_error(&target))?.len();

    if remove_source {
        std::fs::remove_file(path).map_err(io_error(path))?;
    }

    let stats = CompressionStats {
        original_bytes,
        compressed_bytes,
    };
    tracing::debug!(
        file = ?path,
        original = stats.original_bytes,
        compressed = stats.compressed_bytes,
        "compressed log file"
    );
    Ok((target, stats))
}

/// Read a whole compressed copy back into memory
pub fn decompress_file(path: &Path) -> CompressionResult<Vec<u8>> {
    let input = BufReader::new(File::open(path).map_err(io_error(path))?);
    let mut decoder = FrameDecoder::new(input);
    let mut data = Vec::new();
    decoder.read_to_end(&mut data).map_err(|e| CompressionError::Frame {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(data)
}

/// Read a canonical file, decompressing it if it carries the `.lz4` extension
pub fn read_log_file(path: &Path) -> CompressionResult<Vec<u8>> {
    if is_compressed(path) {
        decompress_file(path)
    } else {
        std::fs::read(path).map_err(io_error(path))
    }
}
