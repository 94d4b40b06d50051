//! Post-processing of finished day files
//!
//! After the walker closes a destination file it hands the path to a
//! [`PostProcessTrigger`]. The production trigger is [`PostProcessQueue`],
//! which runs each path through an ordered list of [`FileTask`]s on a
//! background tokio task:
//!
//! ```text
//! walker ──schedule(path)──▶ mpsc ──▶ worker: settle → index → settle → compress
//! ```
//!
//! Failures are logged and counted in the [`PostProcessReport`]; they are
//! never retried and never reach the walker.

mod queue;
mod tasks;

pub use queue::{PostProcessQueue, PostProcessReport, TaskCounts};
pub use tasks::{CompressTask, IndexTask};

use crate::compression::CompressionError;
use crate::index::IndexError;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

/// Receives each finished destination file
///
/// `schedule` must return without waiting for the work it requests.
pub trait PostProcessTrigger: Send + Sync {
    fn schedule(&self, path: &Path);
}

/// Trigger that ignores every file
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTrigger;

impl PostProcessTrigger for NoopTrigger {
    fn schedule(&self, path: &Path) {
        tracing::trace!(file = ?path, "post-processing disabled");
    }
}

/// One step applied to a finished file
#[async_trait]
pub trait FileTask: Send + Sync {
    /// Short name used in logs and reports
    fn name(&self) -> &str;

    async fn run(&self, path: &Path) -> Result<(), PostProcessError>;
}

/// Errors from a post-processing step
#[derive(Debug, thiserror::Error)]
pub enum PostProcessError {
    #[error("index rebuild failed: {0}")]
    Index(#[from] IndexError),

    #[error("compression failed: {0}")]
    Compression(#[from] CompressionError),

    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{program:?} exited with {status}")]
    Subprocess { program: PathBuf, status: String },

    #[error("background task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for PostProcessError {
    fn from(err: tokio::task::JoinError) -> Self {
        PostProcessError::Join(err.to_string())
    }
}
