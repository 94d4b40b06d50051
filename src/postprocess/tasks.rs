//! Index rebuild and compression steps

use super::{FileTask, PostProcessError};
use crate::compression;
use crate::index::rebuild_index;
use crate::migrate::extract::LineExtractor;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

enum IndexRunner {
    InProcess(LineExtractor),
    /// `<program> nicks <file>`
    Subprocess(PathBuf),
}

/// Rebuilds the speaker index of a finished file
pub struct IndexTask {
    runner: IndexRunner,
}

impl IndexTask {
    /// Build the index on the blocking pool of this process
    pub fn in_process(extractor: LineExtractor) -> Self {
        Self {
            runner: IndexRunner::InProcess(extractor),
        }
    }

    /// Run `program nicks <file>` for every file
    pub fn subprocess(program: impl Into<PathBuf>) -> Self {
        Self {
            runner: IndexRunner::Subprocess(program.into()),
        }
    }
}

#[async_trait]
impl FileTask for IndexTask {
    fn name(&self) -> &str {
        "index"
    }

    async fn run(&self, path: &Path) -> Result<(), PostProcessError> {
        match &self.runner {
            IndexRunner::InProcess(extractor) => {
                let extractor = extractor.clone();
                let path = path.to_path_buf();
                tokio::task::spawn_blocking(move || rebuild_index(&path, &extractor)).await??;
                Ok(())
            }
            IndexRunner::Subprocess(program) => {
                let status = tokio::process::Command::new(program)
                    .arg("nicks")
                    .arg(path)
                    .status()
                    .await
                    .map_err(|source| PostProcessError::Spawn {
                        program: program.clone(),
                        source,
                    })?;
                if status.success() {
                    Ok(())
                } else {
                    Err(PostProcessError::Subprocess {
                        program: program.clone(),
                        status: status.to_string(),
                    })
                }
            }
        }
    }
}

/// Writes the LZ4 copy of a finished file
pub struct CompressTask {
    remove_source: bool,
}

impl CompressTask {
    pub fn new(remove_source: bool) -> Self {
        Self { remove_source }
    }
}

#[async_trait]
impl FileTask for CompressTask {
    fn name(&self) -> &str {
        "compress"
    }

    async fn run(&self, path: &Path) -> Result<(), PostProcessError> {
        let path = path.to_path_buf();
        let remove_source = self.remove_source;
        tokio::task::spawn_blocking(move || compression::compress_file(&path, remove_source)).await??;
        Ok(())
    }
}
