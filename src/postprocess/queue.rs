//! Background post-processing queue

use super::{FileTask, PostProcessTrigger};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio::task::JoinHandle;

/// Outcomes of one task kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskCounts {
    pub succeeded: u64,
    pub failed: u64,
}

/// What the worker did before the queue closed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PostProcessReport {
    pub files: u64,
    /// task name → outcomes
    pub tasks: BTreeMap<String, TaskCounts>,
}

impl PostProcessReport {
    pub fn counts(&self, task: &str) -> TaskCounts {
        self.tasks.get(task).copied().unwrap_or_default()
    }

    pub fn failures(&self) -> u64 {
        self.tasks.values().map(|c| c.failed).sum()
    }
}

impl fmt::Display for PostProcessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Post-processed {} files", self.files)?;
        for (name, counts) in &self.tasks {
            write!(f, "\n  {:<9} {} ok, {} failed", format!("{name}:"), counts.succeeded, counts.failed)?;
        }
        Ok(())
    }
}

/// Cloneable handle feeding the post-processing worker
///
/// The worker stops once every handle is dropped and the queue is drained.
#[derive(Clone)]
pub struct PostProcessQueue {
    sender: mpsc::UnboundedSender<(PathBuf, Instant)>,
    pending: Arc<AtomicUsize>,
}

impl PostProcessQueue {
    /// Spawn the worker on the current tokio runtime
    ///
    /// Task `i` of a file starts no earlier than `(i + 1) * settle_delay`
    /// after the file was scheduled, so files queued together settle together.
    pub fn start(
        tasks: Vec<Box<dyn FileTask>>,
        settle_delay: Duration,
    ) -> (Self, JoinHandle<PostProcessReport>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<(PathBuf, Instant)>();
        let pending = Arc::new(AtomicUsize::new(0));
        let worker_pending = Arc::clone(&pending);

        let worker = tokio::spawn(async move {
            let mut report = PostProcessReport::default();
            while let Some((path, enqueued)) = receiver.recv().await {
                run_job(&tasks, &path, enqueued, settle_delay, &mut report).await;
                worker_pending.fetch_sub(1, Ordering::SeqCst);
            }
            tracing::debug!(files = report.files, "post-processing queue drained");
            report
        });

        (Self { sender, pending }, worker)
    }

    /// Files scheduled but not yet finished
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

impl PostProcessTrigger for PostProcessQueue {
    fn schedule(&self, path: &Path) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.sender.send((path.to_path_buf(), Instant::now())).is_err() {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            tracing::warn!(file = ?path, "post-processing worker is gone, skipping file");
        }
    }
}

async fn run_job(
    tasks: &[Box<dyn FileTask>],
    path: &Path,
    enqueued: Instant,
    settle_delay: Duration,
    report: &mut PostProcessReport,
) {
    report.files += 1;
    let mut deadline = enqueued;
    for task in tasks {
        if !settle_delay.is_zero() {
            deadline += settle_delay;
            tokio::time::sleep_until(deadline).await;
        }

        let counts = report.tasks.entry(task.name().to_string()).or_default();
        match task.run(path).await {
            Ok(()) => {
                counts.succeeded += 1;
                tracing::debug!(file = ?path, task = task.name(), "post-processing step done");
            }
            Err(e) => {
                counts.failed += 1;
                tracing::warn!(file = ?path, task = task.name(), "post-processing step failed: {}", e);
            }
        }
    }
}
