//! Migration manifest
//!
//! One JSON line per day-file task, appended as each file finishes, so a
//! partial or failed output file is never mistaken for a complete one.

use crate::migrate::error::MigrateResult;
use crate::migrate::merge::{DayFileStatus, MergeReport};
use crate::migrate::types::DayFileTask;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Manifest record for one day file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub run_id: Uuid,
    pub channel: String,
    pub month: String,
    pub source: String,
    pub destination: String,
    pub status: DayFileStatus,
    pub records_written: u64,
    pub injected: u64,
    pub dropped: u64,
    pub bytes_written: u64,
    pub crc32: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

impl ManifestEntry {
    pub fn new(run_id: Uuid, channel: &str, month: &str, task: &DayFileTask, report: &MergeReport) -> Self {
        Self {
            run_id,
            channel: channel.to_string(),
            month: month.to_string(),
            source: task.source_path.display().to_string(),
            destination: task.destination_path.display().to_string(),
            status: report.status,
            records_written: report.stats.records_written,
            injected: report.stats.injected,
            dropped: report.stats.dropped,
            bytes_written: report.stats.bytes_written,
            crc32: report.stats.crc32,
            error: report.error.clone(),
            finished_at: Utc::now(),
        }
    }
}

/// Append-only JSON lines manifest
pub struct Manifest {
    path: PathBuf,
    file: File,
}

impl Manifest {
    /// Open for appending, creating the file and its parent directory
    pub fn open(path: impl AsRef<Path>) -> MigrateResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&mut self, entry: &ManifestEntry) -> MigrateResult<()> {
        let line = format!("{}\n", serde_json::to_string(entry)?);
        self.file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Read every entry, skipping blank lines
    pub fn read_entries(path: impl AsRef<Path>) -> MigrateResult<Vec<ManifestEntry>> {
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            entries.push(serde_json::from_str(trimmed)?);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::merge::MergeStats;
    use chrono::NaiveDate;
    use tempfile::tempdir;

    #[test]
    fn test_append_and_read_back() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("manifest.jsonl");
        let task = DayFileTask {
            source_path: PathBuf::from("src/chan/January 2016/01-02-2016.txt"),
            destination_path: PathBuf::from("dst/chan/January 2016/2016-01-02.txt"),
            calendar_date: NaiveDate::from_ymd_opt(2016, 1, 2).unwrap(),
        };
        let report = MergeReport {
            status: DayFileStatus::Partial,
            stats: MergeStats {
                records_written: 3,
                ..MergeStats::default()
            },
            error: Some("garbage".to_string()),
        };
        let run_id = Uuid::new_v4();

        let mut manifest = Manifest::open(&path).unwrap();
        manifest
            .append(&ManifestEntry::new(run_id, "chan", "January 2016", &task, &report))
            .unwrap();
        drop(manifest);

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"status\":\"partial\""));

        let entries = Manifest::read_entries(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].run_id, run_id);
        assert_eq!(entries[0].records_written, 3);
        assert_eq!(entries[0].status, DayFileStatus::Partial);
    }
}
