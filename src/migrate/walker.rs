//! Archive Walker
//!
//! Walks `source/<channel>/<month>/<day files>` and writes each day file's
//! canonical copy to `dest/<channel>/<month>/<YYYY-MM-DD>.txt`.
//!
//! ```text
//! source/
//!   somechannel/
//!     January 2016/
//!       01-02-2016.txt   ──┐
//!       01-03-2016.txt     │  sorted by date, merged with
//!       bans.txt         ──┤  the month's sidecar injectors
//!       subs.txt         ──┘
//! ```
//!
//! Channels, months and day files run sequentially. A month's injectors are
//! forward-only cursors, so its files must be visited in date order.

use crate::config::MigrateConfig;
use crate::migrate::error::{MigrateError, MigrateResult};
use crate::migrate::injector::EventInjector;
use crate::migrate::manifest::{Manifest, ManifestEntry};
use crate::migrate::merge::{DayFileStatus, MergeReport, MergeWriter};
use crate::migrate::time::{parse_calendar_date, TimeNormalizer};
use crate::migrate::types::{DayFileTask, CANONICAL_DATE_FORMAT};
use crate::postprocess::PostProcessTrigger;
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use uuid::Uuid;

/// Date-shaped substring of a day file name
fn filename_date() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"([0-9]+-[0-9]+-[0-9]+)").expect("valid filename date regex"))
}

/// Totals for one migration run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub channels: u64,
    pub months: u64,
    pub files_complete: u64,
    pub files_partial: u64,
    pub files_failed: u64,
    /// Channel or month directories that could not be enumerated
    pub skipped_subtrees: u64,
    pub records_written: u64,
    pub injected: u64,
    pub dropped: u64,
    /// Sidecar events still unmerged when their month finished
    pub leftover_events: u64,
}

impl RunSummary {
    pub fn files_total(&self) -> u64 {
        self.files_complete + self.files_partial + self.files_failed
    }

    fn record(&mut self, report: &MergeReport) {
        match report.status {
            DayFileStatus::Complete => self.files_complete += 1,
            DayFileStatus::Partial => self.files_partial += 1,
            DayFileStatus::Failed => self.files_failed += 1,
        }
        self.records_written += report.stats.records_written;
        self.injected += report.stats.injected;
        self.dropped += report.stats.dropped;
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Run {}", self.run_id)?;
        writeln!(f, "  channels:         {}", self.channels)?;
        writeln!(f, "  months:           {}", self.months)?;
        writeln!(
            f,
            "  day files:        {} ({} complete, {} partial, {} failed)",
            self.files_total(),
            self.files_complete,
            self.files_partial,
            self.files_failed
        )?;
        writeln!(f, "  skipped subtrees: {}", self.skipped_subtrees)?;
        writeln!(f, "  records written:  {}", self.records_written)?;
        writeln!(f, "  injected events:  {}", self.injected)?;
        writeln!(f, "  dropped records:  {}", self.dropped)?;
        write!(f, "  leftover events:  {}", self.leftover_events)
    }
}

/// Subdirectory names of `dir`, sorted
fn list_dirs(dir: &Path) -> MigrateResult<Vec<String>> {
    let enumeration_error = |source| MigrateError::DirectoryEnumeration {
        path: dir.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(enumeration_error)? {
        let entry = entry.map_err(enumeration_error)?;
        if entry.file_type().map_err(enumeration_error)?.is_dir() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Build the month's day file tasks, sorted ascending by calendar date
///
/// Files without a date-shaped name are ignored. Names with a date-shaped
/// token no date format accepts are skipped with a warning. Equal dates keep
/// their enumeration order.
pub fn day_file_tasks(source_month: &Path, dest_month: &Path) -> MigrateResult<Vec<DayFileTask>> {
    let enumeration_error = |source| MigrateError::DirectoryEnumeration {
        path: source_month.to_path_buf(),
        source,
    };

    let mut names = Vec::new();
    for entry in std::fs::read_dir(source_month).map_err(enumeration_error)? {
        let entry = entry.map_err(enumeration_error)?;
        if entry.file_type().map_err(enumeration_error)?.is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    let mut tasks = Vec::new();
    for name in names {
        let Some(token) = filename_date().find(&name) else {
            continue;
        };
        match parse_calendar_date(token.as_str()) {
            Ok(calendar_date) => {
                let destination_path =
                    dest_month.join(format!("{}.txt", calendar_date.format(CANONICAL_DATE_FORMAT)));
                tasks.push(DayFileTask {
                    source_path: source_month.join(&name),
                    destination_path,
                    calendar_date,
                });
            }
            Err(e) => {
                tracing::warn!(file = %name, "skipping day file: {}", e);
            }
        }
    }

    tasks.sort_by_key(|task| task.calendar_date);

    for pair in tasks.windows(2) {
        if pair[0].destination_path == pair[1].destination_path {
            tracing::warn!(
                first = ?pair[0].source_path,
                second = ?pair[1].source_path,
                "two day files share a destination, the later one wins"
            );
        }
    }

    Ok(tasks)
}

/// Drives the merge-writer over a source archive
pub struct ArchiveWalker {
    source_root: PathBuf,
    dest_root: PathBuf,
    config: MigrateConfig,
    writer: MergeWriter,
    run_id: Uuid,
}

impl ArchiveWalker {
    pub fn new(source_root: impl Into<PathBuf>, dest_root: impl Into<PathBuf>, config: MigrateConfig) -> Self {
        let writer = MergeWriter::new(&config.sentinel_speaker, &config.notification_label);
        Self {
            source_root: source_root.into(),
            dest_root: dest_root.into(),
            config,
            writer,
            run_id: Uuid::new_v4(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Where the run's manifest is appended, if enabled
    pub fn manifest_path(&self) -> Option<PathBuf> {
        if self.config.manifest_file.is_empty() {
            None
        } else {
            Some(self.dest_root.join(&self.config.manifest_file))
        }
    }

    /// Migrate the whole archive
    ///
    /// Only a source root that cannot be enumerated is an error; every
    /// smaller failure is logged and tallied in the summary.
    pub fn run(&self, trigger: &dyn PostProcessTrigger) -> MigrateResult<RunSummary> {
        let channels = list_dirs(&self.source_root)?;
        let mut summary = RunSummary {
            run_id: self.run_id,
            ..RunSummary::default()
        };

        let mut manifest = match self.manifest_path() {
            Some(path) => match Manifest::open(&path) {
                Ok(manifest) => Some(manifest),
                Err(e) => {
                    tracing::warn!(manifest = ?path, "manifest disabled for this run: {}", e);
                    None
                }
            },
            None => None,
        };

        tracing::info!(
            run_id = %self.run_id,
            source = ?self.source_root,
            dest = ?self.dest_root,
            channels = channels.len(),
            "starting migration"
        );

        for channel in &channels {
            summary.channels += 1;
            self.migrate_channel(channel, trigger, manifest.as_mut(), &mut summary);
        }

        tracing::info!(
            run_id = %self.run_id,
            files = summary.files_total(),
            partial = summary.files_partial,
            failed = summary.files_failed,
            skipped = summary.skipped_subtrees,
            "migration finished"
        );
        Ok(summary)
    }

    fn migrate_channel(
        &self,
        channel: &str,
        trigger: &dyn PostProcessTrigger,
        mut manifest: Option<&mut Manifest>,
        summary: &mut RunSummary,
    ) {
        let months = match list_dirs(&self.source_root.join(channel)) {
            Ok(months) => months,
            Err(e) => {
                tracing::error!(channel, "skipping channel: {}", e);
                summary.skipped_subtrees += 1;
                return;
            }
        };

        for month in &months {
            summary.months += 1;
            self.migrate_month(channel, month, trigger, manifest.as_deref_mut(), summary);
        }
    }

    fn open_injector(&self, speaker: &str, path: PathBuf) -> Option<EventInjector> {
        match EventInjector::open(speaker, &path, TimeNormalizer::new()) {
            Ok(injector) => injector,
            Err(e) => {
                tracing::warn!(sidecar = ?path, "proceeding without injector: {}", e);
                None
            }
        }
    }

    fn migrate_month(
        &self,
        channel: &str,
        month: &str,
        trigger: &dyn PostProcessTrigger,
        mut manifest: Option<&mut Manifest>,
        summary: &mut RunSummary,
    ) {
        let source_month = self.source_root.join(channel).join(month);
        let dest_month = self.dest_root.join(channel).join(month);

        let tasks = match day_file_tasks(&source_month, &dest_month) {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::error!(channel, month, "skipping month: {}", e);
                summary.skipped_subtrees += 1;
                return;
            }
        };

        let mut injectors = vec![
            self.open_injector(&self.config.ban_speaker, source_month.join(&self.config.bans_file)),
            self.open_injector(&self.config.sub_speaker, source_month.join(&self.config.subs_file)),
        ];

        for task in &tasks {
            let report = self.writer.write_day_file(task, &mut injectors);
            summary.record(&report);

            if let Some(manifest) = manifest.as_deref_mut() {
                let entry = ManifestEntry::new(self.run_id, channel, month, task, &report);
                if let Err(e) = manifest.append(&entry) {
                    tracing::warn!(manifest = ?manifest.path(), "failed to append manifest entry: {}", e);
                }
            }

            match report.status {
                DayFileStatus::Failed => {
                    tracing::error!(
                        channel,
                        month,
                        file = ?task.source_path,
                        error = report.error.as_deref().unwrap_or_default(),
                        "day file failed"
                    );
                }
                status => {
                    if status == DayFileStatus::Partial {
                        tracing::warn!(
                            channel,
                            month,
                            file = ?task.source_path,
                            error = report.error.as_deref().unwrap_or_default(),
                            "day file is partial"
                        );
                    }
                    trigger.schedule(&task.destination_path);
                }
            }

            tracing::info!(
                channel,
                month,
                date = %task.date_string(),
                records = report.stats.records_written,
                injected = report.stats.injected,
                "finished"
            );
        }

        for injector in injectors.into_iter().flatten() {
            let speaker = injector.speaker().to_string();
            let path = injector.path().to_path_buf();
            let leftover = injector.drain_count();
            if leftover > 0 {
                tracing::warn!(
                    channel,
                    month,
                    speaker = %speaker,
                    sidecar = ?path,
                    leftover,
                    "sidecar events after the month's last record were not merged"
                );
                summary.leftover_events += leftover as u64;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::postprocess::NoopTrigger;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingTrigger {
        scheduled: Mutex<Vec<PathBuf>>,
    }

    impl PostProcessTrigger for RecordingTrigger {
        fn schedule(&self, path: &Path) {
            self.scheduled.lock().unwrap().push(path.to_path_buf());
        }
    }

    fn write(path: &Path, content: &str) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_migrates_month_with_ban_sidecar() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let month = src.path().join("chan/January 2016");
        write(
            &month.join("01-02-2016.txt"),
            "Jan 2 2016 10:00:00 UTC user1: hi\nJan 2 2016 10:05:00 UTC user2: hey\n",
        );
        write(&month.join("bans.txt"), "[2016-01-02 10:02:00 UTC] baduser\n");

        let trigger = RecordingTrigger::default();
        let walker = ArchiveWalker::new(src.path(), dst.path(), MigrateConfig::default());
        let summary = walker.run(&trigger).unwrap();

        let destination = dst.path().join("chan/January 2016/2016-01-02.txt");
        assert_eq!(
            std::fs::read_to_string(&destination).unwrap(),
            "[2016-01-02 10:00:00 UTC] user1: hi\n\
             [2016-01-02 10:02:00 UTC] Ban: baduser\n\
             [2016-01-02 10:05:00 UTC] user2: hey\n"
        );
        assert_eq!(summary.files_complete, 1);
        assert_eq!(summary.injected, 1);
        assert_eq!(*trigger.scheduled.lock().unwrap(), vec![destination]);

        let entries = Manifest::read_entries(walker.manifest_path().unwrap()).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].run_id, walker.run_id());
        assert_eq!(entries[0].status, DayFileStatus::Complete);
    }

    #[test]
    fn test_absent_sidecars_leave_records_untouched() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        write(
            &src.path().join("chan/March 2016/2016-03-01.txt"),
            "10:00:00 a: one\n10:01:00 b: two\n",
        );

        let summary = ArchiveWalker::new(src.path(), dst.path(), MigrateConfig::default())
            .run(&NoopTrigger)
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(dst.path().join("chan/March 2016/2016-03-01.txt")).unwrap(),
            "[2016-03-01 10:00:00 UTC] a: one\n[2016-03-01 10:01:00 UTC] b: two\n"
        );
        assert_eq!(summary.injected, 0);
        assert_eq!(summary.leftover_events, 0);
    }

    #[test]
    fn test_day_files_sorted_and_renamed() {
        let src = tempdir().unwrap();
        let month = src.path().join("January 2016");
        write(&month.join("01-15-2016.txt"), "");
        write(&month.join("2016-01-03.txt"), "");
        write(&month.join("notes.txt"), "");
        write(&month.join("bans.txt"), "");

        let tasks = day_file_tasks(&month, Path::new("out")).unwrap();
        let destinations: Vec<_> = tasks.iter().map(|t| t.destination_path.clone()).collect();

        assert_eq!(
            destinations,
            vec![PathBuf::from("out/2016-01-03.txt"), PathBuf::from("out/2016-01-15.txt")]
        );
    }

    #[test]
    fn test_invalid_filename_date_is_skipped() {
        let src = tempdir().unwrap();
        let month = src.path().join("January 2016");
        write(&month.join("13-45-2016.txt"), "");
        write(&month.join("01-02-2016.txt"), "");

        let tasks = day_file_tasks(&month, Path::new("out")).unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].date_string(), "2016-01-02");
    }

    #[test]
    fn test_injector_state_carries_across_days() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        let month = src.path().join("chan/January 2016");
        write(&month.join("01-02-2016.txt"), "10:00:00 a: day one\n");
        write(&month.join("01-03-2016.txt"), "10:00:00 b: day two\n");
        write(
            &month.join("subs.txt"),
            "[2016-01-02 12:00:00 UTC] late sub\n[2016-01-04 09:00:00 UTC] after the month\n",
        );

        let summary = ArchiveWalker::new(src.path(), dst.path(), MigrateConfig::default())
            .run(&NoopTrigger)
            .unwrap();

        let day_two =
            std::fs::read_to_string(dst.path().join("chan/January 2016/2016-01-03.txt")).unwrap();
        assert_eq!(
            day_two,
            "[2016-01-02 12:00:00 UTC] Subscriber: late sub\n[2016-01-03 10:00:00 UTC] b: day two\n"
        );
        assert_eq!(summary.injected, 1);
        assert_eq!(summary.leftover_events, 1);
    }

    #[test]
    fn test_failed_file_is_not_scheduled() {
        let src = tempdir().unwrap();
        let dst = tempdir().unwrap();
        write(&src.path().join("chan/May 2016/2016-05-01.txt"), "10:00:00 a: ok\n");
        // A directory where the destination file should go makes the create fail.
        std::fs::create_dir_all(dst.path().join("chan/May 2016/2016-05-01.txt")).unwrap();

        let trigger = RecordingTrigger::default();
        let summary = ArchiveWalker::new(src.path(), dst.path(), MigrateConfig::default())
            .run(&trigger)
            .unwrap();

        assert_eq!(summary.files_failed, 1);
        assert!(trigger.scheduled.lock().unwrap().is_empty());
    }

    #[test]
    fn test_missing_source_root_is_an_error() {
        let dst = tempdir().unwrap();
        let walker = ArchiveWalker::new(dst.path().join("nope"), dst.path(), MigrateConfig::default());
        assert!(matches!(
            walker.run(&NoopTrigger),
            Err(MigrateError::DirectoryEnumeration { .. })
        ));
    }
}
