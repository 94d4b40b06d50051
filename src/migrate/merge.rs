//! Chronological Merge-Writer
//!
//! Drains the primary day log and every active injector into one canonical
//! destination file. Before each primary record is written, the injectors
//! are drained earliest event first while that event is strictly earlier, so
//! on equal instants the primary record goes first.
//!
//! ```text
//! primary:  10:00 hi ─────────────── 10:05 hey
//! bans:             10:02 baduser
//! output:   10:00 hi, 10:02 Ban: baduser, 10:05 hey
//! ```
//!
//! Partial output is accepted: on unrecoverable input the file keeps what
//! was written so far and the report says `Partial`.

use crate::migrate::cursor::ByteCursor;
use crate::migrate::error::{ExtractError, InjectorError, MigrateError};
use crate::migrate::extract::{LineExtractor, DEFAULT_SENTINEL_SPEAKER};
use crate::migrate::injector::EventInjector;
use crate::migrate::time::TimeNormalizer;
use crate::migrate::types::{format_line, DayFileTask};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Label written in place of the sentinel speaker
pub const DEFAULT_NOTIFICATION_LABEL: &str = "twitchnotify";

/// Final state of one day file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DayFileStatus {
    /// Every usable record was written
    Complete,
    /// The file stopped early on malformed input; what was written is kept
    Partial,
    /// Reading, creating or writing failed; the output is unusable
    Failed,
}

/// Counters for one merged file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Primary records written
    pub records_written: u64,
    /// Injector events written
    pub injected: u64,
    /// Primary records without a usable instant
    pub dropped: u64,
    pub bytes_written: u64,
    /// CRC32 of every byte written
    pub crc32: u32,
}

/// Result of merging one day file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub status: DayFileStatus,
    pub stats: MergeStats,
    pub error: Option<String>,
}

impl MergeReport {
    fn failed(error: MigrateError) -> Self {
        Self {
            status: DayFileStatus::Failed,
            stats: MergeStats::default(),
            error: Some(error.to_string()),
        }
    }
}

/// Writer wrapper that tracks the byte count and checksum of the output
struct ChecksumSink<'a, W: Write> {
    inner: &'a mut W,
    hasher: crc32fast::Hasher,
    bytes: u64,
}

impl<'a, W: Write> ChecksumSink<'a, W> {
    fn new(inner: &'a mut W) -> Self {
        Self {
            inner,
            hasher: crc32fast::Hasher::new(),
            bytes: 0,
        }
    }

    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.inner.write_all(line.as_bytes())?;
        self.hasher.update(line.as_bytes());
        self.bytes += line.len() as u64;
        Ok(())
    }

    fn finish(self, stats: &mut MergeStats) {
        stats.bytes_written = self.bytes;
        stats.crc32 = self.hasher.finalize();
    }
}

/// Merges primary records and injected events into canonical output
#[derive(Debug, Clone)]
pub struct MergeWriter {
    extractor: LineExtractor,
    normalizer: TimeNormalizer,
    sentinel: String,
    notification_label: String,
}

impl Default for MergeWriter {
    fn default() -> Self {
        Self::new(DEFAULT_SENTINEL_SPEAKER, DEFAULT_NOTIFICATION_LABEL)
    }
}

impl MergeWriter {
    pub fn new(sentinel: &str, notification_label: &str) -> Self {
        Self {
            extractor: LineExtractor::new(sentinel),
            normalizer: TimeNormalizer::new(),
            sentinel: sentinel.to_string(),
            notification_label: notification_label.to_string(),
        }
    }

    /// Replace the time normalizer
    pub fn with_normalizer(mut self, normalizer: TimeNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    pub fn normalizer(&self) -> &TimeNormalizer {
        &self.normalizer
    }

    /// Migrate one day file to its destination, truncating any previous copy
    pub fn write_day_file(
        &self,
        task: &DayFileTask,
        injectors: &mut [Option<EventInjector>],
    ) -> MergeReport {
        let data = match std::fs::read(&task.source_path) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(file = ?task.source_path, "failed to read source log: {}", e);
                return MergeReport::failed(e.into());
            }
        };

        let destination = &task.destination_path;
        if let Some(parent) = destination.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                tracing::error!(dir = ?parent, "error creating target dir: {}", e);
                return MergeReport::failed(e.into());
            }
        }

        let file = match OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(destination)
        {
            Ok(file) => file,
            Err(source) => {
                tracing::error!(file = ?destination, "error creating target file: {}", source);
                return MergeReport::failed(MigrateError::Write {
                    path: destination.clone(),
                    source,
                });
            }
        };

        let mut writer = BufWriter::new(file);
        let source_label = task.source_path.display().to_string();
        let mut report = self.merge_into(
            data,
            task.calendar_date,
            &source_label,
            injectors,
            &mut writer,
            destination,
        );

        if report.status != DayFileStatus::Failed {
            if let Err(source) = writer.flush() {
                tracing::error!(file = ?destination, "error flushing log file: {}", source);
                report.status = DayFileStatus::Failed;
                report.error = Some(
                    MigrateError::Write {
                        path: destination.clone(),
                        source,
                    }
                    .to_string(),
                );
            }
        }

        report
    }

    /// Merge `data` and the injectors into `out`
    ///
    /// `context` resolves date-less primary timestamps. Injectors that fail
    /// are set to `None` and stay retired for the caller's later files.
    pub fn merge_into<W: Write>(
        &self,
        data: Vec<u8>,
        context: NaiveDate,
        source_label: &str,
        injectors: &mut [Option<EventInjector>],
        out: &mut W,
        destination: &Path,
    ) -> MergeReport {
        let mut cursor = ByteCursor::new(data);
        let mut sink = ChecksumSink::new(out);
        let mut stats = MergeStats::default();
        let mut status = DayFileStatus::Complete;
        let mut error = None;

        loop {
            let offset = cursor.offset();
            let record = match self.extractor.next_record(&mut cursor) {
                Ok(record) => record,
                Err(ExtractError::EndOfInput) => break,
                Err(e) => {
                    tracing::warn!(file = source_label, "error reading log line: {}", e);
                    status = DayFileStatus::Partial;
                    error = Some(e.to_string());
                    break;
                }
            };

            let instant = match self.normalizer.normalize(&record.timestamp_text, Some(context)) {
                Ok(instant) => instant,
                Err(e) => {
                    let e = e.at(format!("{source_label}:{offset}"));
                    tracing::warn!(
                        speaker = %record.speaker,
                        message = %record.message,
                        "dropping record: {}",
                        e
                    );
                    stats.dropped += 1;
                    continue;
                }
            };

            let write_result =
                drain_injectors(injectors, instant, &mut sink, &mut stats, source_label);

            let speaker = if record.speaker == self.sentinel {
                self.notification_label.as_str()
            } else {
                record.speaker.as_str()
            };
            let write_result = write_result
                .and_then(|_| sink.write_line(&format_line(&instant, speaker, &record.message)));

            if let Err(source) = write_result {
                tracing::error!(file = ?destination, "error writing log line: {}", source);
                status = DayFileStatus::Failed;
                error = Some(
                    MigrateError::Write {
                        path: destination.to_path_buf(),
                        source,
                    }
                    .to_string(),
                );
                break;
            }
            stats.records_written += 1;
        }

        sink.finish(&mut stats);
        MergeReport {
            status,
            stats,
            error,
        }
    }
}

/// Write every cached injector event earlier than `until`, earliest first
///
/// Equal instants across injectors keep the slice order.
fn drain_injectors<W: Write>(
    injectors: &mut [Option<EventInjector>],
    until: DateTime<Utc>,
    sink: &mut ChecksumSink<'_, W>,
    stats: &mut MergeStats,
    source_label: &str,
) -> std::io::Result<()> {
    loop {
        let mut next: Option<(usize, DateTime<Utc>)> = None;
        for (i, slot) in injectors.iter().enumerate() {
            let Some(at) = slot.as_ref().and_then(EventInjector::current_instant) else {
                continue;
            };
            if at < until && next.map_or(true, |(_, best)| at < best) {
                next = Some((i, at));
            }
        }
        let Some((i, _)) = next else {
            return Ok(());
        };

        let slot = &mut injectors[i];
        let Some(injector) = slot.as_mut() else {
            return Ok(());
        };
        sink.write_line(injector.current_line())?;
        stats.injected += 1;
        tracing::debug!(file = source_label, line = %injector.current_line().trim_end(), "added");

        if let Err(e) = injector.advance() {
            match e {
                InjectorError::Extract(ExtractError::EndOfInput) => {
                    tracing::debug!(speaker = injector.speaker(), "injector exhausted");
                }
                other => {
                    tracing::warn!(
                        speaker = injector.speaker(),
                        sidecar = ?injector.path(),
                        "error advancing injector: {}",
                        other
                    );
                }
            }
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrate::extract::LineExtractor;
    use std::path::PathBuf;

    fn context() -> NaiveDate {
        NaiveDate::from_ymd_opt(2016, 1, 2).unwrap()
    }

    fn injector(speaker: &str, data: &str) -> Option<EventInjector> {
        let mut injector =
            EventInjector::from_bytes(speaker, data.as_bytes().to_vec(), TimeNormalizer::new());
        injector.advance().ok().map(|_| injector)
    }

    fn merge(data: &str, injectors: &mut [Option<EventInjector>]) -> (String, MergeReport) {
        let mut out = Vec::new();
        let report = MergeWriter::default().merge_into(
            data.as_bytes().to_vec(),
            context(),
            "test.txt",
            injectors,
            &mut out,
            Path::new("out.txt"),
        );
        (String::from_utf8(out).unwrap(), report)
    }

    fn timestamps(output: &str) -> Vec<DateTime<Utc>> {
        let extractor = LineExtractor::default();
        let normalizer = TimeNormalizer::new();
        let mut cursor = ByteCursor::new(output.as_bytes().to_vec());
        let mut out = Vec::new();
        while let Ok(record) = extractor.next_record(&mut cursor) {
            out.push(normalizer.normalize(&record.timestamp_text, None).unwrap());
        }
        out
    }

    #[test]
    fn test_ban_is_merged_between_primary_lines() {
        let primary = "Jan 2 2016 10:00:00 UTC user1: hi\nJan 2 2016 10:05:00 UTC user2: hey\n";
        let mut injectors = vec![injector("Ban", "[2016-01-02 10:02:00 UTC] baduser\n")];

        let (output, report) = merge(primary, &mut injectors);

        assert_eq!(
            output,
            "[2016-01-02 10:00:00 UTC] user1: hi\n\
             [2016-01-02 10:02:00 UTC] Ban: baduser\n\
             [2016-01-02 10:05:00 UTC] user2: hey\n"
        );
        assert_eq!(report.status, DayFileStatus::Complete);
        assert_eq!(report.stats.records_written, 2);
        assert_eq!(report.stats.injected, 1);
        assert!(injectors[0].is_none());
    }

    #[test]
    fn test_overlapping_injectors_interleave_by_instant() {
        let primary = "10:00:00 a: 1\n10:10:00 b: 2\n";
        let mut injectors = vec![
            injector("Ban", "[2016-01-02 10:05:00 UTC] x\n[2016-01-02 10:07:00 UTC] y\n"),
            injector("Subscriber", "[2016-01-02 10:06:00 UTC] s\n"),
        ];

        let (output, report) = merge(primary, &mut injectors);

        assert_eq!(
            output,
            "[2016-01-02 10:00:00 UTC] a: 1\n\
             [2016-01-02 10:05:00 UTC] Ban: x\n\
             [2016-01-02 10:06:00 UTC] Subscriber: s\n\
             [2016-01-02 10:07:00 UTC] Ban: y\n\
             [2016-01-02 10:10:00 UTC] b: 2\n"
        );
        assert_eq!(report.stats.injected, 3);
    }

    #[test]
    fn test_equal_injector_instants_keep_injector_order() {
        let primary = "10:10:00 a: 1\n";
        let mut injectors = vec![
            injector("Ban", "[2016-01-02 10:05:00 UTC] x\n"),
            injector("Subscriber", "[2016-01-02 10:05:00 UTC] s\n"),
        ];

        let (output, _) = merge(primary, &mut injectors);

        assert_eq!(
            output,
            "[2016-01-02 10:05:00 UTC] Ban: x\n\
             [2016-01-02 10:05:00 UTC] Subscriber: s\n\
             [2016-01-02 10:10:00 UTC] a: 1\n"
        );
    }

    fn hms(secs: u64) -> String {
        format!("{:02}:{:02}:{:02}", secs / 3600, (secs / 60) % 60, secs % 60)
    }

    #[test]
    fn test_random_overlapping_injectors_stay_sorted() {
        let mut state: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move |bound: u64| {
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (state >> 33) % bound
        };

        for _ in 0..50 {
            let mut sorted_secs = |count: u64| {
                let mut secs: Vec<u64> = (0..count).map(|_| next(86_400)).collect();
                secs.sort_unstable();
                secs
            };
            let primary_secs = sorted_secs(20);
            let ban_secs = sorted_secs(10);
            let sub_secs = sorted_secs(10);

            let primary: String = primary_secs
                .iter()
                .enumerate()
                .map(|(i, s)| format!("{} user{}: msg\n", hms(*s), i))
                .collect();
            let sidecar = |secs: &[u64]| -> String {
                secs.iter()
                    .map(|s| format!("[2016-01-02 {} UTC] ev\n", hms(*s)))
                    .collect()
            };
            let mut injectors = vec![
                injector("Ban", &sidecar(&ban_secs)),
                injector("Subscriber", &sidecar(&sub_secs)),
            ];

            let (output, report) = merge(&primary, &mut injectors);
            let stamps = timestamps(&output);

            let last = *primary_secs.last().unwrap();
            let expected_injected = ban_secs.iter().chain(&sub_secs).filter(|s| **s < last).count();
            assert!(stamps.windows(2).all(|w| w[0] <= w[1]), "unsorted output:\n{}", output);
            assert_eq!(report.stats.records_written, 20);
            assert_eq!(report.stats.injected as usize, expected_injected);
            assert_eq!(stamps.len(), 20 + expected_injected);
        }
    }

    #[test]
    fn test_dateless_record_after_midnight_keeps_its_day() {
        let primary = "Jan 2 2016 23:59:00 UTC a: 1\nJan 3 00:01:00 UTC b: 2\n";
        let (output, report) = merge(primary, &mut []);

        assert_eq!(
            output,
            "[2016-01-02 23:59:00 UTC] a: 1\n\
             [2016-01-03 00:01:00 UTC] b: 2\n"
        );
        assert_eq!(report.stats.dropped, 0);
    }

    #[test]
    fn test_equal_instants_write_primary_first() {
        let primary = "Jan 2 2016 10:00:00 UTC user1: hi\n";
        let mut injectors = vec![injector("Ban", "[2016-01-02 10:00:00 UTC] tie\n")];

        let (output, report) = merge(primary, &mut injectors);

        assert_eq!(output, "[2016-01-02 10:00:00 UTC] user1: hi\n");
        assert_eq!(report.stats.injected, 0);
        assert_eq!(
            injectors[0].as_ref().unwrap().current_line(),
            "[2016-01-02 10:00:00 UTC] Ban: tie\n"
        );
    }

    #[test]
    fn test_sentinel_speaker_is_rewritten() {
        let primary = format!("Jan 2 2016 10:00:00 UTC {}: bob subscribed!\n", DEFAULT_SENTINEL_SPEAKER);
        let (output, _) = merge(&primary, &mut []);

        assert_eq!(output, "[2016-01-02 10:00:00 UTC] twitchnotify: bob subscribed!\n");
        assert!(!output.contains('#'));
    }

    #[test]
    fn test_records_copied_verbatim_without_injectors() {
        let primary = "[01/02/2016 3:04:05 PM] <alice>: one: two\r\n3:05:00 PM bob: three\n";
        let (output, report) = merge(primary, &mut []);

        assert_eq!(
            output,
            "[2016-01-02 15:04:05 UTC] alice: one: two\n\
             [2016-01-02 15:05:00 UTC] bob: three\n"
        );
        assert_eq!(report.stats.records_written, 2);
    }

    #[test]
    fn test_unparseable_time_is_dropped_not_fatal() {
        let primary = "99:99:99 ghost: boo\nJan 2 2016 10:00:00 UTC user1: hi\n";
        let (output, report) = merge(primary, &mut []);

        assert_eq!(output, "[2016-01-02 10:00:00 UTC] user1: hi\n");
        assert_eq!(report.stats.dropped, 1);
        assert_eq!(report.status, DayFileStatus::Complete);
    }

    #[test]
    fn test_unrecoverable_garbage_leaves_partial_output() {
        let primary = "Jan 2 2016 10:00:00 UTC user1: hi\n@@@@ Jan 2 2016 10:01:00 UTC user2: lost";
        let (output, report) = merge(primary, &mut []);

        assert_eq!(output, "[2016-01-02 10:00:00 UTC] user1: hi\n");
        assert_eq!(report.status, DayFileStatus::Partial);
        assert!(report.error.unwrap().contains("garbage"));
    }

    #[test]
    fn test_failing_injector_is_retired() {
        let primary = "10:00:00 a: 1\n10:10:00 b: 2\n";
        let mut injectors = vec![injector(
            "Ban",
            "[2016-01-02 09:00:00 UTC] ok\n[bogus] broken\n[2016-01-02 10:05:00 UTC] unreachable\n",
        )];

        let (output, report) = merge(primary, &mut injectors);

        assert_eq!(report.stats.injected, 1);
        assert!(injectors[0].is_none());
        assert!(!output.contains("unreachable"));
    }

    #[test]
    fn test_checksum_matches_output() {
        let (output, report) = merge("Jan 2 2016 10:00:00 UTC user1: hi\n", &mut []);
        assert_eq!(report.stats.bytes_written, output.len() as u64);
        assert_eq!(report.stats.crc32, crc32fast::hash(output.as_bytes()));
    }

    struct BrokenWriter;

    impl Write for BrokenWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_write_failure_marks_file_failed() {
        let report = MergeWriter::default().merge_into(
            b"Jan 2 2016 10:00:00 UTC user1: hi\n".to_vec(),
            context(),
            "test.txt",
            &mut [],
            &mut BrokenWriter,
            Path::new("out.txt"),
        );
        assert_eq!(report.status, DayFileStatus::Failed);
        assert!(report.error.unwrap().contains("disk full"));
    }

    #[test]
    fn test_write_day_file_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("01-02-2016.txt");
        std::fs::write(&source, "Jan 2 2016 10:00:00 UTC user1: hi\n").unwrap();
        let destination: PathBuf = dir.path().join("out/chan/January 2016/2016-01-02.txt");
        std::fs::create_dir_all(destination.parent().unwrap()).unwrap();
        std::fs::write(&destination, "stale content that must be truncated\n").unwrap();

        let task = DayFileTask {
            source_path: source,
            destination_path: destination.clone(),
            calendar_date: context(),
        };
        let report = MergeWriter::default().write_day_file(&task, &mut []);

        assert_eq!(report.status, DayFileStatus::Complete);
        assert_eq!(
            std::fs::read_to_string(&destination).unwrap(),
            "[2016-01-02 10:00:00 UTC] user1: hi\n"
        );
    }

    #[test]
    fn test_missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let task = DayFileTask {
            source_path: dir.path().join("missing.txt"),
            destination_path: dir.path().join("out/2016-01-02.txt"),
            calendar_date: context(),
        };
        let report = MergeWriter::default().write_day_file(&task, &mut []);
        assert_eq!(report.status, DayFileStatus::Failed);
        assert!(!task.destination_path.exists());
    }
}
