//! Statistics recorder
//!
//! Appends one line per [`TransferResult`] to a log file named from the
//! configured template. At most one destination is open at a time; it is
//! closed and reopened when an enabled date component of the template
//! differs from the date captured at open time. Durability is bounded, not
//! per-write: the buffer is flushed and synced every N records.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::sync::Mutex;

use chrono::{Local, NaiveDate};
use tracing::{debug, info};

use archway_core::domain::{StatsFileTemplate, TransferResult};

/// Append-only, date-rotating statistics log.
///
/// `record` is safe to call from concurrently running batches; writes are
/// serialized through an internal mutex.
pub struct StatisticsRecorder {
    template: StatsFileTemplate,
    frequency: u32,
    state: Mutex<RecorderState>,
}

struct RecorderState {
    log: Option<OpenLog>,
    flush_counter: u32,
}

struct OpenLog {
    writer: BufWriter<File>,
    opened: NaiveDate,
}

impl StatisticsRecorder {
    /// Creates a recorder; the first destination opens lazily on the first
    /// record.
    pub fn new(template: StatsFileTemplate, frequency: u32) -> Self {
        Self {
            template,
            frequency,
            state: Mutex::new(RecorderState {
                log: None,
                flush_counter: 0,
            }),
        }
    }

    /// Appends one result line, rotating the destination first if an
    /// enabled date component changed since it was opened.
    pub fn record(&self, result: &TransferResult) -> io::Result<()> {
        self.record_on(result, Local::now().date_naive())
    }

    // Date injected separately so rotation is testable without waiting for
    // midnight.
    fn record_on(&self, result: &TransferResult, today: NaiveDate) -> io::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());

        let mut log = match state.log.take() {
            Some(log) if !self.template.rotation_due(log.opened, today) => log,
            Some(mut stale) => {
                info!("date changed, opening new statistics file");
                stale.writer.flush()?;
                self.open_log(today)?
            }
            None => self.open_log(today)?,
        };

        writeln!(
            log.writer,
            "{} {} {} {} {} {} => {}",
            result.timestamp.to_rfc3339(),
            result.files_total,
            result.files_transferred,
            result.bytes_total,
            result.bytes_transferred,
            result.source,
            result.target,
        )?;

        state.flush_counter += 1;
        if state.flush_counter >= self.frequency {
            state.flush_counter = 0;
            log.writer.flush()?;
            log.writer.get_ref().sync_data()?;
            debug!("statistics log flushed");
        }

        state.log = Some(log);
        Ok(())
    }

    fn open_log(&self, today: NaiveDate) -> io::Result<OpenLog> {
        let path = self.template.filename_for(today);
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!(path = %path.display(), "opened statistics file");
        Ok(OpenLog {
            writer: BufWriter::new(file),
            opened: today,
        })
    }

    /// Flushes and syncs whatever is buffered; used at shutdown.
    pub fn flush(&self) -> io::Result<()> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(log) = &mut state.log {
            log.writer.flush()?;
            log.writer.get_ref().sync_data()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    fn result() -> TransferResult {
        TransferResult {
            files_total: 10,
            files_transferred: 4,
            bytes_total: 88000,
            bytes_transferred: 9000,
            source: "/data/2024/EPN001/raw/".to_string(),
            target: "/archive/EPN001/2024/".to_string(),
            timestamp: Local.with_ymd_and_hms(2024, 6, 15, 10, 30, 0).unwrap(),
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_line_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.log");
        let recorder = StatisticsRecorder::new(
            StatsFileTemplate::parse(path.to_str().unwrap()),
            1,
        );

        recorder.record_on(&result(), date(2024, 6, 15)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let line = content.lines().next().unwrap();
        let fields: Vec<&str> = line.split_whitespace().collect();
        // <timestamp> <ft> <fx> <st> <sx> <source> => <target>
        assert_eq!(fields.len(), 8);
        assert!(fields[0].starts_with("2024-06-15T10:30:00"));
        assert_eq!(&fields[1..5], &["10", "4", "88000", "9000"]);
        assert_eq!(fields[5], "/data/2024/EPN001/raw/");
        assert_eq!(fields[6], "=>");
        assert_eq!(fields[7], "/archive/EPN001/2024/");
    }

    #[test]
    fn test_records_append() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.log");
        let recorder = StatisticsRecorder::new(
            StatsFileTemplate::parse(path.to_str().unwrap()),
            1,
        );

        recorder.record_on(&result(), date(2024, 6, 15)).unwrap();
        recorder.record_on(&result(), date(2024, 6, 20)).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_rotation_on_month_change() {
        let dir = tempfile::tempdir().unwrap();
        let template = format!("{}/stats-${{year}}-${{month}}.log", dir.path().display());
        let recorder = StatisticsRecorder::new(StatsFileTemplate::parse(&template), 1);

        recorder.record_on(&result(), date(2024, 6, 30)).unwrap();
        recorder.record_on(&result(), date(2024, 7, 1)).unwrap();

        assert!(dir.path().join("stats-2024-6.log").exists());
        assert!(dir.path().join("stats-2024-7.log").exists());
    }

    #[test]
    fn test_no_rotation_when_only_disabled_component_changes() {
        let dir = tempfile::tempdir().unwrap();
        let template = format!("{}/stats-${{year}}-${{month}}.log", dir.path().display());
        let recorder = StatisticsRecorder::new(StatsFileTemplate::parse(&template), 1);

        // the day changes, but ${day} is not part of the template
        recorder.record_on(&result(), date(2024, 6, 15)).unwrap();
        recorder.record_on(&result(), date(2024, 6, 20)).unwrap();

        let content =
            std::fs::read_to_string(dir.path().join("stats-2024-6.log")).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn test_flush_happens_every_nth_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.log");
        let recorder = StatisticsRecorder::new(
            StatsFileTemplate::parse(path.to_str().unwrap()),
            2,
        );

        // first record stays in the writer's buffer
        recorder.record_on(&result(), date(2024, 6, 15)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");

        // second record crosses the threshold and hits the disk
        recorder.record_on(&result(), date(2024, 6, 15)).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 2);
    }

    #[test]
    fn test_explicit_flush_drains_the_buffer() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.log");
        let recorder = StatisticsRecorder::new(
            StatsFileTemplate::parse(path.to_str().unwrap()),
            100,
        );

        recorder.record_on(&result(), date(2024, 6, 15)).unwrap();
        recorder.flush().unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 1);
    }
}
