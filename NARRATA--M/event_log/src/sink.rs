use std::{
    fs::{self, File, OpenOptions},
    io::{BufRead, BufReader, Write},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{de::DeserializeOwned, Serialize};

use crate::entry::LogEntry;

/// Destination that receives every appended entry in emission order.
pub trait LogSink: Send + Sync {
    /// Accepts one entry. Failures are reported by the log, never retried.
    fn accept(&self, entry: &LogEntry) -> Result<()>;
}

/// Append-only JSON-lines file shared by the log and telemetry writers.
#[derive(Debug)]
pub struct JsonLinesFile {
    path: PathBuf,
    writer: Mutex<File>,
}

impl JsonLinesFile {
    /// Creates or opens the file, creating parent directories as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating log dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("opening log file {}", path.display()))?;
        Ok(Self {
            path,
            writer: Mutex::new(file),
        })
    }

    /// Serializes `value` as one line and flushes.
    pub fn append<T: Serialize>(&self, value: &T) -> Result<()> {
        let mut writer = self.writer.lock();
        serde_json::to_writer(&mut *writer, value)?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        Ok(())
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for JsonLinesFile {
    fn accept(&self, entry: &LogEntry) -> Result<()> {
        self.append(entry)
    }
}

/// Reads every non-blank line of a JSON-lines file. A missing file is empty.
pub fn read_json_lines<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut values = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let value = serde_json::from_str(&line)
            .with_context(|| format!("decoding line {} of {}", idx + 1, path.display()))?;
        values.push(value);
    }
    Ok(values)
}

/// Replays a persisted event log.
#[derive(Debug, Clone)]
pub struct LogHistory {
    path: PathBuf,
}

impl LogHistory {
    /// Creates a reader for the given JSON-lines file.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Full history in emission order.
    pub fn all(&self) -> Result<Vec<LogEntry>> {
        read_json_lines(&self.path)
    }

    /// The latest `limit` entries, oldest first.
    pub fn tail(&self, limit: usize) -> Result<Vec<LogEntry>> {
        let mut entries = self.all()?;
        if entries.len() > limit {
            entries.drain(0..entries.len() - limit);
        }
        Ok(entries)
    }

    /// Entries emitted at or after `since`.
    pub fn since(&self, since: DateTime<Utc>) -> Result<Vec<LogEntry>> {
        Ok(self
            .all()?
            .into_iter()
            .filter(|entry| entry.timestamp >= since)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::LogKind;
    use tempfile::tempdir;

    fn entry(sequence: u64, message: &str) -> LogEntry {
        LogEntry {
            sequence,
            timestamp: Utc::now(),
            kind: LogKind::Info,
            message: message.into(),
        }
    }

    #[test]
    fn file_sink_round_trips_through_history() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested/log.jsonl");
        let sink = JsonLinesFile::open(&path).unwrap();
        sink.accept(&entry(1, "first")).unwrap();
        sink.accept(&entry(2, "second")).unwrap();
        sink.accept(&entry(3, "third")).unwrap();

        let history = LogHistory::new(&path);
        assert_eq!(history.all().unwrap().len(), 3);
        let tail = history.tail(2).unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].message, "second");
        assert_eq!(tail[1].message, "third");
    }

    #[test]
    fn missing_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let history = LogHistory::new(dir.path().join("absent.jsonl"));
        assert!(history.all().unwrap().is_empty());
    }

    #[test]
    fn blank_lines_are_skipped() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let line = serde_json::to_string(&entry(1, "only")).unwrap();
        fs::write(&path, format!("\n{line}\n   \n")).unwrap();
        let entries: Vec<LogEntry> = read_json_lines(&path).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn since_filters_by_timestamp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.jsonl");
        let sink = JsonLinesFile::open(&path).unwrap();
        let mut early = entry(1, "early");
        early.timestamp = Utc::now() - chrono::Duration::minutes(5);
        sink.accept(&early).unwrap();
        let boundary = Utc::now() - chrono::Duration::minutes(1);
        sink.accept(&entry(2, "late")).unwrap();
        let recent = LogHistory::new(&path).since(boundary).unwrap();
        assert_eq!(recent.len(), 1);
        assert_eq!(recent[0].message, "late");
    }
}
