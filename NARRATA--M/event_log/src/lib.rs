#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Append-only operator event log.
//!
//! Entries are kept in arrival order, fanned out to live subscribers over a
//! broadcast channel and mirrored to any attached [`LogSink`].

mod entry;
mod sink;

use std::{fmt, sync::Arc};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::broadcast;

pub use entry::{LogEntry, LogKind};
pub use sink::{read_json_lines, JsonLinesFile, LogHistory, LogSink};

const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Shared, append-only log. Cloning shares the same underlying history.
#[derive(Clone)]
pub struct EventLog {
    entries: Arc<RwLock<Vec<LogEntry>>>,
    sinks: Arc<RwLock<Vec<Arc<dyn LogSink>>>>,
    sender: broadcast::Sender<LogEntry>,
}

impl EventLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::with_channel_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Creates an empty log whose live channel buffers `capacity` entries per
    /// subscriber before lagging.
    #[must_use]
    pub fn with_channel_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            sinks: Arc::new(RwLock::new(Vec::new())),
            sender,
        }
    }

    /// Attaches a sink and returns self for chaining.
    #[must_use]
    pub fn with_sink(self, sink: Arc<dyn LogSink>) -> Self {
        self.add_sink(sink);
        self
    }

    /// Attaches a sink after construction. Only later entries reach it.
    pub fn add_sink(&self, sink: Arc<dyn LogSink>) {
        self.sinks.write().push(sink);
    }

    /// Appends an entry and returns the stored copy.
    pub fn append(&self, kind: LogKind, message: impl Into<String>) -> LogEntry {
        self.append_at(Utc::now(), kind, message.into())
    }

    fn append_at(&self, now: DateTime<Utc>, kind: LogKind, message: String) -> LogEntry {
        // The write lock is held through fan-out so sinks observe arrival order.
        let mut entries = self.entries.write();
        let timestamp = entries.last().map_or(now, |last| last.timestamp.max(now));
        let entry = LogEntry {
            sequence: entries.len() as u64 + 1,
            timestamp,
            kind,
            message,
        };
        entries.push(entry.clone());
        for sink in self.sinks.read().iter() {
            if let Err(err) = sink.accept(&entry) {
                eprintln!("event log sink failed: {err:?}");
            }
        }
        let _ = self.sender.send(entry.clone());
        entry
    }

    /// Appends an [`LogKind::Info`] entry.
    pub fn info(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogKind::Info, message)
    }

    /// Appends a [`LogKind::Success`] entry.
    pub fn success(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogKind::Success, message)
    }

    /// Appends a [`LogKind::Error`] entry.
    pub fn error(&self, message: impl Into<String>) -> LogEntry {
        self.append(LogKind::Error, message)
    }

    /// Full history in arrival order.
    #[must_use]
    pub fn history(&self) -> Vec<LogEntry> {
        self.entries.read().clone()
    }

    /// Entries with a sequence number greater than `sequence`.
    #[must_use]
    pub fn after(&self, sequence: u64) -> Vec<LogEntry> {
        let entries = self.entries.read();
        let start = usize::try_from(sequence).unwrap_or(usize::MAX).min(entries.len());
        entries[start..].to_vec()
    }

    /// Most recent entry, if any.
    #[must_use]
    pub fn last(&self) -> Option<LogEntry> {
        self.entries.read().last().cloned()
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing was logged yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Follows entries appended from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<LogEntry> {
        self.sender.subscribe()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLog")
            .field("entries", &self.len())
            .field("sinks", &self.sinks.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use parking_lot::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl LogSink for Collect {
        fn accept(&self, entry: &LogEntry) -> anyhow::Result<()> {
            self.0.lock().push(entry.message.clone());
            Ok(())
        }
    }

    struct Failing;

    impl LogSink for Failing {
        fn accept(&self, _entry: &LogEntry) -> anyhow::Result<()> {
            anyhow::bail!("disk full")
        }
    }

    #[test]
    fn preserves_arrival_order_and_sequence() {
        let log = EventLog::new();
        log.info("one");
        log.success("two");
        log.error("three");
        let history = log.history();
        assert_eq!(history.len(), 3);
        assert_eq!(
            history.iter().map(|e| e.sequence).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
        assert_eq!(history[1].kind, LogKind::Success);
        assert!(history.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn timestamps_hold_when_the_clock_steps_back() {
        let log = EventLog::new();
        let start = Utc::now();
        log.append_at(start, LogKind::Info, "first".into());
        let second = log.append_at(start - Duration::seconds(30), LogKind::Info, "second".into());
        assert_eq!(second.timestamp, start);

        let later = start + Duration::seconds(5);
        let third = log.append_at(later, LogKind::Success, "third".into());
        assert_eq!(third.timestamp, later);
        assert_eq!(third.sequence, 3);
    }

    #[test]
    fn clones_share_history() {
        let log = EventLog::new();
        let other = log.clone();
        other.info("shared");
        assert_eq!(log.len(), 1);
        assert_eq!(log.last().unwrap().message, "shared");
    }

    #[test]
    fn after_returns_suffix() {
        let log = EventLog::new();
        log.info("a");
        log.info("b");
        log.info("c");
        let rest = log.after(1);
        assert_eq!(rest.len(), 2);
        assert_eq!(rest[0].message, "b");
        assert!(log.after(10).is_empty());
    }

    #[test]
    fn sinks_receive_entries_and_failures_do_not_propagate() {
        let collect = Arc::new(Collect::default());
        let log = EventLog::new()
            .with_sink(Arc::new(Failing))
            .with_sink(collect.clone());
        log.info("kept");
        assert_eq!(log.len(), 1);
        assert_eq!(*collect.0.lock(), vec!["kept".to_string()]);
    }

    #[test]
    fn file_sink_mirrors_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        let log = EventLog::new().with_sink(Arc::new(JsonLinesFile::open(&path).unwrap()));
        log.info("persisted");
        let replay = LogHistory::new(&path).all().unwrap();
        assert_eq!(replay, log.history());
    }

    #[tokio::test]
    async fn subscribers_follow_new_entries() {
        let log = EventLog::new();
        log.info("before");
        let mut rx = log.subscribe();
        log.success("after");
        let received = rx.recv().await.unwrap();
        assert_eq!(received.message, "after");
        assert_eq!(received.sequence, 2);
    }
}
