use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Category of an operator-facing log entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    /// Progress or neutral information.
    Info,
    /// An action finished successfully.
    Success,
    /// An action failed.
    Error,
}

impl LogKind {
    /// Returns the lowercase label used on the wire and in consoles.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One immutable line of the event log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    /// 1-based position in arrival order.
    pub sequence: u64,
    /// Emission time; never earlier than the previous entry.
    pub timestamp: DateTime<Utc>,
    /// Entry category.
    pub kind: LogKind,
    /// Human-readable message.
    pub message: String,
}

impl LogEntry {
    /// Renders the entry the way operator consoles show it.
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "[{}] {:<7} {}",
            self.timestamp.format("%H:%M:%S"),
            self.kind.label(),
            self.message
        )
    }
}
