//! Structured JSON-lines telemetry for workflow outcomes.

use std::{path::Path, sync::Arc};

use anyhow::Result;
use chrono::{DateTime, Utc};
use narrata_event_log::JsonLinesFile;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Telemetry severity.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TelemetryLevel {
    /// Fine-grained detail.
    Debug,
    /// Normal outcomes.
    Info,
    /// Recoverable oddities.
    Warn,
    /// Failed actions.
    Error,
}

/// One telemetry line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryRecord {
    /// Emission time.
    pub timestamp: DateTime<Utc>,
    /// Emitting component.
    pub module: String,
    /// Severity.
    pub level: TelemetryLevel,
    /// Event name, e.g. `workflow.test.completed`.
    pub message: String,
    /// Structured fields.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

/// Optional telemetry writer; a disabled instance drops everything.
#[derive(Debug, Clone, Default)]
pub struct WorkbenchTelemetry {
    writer: Option<Arc<JsonLinesFile>>,
}

impl WorkbenchTelemetry {
    /// Telemetry that records nothing.
    #[must_use]
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Appends records to the JSON-lines file at `path`.
    pub fn to_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            writer: Some(Arc::new(JsonLinesFile::open(path)?)),
        })
    }

    /// Whether records are written anywhere.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.writer.is_some()
    }

    /// Destination file, if enabled.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.writer.as_deref().map(JsonLinesFile::path)
    }

    /// Writes one record. Non-object metadata is stored under `data`.
    pub fn record(
        &self,
        module: &str,
        level: TelemetryLevel,
        message: &str,
        metadata: Value,
    ) -> Result<()> {
        let Some(writer) = &self.writer else {
            return Ok(());
        };
        let metadata = match metadata {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => Map::from_iter([("data".to_string(), other)]),
        };
        writer.append(&TelemetryRecord {
            timestamp: Utc::now(),
            module: module.to_owned(),
            level,
            message: message.to_owned(),
            metadata,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use narrata_event_log::read_json_lines;
    use serde_json::json;
    use tempfile::tempdir;

    #[test]
    fn disabled_telemetry_is_a_no_op() {
        let telemetry = WorkbenchTelemetry::disabled();
        assert!(!telemetry.is_enabled());
        telemetry
            .record("workflow", TelemetryLevel::Info, "noop", json!({}))
            .unwrap();
    }

    #[test]
    fn records_are_written_as_json_lines() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("telemetry.jsonl");
        let telemetry = WorkbenchTelemetry::to_file(&path).unwrap();
        telemetry
            .record(
                "workflow",
                TelemetryLevel::Info,
                "workflow.train.completed",
                json!({ "variants": ["majority"] }),
            )
            .unwrap();
        telemetry
            .record("workflow", TelemetryLevel::Error, "workflow.failed", json!("boom"))
            .unwrap();

        let records: Vec<TelemetryRecord> = read_json_lines(&path).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].metadata["variants"], json!(["majority"]));
        assert_eq!(records[1].level, TelemetryLevel::Error);
        assert_eq!(records[1].metadata["data"], json!("boom"));
        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"level\":\"ERROR\""));
    }
}
