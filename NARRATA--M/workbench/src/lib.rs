#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Narrata workbench core: delimited-text ingestion, pluggable classifier
//! variants, accuracy evaluation, result export and the workflow controller
//! that sequences them behind an operator log.

/// Workbench configuration and environment overrides.
#[path = "../config.rs"]
pub mod config;

/// Error taxonomy shared by every workbench action.
#[path = "../error.rs"]
pub mod error;

/// Delimited-text parsing into labeled datasets.
#[path = "../dataset.rs"]
pub mod dataset;

/// Classifier capability plus the bundled reference variants.
#[path = "../classifier/main.rs"]
pub mod classifier;

/// Accuracy computation and per-record comparison.
#[path = "../evaluation.rs"]
pub mod evaluation;

/// Tabular export of evaluation results.
#[path = "../export.rs"]
pub mod export;

/// Structured JSON-lines telemetry.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Workflow state machine.
#[path = "../workflow.rs"]
pub mod workflow;

pub use classifier::{
    ClassifierAdapter, LabelScore, MajorityClassifier, ModelHandle, NaiveBayesClassifier,
    Prediction,
};
pub use config::WorkbenchConfig;
pub use dataset::{Dataset, DatasetRole, Record, RecordId};
pub use error::{
    ClassifierError, ExportError, Precondition, SchemaError, WorkbenchError, WorkbenchResult,
};
pub use evaluation::{evaluate, Accuracy, AccuracySummary, Evaluation, EvaluationRow};
pub use export::{export_table, write_export, DEFAULT_EXPORT_FILE};
pub use narrata_event_log::{EventLog, LogEntry, LogKind};
pub use telemetry::{TelemetryLevel, WorkbenchTelemetry};
pub use workflow::{
    Activity, ClassificationOutcome, ModelSet, SessionSnapshot, TestRun, WorkflowController,
    WorkflowState,
};
