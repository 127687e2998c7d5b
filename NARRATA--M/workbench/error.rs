use thiserror::Error;

use crate::workflow::Activity;

/// The upload did not have the required table shape.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    /// Header lacks the narrative or label column.
    #[error("missing required column")]
    MissingColumn {
        /// Columns that were required but absent.
        missing: Vec<String>,
    },
    /// A row could not be decoded (for example an unterminated quote).
    #[error("malformed row {line}: {reason}")]
    MalformedRow {
        /// 1-based line number in the source text.
        line: u64,
        /// Decoder message.
        reason: String,
    },
}

/// Failure reported by a classifier adapter.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{variant}: {message}")]
pub struct ClassifierError {
    /// Variant that failed.
    pub variant: String,
    /// Adapter-supplied detail.
    pub message: String,
}

impl ClassifierError {
    /// Creates an error tagged with the failing variant.
    #[must_use]
    pub fn new(variant: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            variant: variant.into(),
            message: message.into(),
        }
    }
}

/// Export was requested with nothing to write.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExportError {
    /// No evaluation rows exist.
    #[error("No results to export")]
    NoResults,
    /// The table writer failed.
    #[error("write failed: {0}")]
    Write(String),
}

/// Every way a workbench action can fail. Display strings are operator-facing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WorkbenchError {
    /// Malformed or incomplete upload.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A required earlier step has not happened.
    #[error("{0}")]
    Precondition(Precondition),
    /// Another train/test/classify action is in flight.
    #[error("Busy: {0} is still in progress")]
    Busy(Activity),
    /// Nothing to export.
    #[error(transparent)]
    Export(ExportError),
    /// Adapter training failed.
    #[error("Training failed for {0}")]
    Training(ClassifierError),
    /// Adapter inference failed.
    #[error("Classification failed for {0}")]
    Inference(ClassifierError),
}

impl From<ExportError> for WorkbenchError {
    fn from(err: ExportError) -> Self {
        Self::Export(err)
    }
}

/// Missing prerequisites, one per guard in the workflow.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum Precondition {
    /// Train without a training dataset.
    #[error("Please upload training data first")]
    TrainingDataMissing,
    /// Test or classify before training.
    #[error("Please train the models first")]
    ModelsNotTrained,
    /// Test without a test dataset.
    #[error("Please upload test data first")]
    TestDataMissing,
    /// Classify with blank input.
    #[error("Please enter text to classify")]
    EmptyText,
    /// Controller built without adapters.
    #[error("No classifier variants registered")]
    NoClassifiers,
}

impl From<Precondition> for WorkbenchError {
    fn from(precondition: Precondition) -> Self {
        Self::Precondition(precondition)
    }
}

/// Result alias used by workflow actions.
pub type WorkbenchResult<T> = Result<T, WorkbenchError>;
