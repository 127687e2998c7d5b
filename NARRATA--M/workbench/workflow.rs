//! Workflow controller: upload → train → test/classify → export.
//!
//! The controller owns the current datasets, model set and results. Train,
//! batch test and classify are mutually exclusive; a second invocation while
//! one is outstanding fails fast with [`WorkbenchError::Busy`]. Uploads and
//! exports wait for the in-flight action to finish so their log entries never
//! interleave with its steps. In-flight adapter work cannot be cancelled;
//! dropping the returned future only releases the busy marker.

use std::{fmt, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use indexmap::IndexMap;
use narrata_event_log::EventLog;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    classifier::{ClassifierAdapter, ModelHandle, Prediction},
    config::WorkbenchConfig,
    dataset::{Dataset, DatasetRole},
    error::{ClassifierError, ExportError, Precondition, SchemaError, WorkbenchError, WorkbenchResult},
    evaluation::{evaluate, Evaluation},
    export::export_table,
    telemetry::{TelemetryLevel, WorkbenchTelemetry},
};

const TELEMETRY_MODULE: &str = "workflow";
const PREPARATION_STEPS: [&str; 3] = [
    "Preprocessing text data...",
    "Tokenizing narratives...",
    "Extracting features...",
];

/// Long-running action that occupies the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activity {
    /// Training every registered variant.
    Training,
    /// Batch evaluation against the test dataset.
    Testing,
    /// Classifying one ad-hoc text.
    Classifying,
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Training => "training",
            Self::Testing => "batch testing",
            Self::Classifying => "classification",
        })
    }
}

/// Externally visible controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkflowState {
    /// Nothing trained and no training data.
    Idle,
    /// Training data present, not trained yet.
    DataLoaded,
    /// Training in flight.
    Training,
    /// Models trained, no current test results.
    Trained,
    /// Batch test in flight.
    Testing,
    /// Results of the latest batch test are available.
    Tested,
    /// Single classification in flight.
    Classifying,
}

/// Model handles from one training run, keyed by variant in registration order.
#[derive(Debug, Clone)]
pub struct ModelSet {
    id: Uuid,
    trained_at: DateTime<Utc>,
    training_dataset: Uuid,
    handles: IndexMap<String, ModelHandle>,
}

impl ModelSet {
    /// Training run id.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Completion time of the run.
    #[must_use]
    pub const fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Dataset the run trained on.
    #[must_use]
    pub const fn training_dataset(&self) -> Uuid {
        self.training_dataset
    }

    /// Handle for `variant`.
    #[must_use]
    pub fn handle(&self, variant: &str) -> Option<&ModelHandle> {
        self.handles.get(variant)
    }

    /// All handles in registration order.
    pub fn handles(&self) -> impl Iterator<Item = &ModelHandle> {
        self.handles.values()
    }
}

/// Outcome of one batch test.
#[derive(Debug, Clone)]
pub struct TestRun {
    /// Run id.
    pub id: Uuid,
    /// Completion time.
    pub completed_at: DateTime<Utc>,
    /// Test dataset that was scored.
    pub test_dataset: Uuid,
    /// Model set that produced the predictions.
    pub model_set: Uuid,
    /// Rows and accuracy, derived together.
    pub evaluation: Evaluation,
}

/// Result of classifying one ad-hoc text.
#[derive(Debug, Clone)]
pub struct ClassificationOutcome {
    /// Input as given.
    pub text: String,
    /// One prediction per variant in registration order.
    pub predictions: Vec<Prediction>,
    /// Completion time.
    pub classified_at: DateTime<Utc>,
}

impl ClassificationOutcome {
    /// Prediction of `variant`.
    #[must_use]
    pub fn prediction(&self, variant: &str) -> Option<&Prediction> {
        self.predictions.iter().find(|p| p.variant == variant)
    }
}

/// Immutable view of the controller taken between actions.
#[derive(Debug, Clone)]
pub struct SessionSnapshot {
    /// State at snapshot time.
    pub state: WorkflowState,
    /// Current training dataset.
    pub training: Option<Arc<Dataset>>,
    /// Current test dataset.
    pub test: Option<Arc<Dataset>>,
    /// Current model set.
    pub models: Option<Arc<ModelSet>>,
    /// Latest batch test.
    pub last_run: Option<Arc<TestRun>>,
    /// Latest single classification.
    pub last_classification: Option<Arc<ClassificationOutcome>>,
}

#[derive(Debug, Clone, Default)]
enum Phase {
    #[default]
    Untrained,
    Trained {
        models: Arc<ModelSet>,
    },
    Tested {
        models: Arc<ModelSet>,
        run: Arc<TestRun>,
    },
}

impl Phase {
    fn models(&self) -> Option<&Arc<ModelSet>> {
        match self {
            Self::Untrained => None,
            Self::Trained { models } | Self::Tested { models, .. } => Some(models),
        }
    }

    fn run(&self) -> Option<&Arc<TestRun>> {
        match self {
            Self::Tested { run, .. } => Some(run),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Session {
    training: Option<Arc<Dataset>>,
    test: Option<Arc<Dataset>>,
    phase: Phase,
    last_classification: Option<Arc<ClassificationOutcome>>,
    in_flight: Option<Activity>,
}

impl Session {
    const fn state(&self) -> WorkflowState {
        match (self.in_flight, &self.phase) {
            (Some(Activity::Training), _) => WorkflowState::Training,
            (Some(Activity::Testing), _) => WorkflowState::Testing,
            (Some(Activity::Classifying), _) => WorkflowState::Classifying,
            (None, Phase::Tested { .. }) => WorkflowState::Tested,
            (None, Phase::Trained { .. }) => WorkflowState::Trained,
            (None, Phase::Untrained) if self.training.is_some() => WorkflowState::DataLoaded,
            (None, Phase::Untrained) => WorkflowState::Idle,
        }
    }
}

/// Clears the in-flight marker when the action ends, however it ends.
struct InFlight<'a> {
    session: &'a Mutex<Session>,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.session.lock().in_flight = None;
    }
}

/// Owns the workbench session and sequences every action on it.
pub struct WorkflowController {
    config: WorkbenchConfig,
    adapters: IndexMap<String, Arc<dyn ClassifierAdapter>>,
    session: Mutex<Session>,
    order: tokio::sync::Mutex<()>,
    log: EventLog,
    telemetry: WorkbenchTelemetry,
}

impl WorkflowController {
    /// Creates a controller with no adapters, a fresh log and no telemetry.
    ///
    /// Fails when `config` does not pass [`WorkbenchConfig::validate`].
    pub fn new(config: WorkbenchConfig) -> anyhow::Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            adapters: IndexMap::new(),
            session: Mutex::new(Session::default()),
            order: tokio::sync::Mutex::new(()),
            log: EventLog::new(),
            telemetry: WorkbenchTelemetry::disabled(),
        })
    }

    /// Registers an adapter; a later adapter with the same variant replaces the earlier one.
    #[must_use]
    pub fn with_adapter(mut self, adapter: Arc<dyn ClassifierAdapter>) -> Self {
        self.adapters.insert(adapter.variant().to_owned(), adapter);
        self
    }

    /// Uses `log` (for example one with file sinks attached).
    #[must_use]
    pub fn with_log(mut self, log: EventLog) -> Self {
        self.log = log;
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: WorkbenchTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &WorkbenchConfig {
        &self.config
    }

    /// Operator log.
    #[must_use]
    pub const fn log(&self) -> &EventLog {
        &self.log
    }

    /// Registered variants in registration order.
    pub fn variants(&self) -> impl Iterator<Item = &str> {
        self.adapters.keys().map(String::as_str)
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> WorkflowState {
        self.session.lock().state()
    }

    /// Consistent view of everything the session holds.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        let session = self.session.lock();
        SessionSnapshot {
            state: session.state(),
            training: session.training.clone(),
            test: session.test.clone(),
            models: session.phase.models().cloned(),
            last_run: session.phase.run().cloned(),
            last_classification: session.last_classification.clone(),
        }
    }

    /// Latest batch test, if the controller is in the tested phase.
    #[must_use]
    pub fn latest_run(&self) -> Option<Arc<TestRun>> {
        self.session.lock().phase.run().cloned()
    }

    /// Parses and stores a training or test upload. Never retrains.
    pub async fn upload(&self, role: DatasetRole, text: &str) -> WorkbenchResult<Arc<Dataset>> {
        let parsed = Dataset::parse(text, role, &self.config);
        let _order = self.order.lock().await;
        let dataset = match parsed {
            Ok(dataset) => Arc::new(dataset),
            Err(err) => {
                let message = match &err {
                    SchemaError::MissingColumn { .. } => format!(
                        "Error: {role} file must contain '{}' and '{}' columns",
                        self.config.narrative_column, self.config.label_column
                    ),
                    SchemaError::MalformedRow { .. } => {
                        format!("Error loading {role} data: {err}")
                    }
                };
                return Err(self.reject(err.into(), &message));
            }
        };
        {
            let mut session = self.session.lock();
            match role {
                DatasetRole::Training => session.training = Some(Arc::clone(&dataset)),
                DatasetRole::Test => session.test = Some(Arc::clone(&dataset)),
            }
        }
        self.log.success(format!("{role} data loaded: {} records", dataset.len()));
        self.record(
            TelemetryLevel::Info,
            "workflow.upload.completed",
            json!({ "role": role, "records": dataset.len(), "dataset": dataset.id() }),
        );
        Ok(dataset)
    }

    /// Uploads training data.
    pub async fn upload_training(&self, text: &str) -> WorkbenchResult<Arc<Dataset>> {
        self.upload(DatasetRole::Training, text).await
    }

    /// Uploads test data.
    pub async fn upload_test(&self, text: &str) -> WorkbenchResult<Arc<Dataset>> {
        self.upload(DatasetRole::Test, text).await
    }

    /// Trains every adapter on the current training data, replacing any earlier model set.
    pub async fn train(&self) -> WorkbenchResult<Arc<ModelSet>> {
        let _in_flight = self.begin(Activity::Training)?;
        let _order = self.order.lock().await;

        let training = self.session.lock().training.clone();
        let Some(training) = training else {
            return Err(self.fail(Precondition::TrainingDataMissing.into()));
        };
        if self.adapters.is_empty() {
            return Err(self.fail(Precondition::NoClassifiers.into()));
        }

        self.log.info("Starting model training...");
        for step in PREPARATION_STEPS {
            self.log.info(step);
            self.pause().await;
        }

        let mut handles = IndexMap::with_capacity(self.adapters.len());
        for (variant, adapter) in &self.adapters {
            self.log.info(format!("Training {variant} model..."));
            let handle = adapter
                .train(&training)
                .await
                .map_err(|err| self.fail(WorkbenchError::Training(err)))?;
            handles.insert(variant.clone(), handle);
            self.pause().await;
        }

        self.log.info("Validating models...");
        if let Some((variant, _)) = handles
            .iter()
            .find(|(variant, handle)| !handle.is_trained() || handle.variant() != variant.as_str())
        {
            let err = ClassifierError::new(variant, "adapter returned an unusable model handle");
            return Err(self.fail(WorkbenchError::Training(err)));
        }
        self.pause().await;

        let models = Arc::new(ModelSet {
            id: Uuid::new_v4(),
            trained_at: Utc::now(),
            training_dataset: training.id(),
            handles,
        });
        self.session.lock().phase = Phase::Trained {
            models: Arc::clone(&models),
        };
        self.log.success("Models trained successfully!");
        self.record(
            TelemetryLevel::Info,
            "workflow.train.completed",
            json!({
                "model_set": models.id(),
                "records": training.len(),
                "variants": self.variants().collect::<Vec<_>>(),
            }),
        );
        Ok(models)
    }

    /// Scores every adapter against the current test data and replaces the previous results.
    pub async fn batch_test(&self) -> WorkbenchResult<Arc<TestRun>> {
        let _in_flight = self.begin(Activity::Testing)?;
        let _order = self.order.lock().await;

        let (models, test) = {
            let session = self.session.lock();
            (session.phase.models().cloned(), session.test.clone())
        };
        let Some(models) = models else {
            return Err(self.fail(Precondition::ModelsNotTrained.into()));
        };
        let Some(test) = test else {
            return Err(self.fail(Precondition::TestDataMissing.into()));
        };

        self.log.info("Starting classification testing...");
        let jobs = self.adapters.iter().map(|(variant, adapter)| {
            let handle = models.handle(variant).cloned();
            let adapter = Arc::clone(adapter);
            let dataset = Arc::clone(&test);
            let variant = variant.clone();
            async move {
                let handle = handle
                    .ok_or_else(|| ClassifierError::new(&variant, "no trained model for variant"))?;
                let predictions = adapter.predict_batch(&handle, &dataset).await?;
                if predictions.len() != dataset.len() {
                    return Err(ClassifierError::new(
                        &variant,
                        format!(
                            "returned {} predictions for {} records",
                            predictions.len(),
                            dataset.len()
                        ),
                    ));
                }
                Ok::<_, ClassifierError>((variant, predictions))
            }
        });
        let predictions: IndexMap<String, Vec<Prediction>> = try_join_all(jobs)
            .await
            .map_err(|err| self.fail(WorkbenchError::Inference(err)))?
            .into_iter()
            .collect();

        let evaluation = evaluate(&test, &predictions);
        let run = Arc::new(TestRun {
            id: Uuid::new_v4(),
            completed_at: Utc::now(),
            test_dataset: test.id(),
            model_set: models.id(),
            evaluation,
        });
        self.session.lock().phase = Phase::Tested {
            models,
            run: Arc::clone(&run),
        };
        let accuracy = run.evaluation.accuracy();
        self.log.success(format!("Testing completed. {accuracy}"));
        self.record(
            TelemetryLevel::Info,
            "workflow.test.completed",
            json!({
                "run": run.id,
                "records": run.evaluation.len(),
                "accuracy": accuracy,
            }),
        );
        Ok(run)
    }

    /// Classifies one text with every trained variant.
    pub async fn classify(&self, text: &str) -> WorkbenchResult<Arc<ClassificationOutcome>> {
        let _in_flight = self.begin(Activity::Classifying)?;
        let _order = self.order.lock().await;

        let models = self.session.lock().phase.models().cloned();
        let Some(models) = models else {
            return Err(self.fail(Precondition::ModelsNotTrained.into()));
        };
        if text.trim().is_empty() {
            return Err(self.fail(Precondition::EmptyText.into()));
        }

        self.log.info("Classifying text...");
        let jobs = self.adapters.iter().map(|(variant, adapter)| {
            let handle = models.handle(variant).cloned();
            let adapter = Arc::clone(adapter);
            let variant = variant.clone();
            async move {
                let handle = handle
                    .ok_or_else(|| ClassifierError::new(&variant, "no trained model for variant"))?;
                let score = adapter.predict(&handle, text).await?;
                Ok::<_, ClassifierError>(Prediction::for_text(variant, score))
            }
        });
        let predictions = try_join_all(jobs)
            .await
            .map_err(|err| self.fail(WorkbenchError::Inference(err)))?;

        let outcome = Arc::new(ClassificationOutcome {
            text: text.to_owned(),
            predictions,
            classified_at: Utc::now(),
        });
        self.session.lock().last_classification = Some(Arc::clone(&outcome));
        self.log.success("Text classified successfully");
        self.record(
            TelemetryLevel::Info,
            "workflow.classify.completed",
            json!({ "predictions": outcome.predictions }),
        );
        Ok(outcome)
    }

    /// Serializes the latest results for an external save target.
    pub async fn export(&self) -> WorkbenchResult<Vec<u8>> {
        let _order = self.order.lock().await;
        let run = self.latest_run();
        let bytes = run
            .as_ref()
            .map_or(Err(ExportError::NoResults), |run| {
                export_table(&run.evaluation, &self.config)
            })
            .map_err(|err| self.fail(err.into()))?;
        self.log.success("Results exported successfully");
        self.record(
            TelemetryLevel::Info,
            "workflow.export.completed",
            json!({ "bytes": bytes.len() }),
        );
        Ok(bytes)
    }

    fn begin(&self, activity: Activity) -> WorkbenchResult<InFlight<'_>> {
        let mut session = self.session.lock();
        if let Some(current) = session.in_flight {
            drop(session);
            return Err(self.fail(WorkbenchError::Busy(current)));
        }
        session.in_flight = Some(activity);
        Ok(InFlight {
            session: &self.session,
        })
    }

    fn fail(&self, err: WorkbenchError) -> WorkbenchError {
        let message = err.to_string();
        self.reject(err, &message)
    }

    fn reject(&self, err: WorkbenchError, message: &str) -> WorkbenchError {
        self.log.error(message);
        self.record(
            TelemetryLevel::Error,
            "workflow.action.failed",
            json!({ "error": message }),
        );
        err
    }

    fn record(&self, level: TelemetryLevel, message: &str, metadata: Value) {
        if let Err(err) = self
            .telemetry
            .record(TELEMETRY_MODULE, level, message, metadata)
        {
            eprintln!("telemetry write failed: {err:?}");
        }
    }

    async fn pause(&self) {
        if self.config.progress_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.progress_delay_ms)).await;
        }
    }
}

impl fmt::Debug for WorkflowController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowController")
            .field("variants", &self.adapters.keys().collect::<Vec<_>>())
            .field("state", &self.state())
            .field("log", &self.log)
            .finish_non_exhaustive()
    }
}
