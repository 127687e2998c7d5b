//! Pluggable classifier capability and the reference adapters shipped with the workbench.

/// Most-frequent-label adapter.
pub mod majority;
/// Multinomial naive Bayes adapter.
pub mod naive_bayes;

use std::{any::Any, fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    dataset::{Dataset, RecordId},
    error::ClassifierError,
};

pub use majority::MajorityClassifier;
pub use naive_bayes::NaiveBayesClassifier;

/// Label chosen by a model together with its confidence in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabelScore {
    /// Predicted label.
    pub label: String,
    /// Confidence, clamped to `[0, 1]`.
    pub confidence: f64,
}

impl LabelScore {
    /// Creates a score, clamping confidence into range (NaN becomes 0).
    #[must_use]
    pub fn new(label: impl Into<String>, confidence: f64) -> Self {
        let confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        Self {
            label: label.into(),
            confidence,
        }
    }
}

/// One model output for one text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Test record the prediction belongs to; `None` for ad-hoc text.
    pub record_id: Option<RecordId>,
    /// Variant that produced it.
    pub variant: String,
    /// Predicted label.
    pub label: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
}

impl Prediction {
    /// Prediction for a dataset record.
    #[must_use]
    pub fn for_record(record_id: RecordId, variant: impl Into<String>, score: LabelScore) -> Self {
        Self {
            record_id: Some(record_id),
            variant: variant.into(),
            label: score.label,
            confidence: score.confidence,
        }
    }

    /// Prediction for free text outside any dataset.
    #[must_use]
    pub fn for_text(variant: impl Into<String>, score: LabelScore) -> Self {
        Self {
            record_id: None,
            variant: variant.into(),
            label: score.label,
            confidence: score.confidence,
        }
    }
}

/// Opaque result of one training run for one variant.
#[derive(Clone)]
pub struct ModelHandle {
    id: Uuid,
    variant: String,
    trained: bool,
    trained_at: DateTime<Utc>,
    state: Arc<dyn Any + Send + Sync>,
}

impl ModelHandle {
    /// Wraps adapter-specific model state as a usable handle.
    #[must_use]
    pub fn trained(variant: impl Into<String>, state: impl Any + Send + Sync) -> Self {
        Self {
            id: Uuid::new_v4(),
            variant: variant.into(),
            trained: true,
            trained_at: Utc::now(),
            state: Arc::new(state),
        }
    }

    /// Placeholder handle that refuses inference.
    #[must_use]
    pub fn untrained(variant: impl Into<String>) -> Self {
        Self {
            trained: false,
            ..Self::trained(variant, ())
        }
    }

    /// Unique id of the training run that produced this handle.
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Variant tag.
    #[must_use]
    pub fn variant(&self) -> &str {
        &self.variant
    }

    /// Whether inference is allowed.
    #[must_use]
    pub const fn is_trained(&self) -> bool {
        self.trained
    }

    /// When training finished.
    #[must_use]
    pub const fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Borrows the adapter state as `T`.
    #[must_use]
    pub fn state<T: Any>(&self) -> Option<&T> {
        self.state.downcast_ref()
    }

    /// Borrows the adapter state for inference, rejecting untrained or foreign handles.
    pub fn usable_state<T: Any>(&self, variant: &str) -> Result<&T, ClassifierError> {
        if !self.trained {
            return Err(ClassifierError::new(variant, "model handle is not trained"));
        }
        if self.variant != variant {
            return Err(ClassifierError::new(
                variant,
                format!("model handle belongs to {}", self.variant),
            ));
        }
        self.state()
            .ok_or_else(|| ClassifierError::new(variant, "model handle carries foreign state"))
    }
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("id", &self.id)
            .field("variant", &self.variant)
            .field("trained", &self.trained)
            .field("trained_at", &self.trained_at)
            .finish_non_exhaustive()
    }
}

/// Training and inference for one model variant.
///
/// Implementations must be deterministic for a given handle and input if the
/// evaluation built on them is to be reproducible.
#[async_trait]
pub trait ClassifierAdapter: Send + Sync {
    /// Variant name, unique within a controller (e.g. `maxent`).
    fn variant(&self) -> &str;

    /// One-line description for operator consoles.
    fn description(&self) -> &str {
        ""
    }

    /// Trains a fresh model.
    async fn train(&self, dataset: &Dataset) -> Result<ModelHandle, ClassifierError>;

    /// Classifies one text.
    async fn predict(&self, model: &ModelHandle, text: &str)
        -> Result<LabelScore, ClassifierError>;

    /// Classifies every record of `dataset`, one prediction per record in order.
    async fn predict_batch(
        &self,
        model: &ModelHandle,
        dataset: &Dataset,
    ) -> Result<Vec<Prediction>, ClassifierError> {
        let mut predictions = Vec::with_capacity(dataset.len());
        for record in dataset.records() {
            let score = self.predict(model, &record.text).await?;
            predictions.push(Prediction::for_record(record.id, self.variant(), score));
        }
        Ok(predictions)
    }
}

/// Lowercase alphanumeric tokens longer than two characters.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|token| token.chars().count() > 2)
        .map(ToOwned::to_owned)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_score_clamps_confidence() {
        assert_eq!(LabelScore::new("THEFT", 1.7).confidence, 1.0);
        assert_eq!(LabelScore::new("THEFT", -0.2).confidence, 0.0);
        assert_eq!(LabelScore::new("THEFT", f64::NAN).confidence, 0.0);
    }

    #[test]
    fn untrained_handles_refuse_inference() {
        let handle = ModelHandle::untrained("maxent");
        assert!(!handle.is_trained());
        assert!(handle.usable_state::<()>("maxent").is_err());
    }

    #[test]
    fn handles_check_variant_and_state_type() {
        let handle = ModelHandle::trained("maxent", 42_u32);
        assert_eq!(handle.usable_state::<u32>("maxent").unwrap(), &42);
        assert!(handle.usable_state::<u32>("svc").is_err());
        assert!(handle.usable_state::<String>("maxent").is_err());
    }

    #[test]
    fn each_training_run_has_its_own_identity() {
        let first = ModelHandle::trained("maxent", ());
        let second = ModelHandle::trained("maxent", ());
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn tokenize_drops_short_words_and_punctuation() {
        assert_eq!(
            tokenize("He stole a BIKE, then ran!"),
            vec!["stole", "bike", "then", "ran"]
        );
    }
}
