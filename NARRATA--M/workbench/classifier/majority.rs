use async_trait::async_trait;

use super::{ClassifierAdapter, LabelScore, ModelHandle};
use crate::{dataset::Dataset, error::ClassifierError};

const VARIANT: &str = "majority";

#[derive(Debug, Clone, PartialEq)]
struct MajorityModel {
    label: String,
    share: f64,
}

/// Always predicts the most frequent training label.
#[derive(Debug, Clone, Default)]
pub struct MajorityClassifier;

impl MajorityClassifier {
    /// Creates the adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ClassifierAdapter for MajorityClassifier {
    fn variant(&self) -> &str {
        VARIANT
    }

    fn description(&self) -> &str {
        "Most frequent training label"
    }

    async fn train(&self, dataset: &Dataset) -> Result<ModelHandle, ClassifierError> {
        let distribution = dataset.label_distribution();
        let total: usize = distribution.values().sum();
        // Strict comparison keeps the first-seen label on ties.
        let best = distribution
            .iter()
            .fold(None::<(&String, usize)>, |best, (label, &count)| match best {
                Some((_, top)) if top >= count => best,
                _ => Some((label, count)),
            });
        let Some((label, count)) = best else {
            return Err(ClassifierError::new(VARIANT, "training data has no labels"));
        };
        #[allow(clippy::cast_precision_loss)]
        let share = count as f64 / total as f64;
        Ok(ModelHandle::trained(
            VARIANT,
            MajorityModel {
                label: label.clone(),
                share,
            },
        ))
    }

    async fn predict(
        &self,
        model: &ModelHandle,
        _text: &str,
    ) -> Result<LabelScore, ClassifierError> {
        let model = model.usable_state::<MajorityModel>(VARIANT)?;
        Ok(LabelScore::new(model.label.clone(), model.share))
    }
}
