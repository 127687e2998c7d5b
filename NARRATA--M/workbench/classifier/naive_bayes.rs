use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use indexmap::IndexMap;

use super::{tokenize, ClassifierAdapter, LabelScore, ModelHandle};
use crate::{dataset::Dataset, error::ClassifierError};

const VARIANT: &str = "naive-bayes";

#[derive(Debug, Default)]
struct ClassStats {
    documents: usize,
    tokens: usize,
    counts: HashMap<String, usize>,
}

#[derive(Debug)]
struct NaiveBayesModel {
    classes: IndexMap<String, ClassStats>,
    vocabulary: HashSet<String>,
    documents: usize,
}

impl NaiveBayesModel {
    #[allow(clippy::cast_precision_loss)]
    fn score(&self, text: &str) -> Option<LabelScore> {
        let tokens: Vec<String> = tokenize(text)
            .into_iter()
            .filter(|token| self.vocabulary.contains(token))
            .collect();
        let vocabulary = self.vocabulary.len() as f64;

        let log_scores: Vec<(&String, f64)> = self
            .classes
            .iter()
            .map(|(label, stats)| {
                let prior = (stats.documents as f64 / self.documents as f64).ln();
                let denominator = stats.tokens as f64 + vocabulary;
                let likelihood: f64 = tokens
                    .iter()
                    .map(|token| {
                        let count = stats.counts.get(token).copied().unwrap_or(0) as f64;
                        ((count + 1.0) / denominator).ln()
                    })
                    .sum();
                (label, prior + likelihood)
            })
            .collect();

        let (best_label, best_score) = log_scores
            .iter()
            .fold(None::<(&String, f64)>, |best, &(label, score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((label, score)),
            })?;
        let normaliser: f64 = log_scores
            .iter()
            .map(|(_, score)| (score - best_score).exp())
            .sum();
        Some(LabelScore::new(best_label.clone(), 1.0 / normaliser))
    }
}

/// Multinomial naive Bayes over word tokens with add-one smoothing.
#[derive(Debug, Clone, Default)]
pub struct NaiveBayesClassifier;

impl NaiveBayesClassifier {
    /// Creates the adapter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ClassifierAdapter for NaiveBayesClassifier {
    fn variant(&self) -> &str {
        VARIANT
    }

    fn description(&self) -> &str {
        "Multinomial naive Bayes on word tokens"
    }

    async fn train(&self, dataset: &Dataset) -> Result<ModelHandle, ClassifierError> {
        let mut classes: IndexMap<String, ClassStats> = IndexMap::new();
        let mut vocabulary = HashSet::new();
        let mut documents = 0;
        for record in dataset.records() {
            let Some(label) = &record.label else {
                continue;
            };
            documents += 1;
            let stats = classes.entry(label.clone()).or_default();
            stats.documents += 1;
            for token in tokenize(&record.text) {
                stats.tokens += 1;
                *stats.counts.entry(token.clone()).or_insert(0) += 1;
                vocabulary.insert(token);
            }
        }
        if documents == 0 {
            return Err(ClassifierError::new(VARIANT, "training data has no labels"));
        }
        Ok(ModelHandle::trained(
            VARIANT,
            NaiveBayesModel {
                classes,
                vocabulary,
                documents,
            },
        ))
    }

    async fn predict(
        &self,
        model: &ModelHandle,
        text: &str,
    ) -> Result<LabelScore, ClassifierError> {
        model
            .usable_state::<NaiveBayesModel>(VARIANT)?
            .score(text)
            .ok_or_else(|| ClassifierError::new(VARIANT, "model has no classes"))
    }
}
