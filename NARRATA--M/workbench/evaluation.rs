//! Agreement between classifier outputs and ground truth.

use std::{collections::HashMap, fmt};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::{
    classifier::Prediction,
    dataset::{Dataset, RecordId},
};

/// Accuracy of one variant over a test run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accuracy {
    /// Percentage in `[0, 100]`, one decimal place.
    Percent(f64),
    /// The test set was empty.
    NoData,
}

impl Accuracy {
    /// Percentage of `correct` over `total`, rounded to one decimal.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn from_counts(correct: usize, total: usize) -> Self {
        if total == 0 {
            return Self::NoData;
        }
        let percent = 100.0 * correct as f64 / total as f64;
        Self::Percent((percent * 10.0).round() / 10.0)
    }

    /// The percentage, if there was data.
    #[must_use]
    pub const fn percent(self) -> Option<f64> {
        match self {
            Self::Percent(value) => Some(value),
            Self::NoData => None,
        }
    }
}

impl fmt::Display for Accuracy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Percent(value) => write!(f, "{value:.1}%"),
            Self::NoData => f.write_str("n/a"),
        }
    }
}

/// Per-variant accuracy in registration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracySummary {
    by_variant: IndexMap<String, Accuracy>,
}

impl AccuracySummary {
    /// Accuracy for `variant`.
    #[must_use]
    pub fn get(&self, variant: &str) -> Option<Accuracy> {
        self.by_variant.get(variant).copied()
    }

    /// Variants with their accuracy, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Accuracy)> {
        self.by_variant
            .iter()
            .map(|(variant, accuracy)| (variant.as_str(), *accuracy))
    }

    /// Number of variants.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_variant.len()
    }

    /// Whether no variant was scored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_variant.is_empty()
    }

    /// Most accurate variant; earlier registration wins ties.
    #[must_use]
    pub fn best_variant(&self) -> Option<(&str, f64)> {
        self.iter()
            .filter_map(|(variant, accuracy)| accuracy.percent().map(|value| (variant, value)))
            .fold(None, |best, (variant, value)| match best {
                Some((_, top)) if top >= value => best,
                _ => Some((variant, value)),
            })
    }
}

impl fmt::Display for AccuracySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (variant, accuracy)) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str(" | ")?;
            }
            write!(f, "{variant}: {accuracy}")?;
        }
        Ok(())
    }
}

/// Comparison of every variant's output against one test record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRow {
    /// Test record id.
    pub id: RecordId,
    /// Full narrative; exports shorten it.
    pub narrative: String,
    /// Ground truth, if the record was labeled.
    pub actual: Option<String>,
    /// Predicted label per variant; `None` when the variant skipped the record.
    pub predictions: IndexMap<String, Option<String>>,
    /// Exact, case-sensitive agreement per variant.
    pub correct: IndexMap<String, bool>,
}

/// Rows and accuracy of one test run, always derived together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    rows: Vec<EvaluationRow>,
    accuracy: AccuracySummary,
}

impl Evaluation {
    /// One row per test record in dataset order.
    #[must_use]
    pub fn rows(&self) -> &[EvaluationRow] {
        &self.rows
    }

    /// Row by record id.
    #[must_use]
    pub fn row(&self, id: RecordId) -> Option<&EvaluationRow> {
        id.checked_sub(1).and_then(|idx| self.rows.get(idx))
    }

    /// Accuracy per variant.
    #[must_use]
    pub const fn accuracy(&self) -> &AccuracySummary {
        &self.accuracy
    }

    /// Variant names in column order.
    pub fn variants(&self) -> impl Iterator<Item = &str> {
        self.accuracy.by_variant.keys().map(String::as_str)
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether there is nothing to export.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Scores `predictions` (keyed by variant) against the labels of `dataset`.
///
/// Pure: identical inputs always give identical output. Unlabeled records and
/// records a variant did not predict count as incorrect.
#[must_use]
pub fn evaluate(dataset: &Dataset, predictions: &IndexMap<String, Vec<Prediction>>) -> Evaluation {
    let lookup: IndexMap<&str, HashMap<RecordId, &str>> = predictions
        .iter()
        .map(|(variant, outputs)| {
            let by_record = outputs
                .iter()
                .filter_map(|p| p.record_id.map(|id| (id, p.label.as_str())))
                .collect();
            (variant.as_str(), by_record)
        })
        .collect();

    let mut correct_counts: IndexMap<&str, usize> =
        lookup.keys().map(|variant| (*variant, 0)).collect();
    let rows = dataset
        .records()
        .iter()
        .map(|record| {
            let mut row = EvaluationRow {
                id: record.id,
                narrative: record.text.clone(),
                actual: record.label.clone(),
                predictions: IndexMap::with_capacity(lookup.len()),
                correct: IndexMap::with_capacity(lookup.len()),
            };
            for (variant, by_record) in &lookup {
                let predicted = by_record.get(&record.id).copied();
                let is_correct = matches!(
                    (predicted, record.label.as_deref()),
                    (Some(p), Some(actual)) if p == actual
                );
                if is_correct {
                    correct_counts[*variant] += 1;
                }
                row.predictions
                    .insert((*variant).to_string(), predicted.map(ToOwned::to_owned));
                row.correct.insert((*variant).to_string(), is_correct);
            }
            row
        })
        .collect();

    let total = dataset.len();
    let accuracy = AccuracySummary {
        by_variant: correct_counts
            .into_iter()
            .map(|(variant, correct)| (variant.to_string(), Accuracy::from_counts(correct, total)))
            .collect(),
    };
    Evaluation { rows, accuracy }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{classifier::LabelScore, dataset::DatasetRole};

    fn test_set(labels: &[Option<&str>]) -> Dataset {
        Dataset::from_pairs(
            DatasetRole::Test,
            labels
                .iter()
                .enumerate()
                .map(|(idx, label)| (format!("narrative {idx}"), label.map(ToOwned::to_owned)))
                .collect(),
        )
    }

    fn outputs(variant: &str, labels: &[&str]) -> Vec<Prediction> {
        labels
            .iter()
            .enumerate()
            .map(|(idx, label)| Prediction::for_record(idx + 1, variant, LabelScore::new(*label, 0.9)))
            .collect()
    }

    #[test]
    fn seven_of_ten_is_seventy_percent() {
        let actual = ["THEFT"; 10];
        let dataset = test_set(&actual.map(Some));
        let mut predicted = ["THEFT"; 10];
        predicted[7] = "FRAUD";
        predicted[8] = "FRAUD";
        predicted[9] = "ASSAULT";
        let predictions = IndexMap::from([("A".to_string(), outputs("A", &predicted))]);

        let evaluation = evaluate(&dataset, &predictions);
        assert_eq!(evaluation.accuracy().get("A"), Some(Accuracy::Percent(70.0)));
        assert_eq!(evaluation.len(), 10);
        assert!(!evaluation.row(10).unwrap().correct["A"]);
    }

    #[test]
    fn comparison_is_case_sensitive() {
        let dataset = test_set(&[Some("THEFT")]);
        let predictions = IndexMap::from([("A".to_string(), outputs("A", &["theft"]))]);
        let evaluation = evaluate(&dataset, &predictions);
        assert!(!evaluation.rows()[0].correct["A"]);
        assert_eq!(evaluation.accuracy().get("A"), Some(Accuracy::Percent(0.0)));
    }

    #[test]
    fn empty_test_set_reports_no_data() {
        let dataset = test_set(&[]);
        let predictions = IndexMap::from([("A".to_string(), Vec::new())]);
        let evaluation = evaluate(&dataset, &predictions);
        assert!(evaluation.is_empty());
        assert_eq!(evaluation.accuracy().get("A"), Some(Accuracy::NoData));
        assert_eq!(evaluation.accuracy().to_string(), "A: n/a");
    }

    #[test]
    fn unlabeled_and_missing_predictions_are_incorrect() {
        let dataset = test_set(&[None, Some("FRAUD"), Some("THEFT")]);
        let mut partial = outputs("A", &["FRAUD", "FRAUD"]);
        partial.push(Prediction::for_text("A", LabelScore::new("THEFT", 1.0)));
        let predictions = IndexMap::from([("A".to_string(), partial)]);

        let evaluation = evaluate(&dataset, &predictions);
        let rows = evaluation.rows();
        assert!(!rows[0].correct["A"]);
        assert!(rows[1].correct["A"]);
        assert_eq!(rows[2].predictions["A"], None);
        assert!(!rows[2].correct["A"]);
        assert_eq!(evaluation.accuracy().get("A"), Some(Accuracy::Percent(33.3)));
    }

    #[test]
    fn variants_keep_registration_order_and_best_wins() {
        let dataset = test_set(&[Some("THEFT"), Some("FRAUD")]);
        let predictions = IndexMap::from([
            ("svc".to_string(), outputs("svc", &["THEFT", "THEFT"])),
            ("maxent".to_string(), outputs("maxent", &["THEFT", "FRAUD"])),
        ]);
        let evaluation = evaluate(&dataset, &predictions);
        assert_eq!(evaluation.variants().collect::<Vec<_>>(), ["svc", "maxent"]);
        assert_eq!(evaluation.accuracy().best_variant(), Some(("maxent", 100.0)));
        assert_eq!(evaluation.accuracy().to_string(), "svc: 50.0% | maxent: 100.0%");
    }

    #[test]
    fn identical_inputs_give_identical_results() {
        let dataset = test_set(&[Some("THEFT"), Some("FRAUD"), None]);
        let predictions = IndexMap::from([("A".to_string(), outputs("A", &["THEFT", "THEFT", "X"]))]);
        assert_eq!(evaluate(&dataset, &predictions), evaluate(&dataset, &predictions));
    }

    #[test]
    fn rounding_to_one_decimal() {
        assert_eq!(Accuracy::from_counts(2, 3), Accuracy::Percent(66.7));
        assert_eq!(Accuracy::from_counts(1, 8), Accuracy::Percent(12.5));
        assert_eq!(Accuracy::from_counts(0, 0), Accuracy::NoData);
    }
}
