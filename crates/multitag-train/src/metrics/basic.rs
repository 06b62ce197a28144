//! Multi-label precision, recall, and F1 over binarized predictions.

use super::MetricValue;
use crate::{TrainError, TrainResult};
use ndarray::ArrayView2;
use std::collections::BTreeMap;

/// Per-label confusion counts pooled over an epoch.
struct LabelCounts {
    true_positives: Vec<usize>,
    predicted_positives: Vec<usize>,
    actual_positives: Vec<usize>,
}

impl LabelCounts {
    fn tally(
        outputs: &ArrayView2<'_, i32>,
        targets: &ArrayView2<'_, i32>,
        target_names: &[String],
    ) -> TrainResult<Self> {
        if outputs.shape() != targets.shape() {
            return Err(TrainError::Metrics(format!(
                "shape mismatch: outputs {:?} vs targets {:?}",
                outputs.shape(),
                targets.shape()
            )));
        }
        if target_names.len() != outputs.ncols() {
            return Err(TrainError::Metrics(format!(
                "{} label names for {} label columns",
                target_names.len(),
                outputs.ncols()
            )));
        }

        let num_labels = outputs.ncols();
        let mut counts = Self {
            true_positives: vec![0; num_labels],
            predicted_positives: vec![0; num_labels],
            actual_positives: vec![0; num_labels],
        };
        for i in 0..outputs.nrows() {
            for j in 0..num_labels {
                let predicted = outputs[[i, j]] == 1;
                let actual = targets[[i, j]] == 1;
                if predicted {
                    counts.predicted_positives[j] += 1;
                }
                if actual {
                    counts.actual_positives[j] += 1;
                }
                if predicted && actual {
                    counts.true_positives[j] += 1;
                }
            }
        }
        Ok(counts)
    }

    fn num_labels(&self) -> usize {
        self.true_positives.len()
    }

    fn precision(&self, j: usize) -> f64 {
        ratio(self.true_positives[j], self.predicted_positives[j])
    }

    fn recall(&self, j: usize) -> f64 {
        ratio(self.true_positives[j], self.actual_positives[j])
    }

    fn f1(&self, j: usize) -> f64 {
        harmonic(self.precision(j), self.recall(j))
    }

    fn micro_precision(&self) -> f64 {
        ratio(
            self.true_positives.iter().sum(),
            self.predicted_positives.iter().sum(),
        )
    }

    fn micro_recall(&self) -> f64 {
        ratio(
            self.true_positives.iter().sum(),
            self.actual_positives.iter().sum(),
        )
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

fn harmonic(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

fn nested_summary(
    counts: &LabelCounts,
    target_names: &[String],
    per_label: impl Fn(&LabelCounts, usize) -> f64,
    macro_key: &str,
    micro_key: &str,
    micro: f64,
) -> MetricValue {
    let mut map = BTreeMap::new();
    let mut total = 0.0;
    for (j, name) in target_names.iter().enumerate() {
        let value = per_label(counts, j);
        total += value;
        map.insert(name.clone(), value);
    }
    // Macro average is unweighted over every label, zero-support included.
    map.insert(macro_key.to_string(), total / counts.num_labels() as f64);
    map.insert(micro_key.to_string(), micro);
    MetricValue::Nested(map)
}

/// Per-label precision plus macro/micro aggregates.
pub fn precision_summary(
    outputs: &ArrayView2<'_, i32>,
    targets: &ArrayView2<'_, i32>,
    target_names: &[String],
) -> TrainResult<MetricValue> {
    let counts = LabelCounts::tally(outputs, targets, target_names)?;
    let micro = counts.micro_precision();
    Ok(nested_summary(
        &counts,
        target_names,
        LabelCounts::precision,
        "macro_precision",
        "micro_precision",
        micro,
    ))
}

/// Per-label recall plus macro/micro aggregates.
pub fn recall_summary(
    outputs: &ArrayView2<'_, i32>,
    targets: &ArrayView2<'_, i32>,
    target_names: &[String],
) -> TrainResult<MetricValue> {
    let counts = LabelCounts::tally(outputs, targets, target_names)?;
    let micro = counts.micro_recall();
    Ok(nested_summary(
        &counts,
        target_names,
        LabelCounts::recall,
        "macro_recall",
        "micro_recall",
        micro,
    ))
}

/// Per-label F1 plus macro/micro aggregates. `macro_f1` is the run's
/// model-selection criterion.
pub fn f1_summary(
    outputs: &ArrayView2<'_, i32>,
    targets: &ArrayView2<'_, i32>,
    target_names: &[String],
) -> TrainResult<MetricValue> {
    let counts = LabelCounts::tally(outputs, targets, target_names)?;
    let micro = harmonic(counts.micro_precision(), counts.micro_recall());
    Ok(nested_summary(
        &counts,
        target_names,
        LabelCounts::f1,
        "macro_f1",
        "micro_f1",
        micro,
    ))
}
