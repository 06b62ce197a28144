//! Epoch-scoped accumulation of binarized predictions and their targets.

use crate::{TrainError, TrainResult};
use ndarray::{Array2, ArrayView2};

/// Binarize per-label scores with a strict greater-than rule.
///
/// A score exactly equal to `threshold` is a negative prediction.
pub fn binarize(scores: &ArrayView2<'_, f64>, threshold: f64) -> Array2<i32> {
    scores.mapv(|s| i32::from(s > threshold))
}

/// Collects per-batch (prediction, target) matrices across one epoch.
///
/// Rows are kept in arrival order, batch by batch; `finalize` hands the two
/// concatenated matrices to the metric functions exactly once, after which
/// the accumulator is gone.
#[derive(Debug, Default)]
pub struct EpochAccumulator {
    outputs: Vec<i32>,
    targets: Vec<i32>,
    rows: usize,
    cols: Option<usize>,
}

impl EpochAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one batch of binarized predictions and integer targets.
    pub fn update(
        &mut self,
        outputs: &ArrayView2<'_, i32>,
        targets: &ArrayView2<'_, i32>,
    ) -> TrainResult<()> {
        if outputs.nrows() != targets.nrows() {
            return Err(TrainError::Shape(format!(
                "batch rows disagree: {} predictions vs {} targets",
                outputs.nrows(),
                targets.nrows()
            )));
        }
        if outputs.ncols() != targets.ncols() {
            return Err(TrainError::Shape(format!(
                "label width disagrees within batch: {} vs {}",
                outputs.ncols(),
                targets.ncols()
            )));
        }
        match self.cols {
            Some(cols) if cols != outputs.ncols() => {
                return Err(TrainError::Shape(format!(
                    "label width changed across batches: {} then {}",
                    cols,
                    outputs.ncols()
                )));
            }
            Some(_) => {}
            None => self.cols = Some(outputs.ncols()),
        }

        self.outputs.extend(outputs.iter().copied());
        self.targets.extend(targets.iter().copied());
        self.rows += outputs.nrows();
        Ok(())
    }

    /// Total rows accumulated so far.
    pub fn num_rows(&self) -> usize {
        self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Consume the accumulator, returning `(outputs, targets)` stacked
    /// row-wise in arrival order.
    pub fn finalize(self) -> TrainResult<(Array2<i32>, Array2<i32>)> {
        let cols = self.cols.unwrap_or(0);
        let outputs = Array2::from_shape_vec((self.rows, cols), self.outputs)
            .map_err(|e| TrainError::Shape(format!("output concatenation failed: {}", e)))?;
        let targets = Array2::from_shape_vec((self.rows, cols), self.targets)
            .map_err(|e| TrainError::Shape(format!("target concatenation failed: {}", e)))?;
        Ok((outputs, targets))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_binarize_is_strictly_greater() {
        let scores = array![[0.4, 0.5, 0.6]];
        let out = binarize(&scores.view(), 0.5);
        assert_eq!(out, array![[0, 0, 1]]);
    }

    #[test]
    fn test_binarize_monotonic_in_threshold() {
        let scores = array![[0.1, 0.3, 0.5, 0.7, 0.9], [0.2, 0.4, 0.6, 0.8, 1.0]];
        let mut last_positives = usize::MAX;
        for threshold in [0.0, 0.25, 0.5, 0.75, 1.0] {
            let positives = binarize(&scores.view(), threshold)
                .iter()
                .filter(|&&v| v == 1)
                .count();
            assert!(positives <= last_positives);
            last_positives = positives;
        }
    }

    #[test]
    fn test_rows_concatenate_in_arrival_order() {
        let mut acc = EpochAccumulator::new();
        acc.update(&array![[1, 0], [0, 1]].view(), &array![[1, 1], [0, 0]].view())
            .unwrap();
        acc.update(&array![[1, 1]].view(), &array![[0, 1]].view())
            .unwrap();

        assert_eq!(acc.num_rows(), 3);
        let (outputs, targets) = acc.finalize().unwrap();
        assert_eq!(outputs, array![[1, 0], [0, 1], [1, 1]]);
        assert_eq!(targets, array![[1, 1], [0, 0], [0, 1]]);
    }

    #[test]
    fn test_label_width_change_is_fatal() {
        let mut acc = EpochAccumulator::new();
        acc.update(&array![[1, 0]].view(), &array![[1, 0]].view())
            .unwrap();
        let err = acc
            .update(&array![[1, 0, 1]].view(), &array![[1, 0, 1]].view())
            .unwrap_err();
        assert!(matches!(err, TrainError::Shape(_)));
    }

    #[test]
    fn test_row_mismatch_within_batch_is_fatal() {
        let mut acc = EpochAccumulator::new();
        let err = acc
            .update(&array![[1, 0], [0, 1]].view(), &array![[1, 0]].view())
            .unwrap_err();
        assert!(matches!(err, TrainError::Shape(_)));
    }

    #[test]
    fn test_empty_accumulator_finalizes_to_empty() {
        let acc = EpochAccumulator::new();
        let (outputs, targets) = acc.finalize().unwrap();
        assert_eq!(outputs.nrows(), 0);
        assert_eq!(targets.nrows(), 0);
    }
}
