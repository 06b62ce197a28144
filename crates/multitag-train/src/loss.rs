//! Loss functions.

use crate::{TrainError, TrainResult};
use ndarray::{Array2, ArrayView2};
use std::fmt::Debug;

/// Trait for loss functions.
pub trait Loss: Debug {
    /// Compute the scalar loss value.
    fn compute(
        &self,
        predictions: &ArrayView2<'_, f64>,
        targets: &ArrayView2<'_, f64>,
    ) -> TrainResult<f64>;

    /// Gradient of the loss with respect to the predictions.
    fn gradient(
        &self,
        predictions: &ArrayView2<'_, f64>,
        targets: &ArrayView2<'_, f64>,
    ) -> TrainResult<Array2<f64>>;

    fn name(&self) -> &str {
        "unknown"
    }
}

/// Sum-reduced binary cross-entropy over per-label probabilities.
///
/// Probabilities are clamped to `[epsilon, 1 - epsilon]` to keep the logs
/// finite. The sum reduction (no averaging over batch or labels) matches the
/// gradient-accumulation scheme: summed batch losses add up to the loss of
/// the effective large batch.
#[derive(Debug, Clone)]
pub struct BceLoss {
    pub epsilon: f64,
}

impl Default for BceLoss {
    fn default() -> Self {
        Self { epsilon: 1e-7 }
    }
}

impl BceLoss {
    fn check_shapes(
        &self,
        predictions: &ArrayView2<'_, f64>,
        targets: &ArrayView2<'_, f64>,
    ) -> TrainResult<()> {
        if predictions.shape() != targets.shape() {
            return Err(TrainError::Loss(format!(
                "shape mismatch: predictions {:?} vs targets {:?}",
                predictions.shape(),
                targets.shape()
            )));
        }
        Ok(())
    }

    fn clamp(&self, p: f64) -> f64 {
        p.max(self.epsilon).min(1.0 - self.epsilon)
    }
}

impl Loss for BceLoss {
    fn compute(
        &self,
        predictions: &ArrayView2<'_, f64>,
        targets: &ArrayView2<'_, f64>,
    ) -> TrainResult<f64> {
        self.check_shapes(predictions, targets)?;

        let mut total = 0.0;
        for (&pred, &target) in predictions.iter().zip(targets.iter()) {
            let p = self.clamp(pred);
            total -= target * p.ln() + (1.0 - target) * (1.0 - p).ln();
        }
        Ok(total)
    }

    fn gradient(
        &self,
        predictions: &ArrayView2<'_, f64>,
        targets: &ArrayView2<'_, f64>,
    ) -> TrainResult<Array2<f64>> {
        self.check_shapes(predictions, targets)?;

        let mut grad = Array2::zeros(predictions.raw_dim());
        for ((i, j), &pred) in predictions.indexed_iter() {
            let p = self.clamp(pred);
            grad[[i, j]] = (p - targets[[i, j]]) / (p * (1.0 - p));
        }
        Ok(grad)
    }

    fn name(&self) -> &str {
        "bce"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_bce_known_value() {
        let loss = BceLoss::default();
        let predictions = array![[0.5]];
        let targets = array![[1.0]];
        let value = loss
            .compute(&predictions.view(), &targets.view())
            .unwrap();
        assert!((value - 0.5f64.ln().abs()).abs() < 1e-9);
    }

    #[test]
    fn test_bce_is_sum_reduced() {
        let loss = BceLoss::default();
        let one = array![[0.5]];
        let two = array![[0.5], [0.5]];
        let targets_one = array![[1.0]];
        let targets_two = array![[1.0], [1.0]];

        let a = loss.compute(&one.view(), &targets_one.view()).unwrap();
        let b = loss.compute(&two.view(), &targets_two.view()).unwrap();
        assert!((b - 2.0 * a).abs() < 1e-9);
    }

    #[test]
    fn test_gradient_sign() {
        let loss = BceLoss::default();
        let predictions = array![[0.8, 0.2]];
        let targets = array![[1.0, 0.0]];
        let grad = loss
            .gradient(&predictions.view(), &targets.view())
            .unwrap();
        // Overconfident-correct predictions still pull toward the target.
        assert!(grad[[0, 0]] < 0.0);
        assert!(grad[[0, 1]] > 0.0);
    }

    #[test]
    fn test_shape_mismatch_is_fatal() {
        let loss = BceLoss::default();
        let predictions = array![[0.5, 0.5]];
        let targets = array![[1.0]];
        assert!(matches!(
            loss.compute(&predictions.view(), &targets.view()),
            Err(TrainError::Loss(_))
        ));
    }

    #[test]
    fn test_extreme_probabilities_stay_finite() {
        let loss = BceLoss::default();
        let predictions = array![[0.0, 1.0]];
        let targets = array![[1.0, 0.0]];
        let value = loss
            .compute(&predictions.view(), &targets.view())
            .unwrap();
        assert!(value.is_finite());
    }
}
