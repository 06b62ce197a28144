//! Run configuration, loaded once per process and never mutated afterwards.

use crate::{TrainError, TrainResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Immutable per-run hyperparameters.
///
/// Loaded from `<exp_dir>/params/<file>` at startup. A missing or malformed
/// file aborts the run before any training happens.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    /// Documents per batch.
    pub batch_size: usize,
    /// Optimizer learning rate.
    pub learning_rate: f64,
    /// Total epochs for the run.
    pub num_epochs: usize,
    /// Scores strictly above this become positive predictions.
    pub threshold: f64,
    /// Apply an optimizer step every this many batches.
    pub update_grad_every: usize,
    /// Write a periodic checkpoint snapshot every this many epochs.
    pub save_every: usize,
    /// Width of the hashed feature space.
    pub num_features: usize,
    /// Token cap per document.
    pub max_length: usize,
    /// Seed for parameter initialization and batch shuffling.
    pub seed: u64,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            batch_size: 32,
            learning_rate: 1e-3,
            num_epochs: 10,
            threshold: 0.5,
            update_grad_every: 1,
            save_every: 5,
            num_features: 4096,
            max_length: 512,
            seed: 47,
        }
    }
}

impl Params {
    /// Load and validate parameters from a JSON file.
    pub fn from_file(path: &Path) -> TrainResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            TrainError::Config(format!("no params file at {}: {}", path.display(), e))
        })?;
        let params: Params = serde_json::from_str(&json).map_err(|e| {
            TrainError::Config(format!("malformed params file {}: {}", path.display(), e))
        })?;
        params.validate()?;
        Ok(params)
    }

    /// Reject settings the epoch loop cannot run with.
    pub fn validate(&self) -> TrainResult<()> {
        if self.batch_size == 0 {
            return Err(TrainError::Config("batch_size must be at least 1".into()));
        }
        if self.update_grad_every == 0 {
            return Err(TrainError::Config(
                "update_grad_every must be at least 1".into(),
            ));
        }
        if self.save_every == 0 {
            return Err(TrainError::Config("save_every must be at least 1".into()));
        }
        if self.num_features == 0 {
            return Err(TrainError::Config("num_features must be at least 1".into()));
        }
        if !self.learning_rate.is_finite() || self.learning_rate <= 0.0 {
            return Err(TrainError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !self.threshold.is_finite() {
            return Err(TrainError::Config("threshold must be finite".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;

    #[test]
    fn test_missing_params_file_is_fatal() {
        let err = Params::from_file(Path::new("/nonexistent/params.json")).unwrap_err();
        assert!(matches!(err, TrainError::Config(_)));
    }

    #[test]
    fn test_partial_params_fill_defaults() {
        let path = temp_dir().join("multitag_test_params.json");
        std::fs::write(&path, r#"{"batch_size": 8, "update_grad_every": 4}"#).unwrap();

        let params = Params::from_file(&path).unwrap();
        assert_eq!(params.batch_size, 8);
        assert_eq!(params.update_grad_every, 4);
        assert_eq!(params.num_epochs, Params::default().num_epochs);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_zero_accumulation_period_rejected() {
        let params = Params {
            update_grad_every: 0,
            ..Params::default()
        };
        assert!(matches!(params.validate(), Err(TrainError::Config(_))));
    }
}
