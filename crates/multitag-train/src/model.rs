//! Model interface and the hashing bag-of-words classifier.

use crate::{TrainError, TrainResult};
use ndarray::{Array2, ArrayView2, Axis};
use std::collections::HashMap;

/// Trait for trainable multi-label classifiers.
///
/// A model owns its encoder: it receives raw document batches and performs
/// whatever tokenization and device placement it needs before producing one
/// score row per document, one column per label.
pub trait Model {
    /// Switch between training and evaluation behaviour.
    fn train_mode(&mut self, training: bool);

    /// Score a batch of documents.
    fn forward(&self, batch: &[String]) -> TrainResult<Array2<f64>>;

    /// Gradients of the loss with respect to every parameter, given the
    /// gradient with respect to this batch's forward output.
    fn backward(
        &self,
        batch: &[String],
        grad_output: &ArrayView2<'_, f64>,
    ) -> TrainResult<HashMap<String, Array2<f64>>>;

    fn parameters(&self) -> &HashMap<String, Array2<f64>>;

    fn parameters_mut(&mut self) -> &mut HashMap<String, Array2<f64>>;

    fn num_parameters(&self) -> usize {
        self.parameters().values().map(|p| p.len()).sum()
    }

    /// Snapshot all parameters as flat vectors for checkpointing.
    fn state_dict(&self) -> HashMap<String, Vec<f64>> {
        self.parameters()
            .iter()
            .map(|(name, param)| (name.clone(), param.iter().copied().collect()))
            .collect()
    }

    /// Restore parameters from a checkpoint snapshot.
    fn load_state_dict(&mut self, state: HashMap<String, Vec<f64>>) -> TrainResult<()> {
        let parameters = self.parameters_mut();
        for (name, values) in state {
            let param = parameters.get_mut(&name).ok_or_else(|| {
                TrainError::Model(format!("parameter '{}' not found in model", name))
            })?;
            if param.len() != values.len() {
                return Err(TrainError::Model(format!(
                    "parameter '{}' size mismatch: expected {}, got {}",
                    name,
                    param.len(),
                    values.len()
                )));
            }
            for (slot, value) in param.iter_mut().zip(values) {
                *slot = value;
            }
        }
        Ok(())
    }
}

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// FNV-1a over case-folded bytes. Hand-rolled so feature indices stay stable
/// across processes; checkpoint resume depends on that.
fn hash_token(token: &str) -> u64 {
    let mut state = FNV_OFFSET;
    for byte in token.bytes() {
        state ^= u64::from(byte.to_ascii_lowercase());
        state = state.wrapping_mul(FNV_PRIME);
    }
    state
}

/// Multi-label classifier over a hashed bag-of-words encoding.
///
/// Documents are split on whitespace, capped at `max_length` tokens, and
/// hashed into a fixed-width feature space; a single linear layer followed
/// by a sigmoid produces per-label probabilities.
#[derive(Debug, Clone)]
pub struct HashingClassifier {
    parameters: HashMap<String, Array2<f64>>,
    num_features: usize,
    num_labels: usize,
    max_length: usize,
    training: bool,
}

impl HashingClassifier {
    pub fn new(num_features: usize, num_labels: usize, max_length: usize, seed: u64) -> Self {
        // Xavier-uniform init from a seeded LCG, so two runs with the same
        // seed start from identical weights.
        let limit = (6.0 / (num_features + num_labels) as f64).sqrt();
        let mut rng_state = seed;
        let mut next_uniform = move || -> f64 {
            rng_state = rng_state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (rng_state >> 11) as f64 / (1u64 << 53) as f64
        };

        let mut weight = Array2::zeros((num_features, num_labels));
        weight.mapv_inplace(|_| (next_uniform() * 2.0 - 1.0) * limit);
        let bias = Array2::zeros((1, num_labels));

        let mut parameters = HashMap::new();
        parameters.insert("weight".to_string(), weight);
        parameters.insert("bias".to_string(), bias);

        Self {
            parameters,
            num_features,
            num_labels,
            max_length,
            training: false,
        }
    }

    pub fn num_labels(&self) -> usize {
        self.num_labels
    }

    pub fn is_training(&self) -> bool {
        self.training
    }

    /// Hashed term-frequency encoding, `max_length` tokens per document.
    fn encode(&self, batch: &[String]) -> Array2<f64> {
        let mut features = Array2::zeros((batch.len(), self.num_features));
        for (row, doc) in batch.iter().enumerate() {
            for token in doc.split_whitespace().take(self.max_length) {
                let bucket = (hash_token(token) % self.num_features as u64) as usize;
                features[[row, bucket]] += 1.0;
            }
        }
        features
    }

    fn weight(&self) -> TrainResult<&Array2<f64>> {
        self.parameters
            .get("weight")
            .ok_or_else(|| TrainError::Model("weight parameter missing".into()))
    }

    fn bias(&self) -> TrainResult<&Array2<f64>> {
        self.parameters
            .get("bias")
            .ok_or_else(|| TrainError::Model("bias parameter missing".into()))
    }

    fn scores(&self, features: &Array2<f64>) -> TrainResult<Array2<f64>> {
        let logits = features.dot(self.weight()?) + self.bias()?;
        Ok(logits.mapv(|z| 1.0 / (1.0 + (-z).exp())))
    }
}

impl Model for HashingClassifier {
    fn train_mode(&mut self, training: bool) {
        self.training = training;
    }

    fn forward(&self, batch: &[String]) -> TrainResult<Array2<f64>> {
        let features = self.encode(batch);
        self.scores(&features)
    }

    fn backward(
        &self,
        batch: &[String],
        grad_output: &ArrayView2<'_, f64>,
    ) -> TrainResult<HashMap<String, Array2<f64>>> {
        let features = self.encode(batch);
        let probs = self.scores(&features)?;
        if grad_output.shape() != probs.shape() {
            return Err(TrainError::Model(format!(
                "gradient shape {:?} does not match output shape {:?}",
                grad_output.shape(),
                probs.shape()
            )));
        }

        // Chain through the sigmoid: dL/dz = dL/dp * p * (1 - p).
        let mut grad_logits = probs;
        for ((i, j), g) in grad_logits.indexed_iter_mut() {
            *g = grad_output[[i, j]] * *g * (1.0 - *g);
        }

        let grad_weight = features.t().dot(&grad_logits);
        let grad_bias = grad_logits.sum_axis(Axis(0)).insert_axis(Axis(0));

        let mut gradients = HashMap::new();
        gradients.insert("weight".to_string(), grad_weight);
        gradients.insert("bias".to_string(), grad_bias);
        Ok(gradients)
    }

    fn parameters(&self) -> &HashMap<String, Array2<f64>> {
        &self.parameters
    }

    fn parameters_mut(&mut self) -> &mut HashMap<String, Array2<f64>> {
        &mut self.parameters
    }
}
