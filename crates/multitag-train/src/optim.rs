//! Optimizers.

use crate::{TrainError, TrainResult};
use ndarray::Array2;
use std::collections::HashMap;

/// Trait for optimizers.
pub trait Optimizer {
    /// Update parameters with accumulated gradients.
    fn step(
        &mut self,
        parameters: &mut HashMap<String, Array2<f64>>,
        gradients: &HashMap<String, Array2<f64>>,
    ) -> TrainResult<()>;

    /// Clear transient per-step state. Accumulated gradients live with the
    /// trainer, so for most optimizers this is a hook rather than a wipe.
    fn zero_grad(&mut self);

    fn learning_rate(&self) -> f64;

    fn set_learning_rate(&mut self, lr: f64);

    /// Internal state as flat vectors for checkpointing.
    fn state_dict(&self) -> HashMap<String, Vec<f64>>;

    /// Restore internal state from a checkpoint.
    fn load_state_dict(&mut self, state: HashMap<String, Vec<f64>>);
}

/// Adam hyperparameters.
#[derive(Debug, Clone, Copy)]
pub struct AdamConfig {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
}

impl Default for AdamConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
        }
    }
}

/// Adam (Kingma & Ba, ICLR 2015) with bias-corrected moment estimates.
#[derive(Debug)]
pub struct AdamOptimizer {
    config: AdamConfig,
    /// First-moment estimates per parameter.
    m: HashMap<String, Array2<f64>>,
    /// Second-moment estimates per parameter.
    v: HashMap<String, Array2<f64>>,
    /// Timestep counter.
    t: usize,
    /// Flat state waiting for parameter shapes; materialized on first step.
    restored: Option<HashMap<String, Vec<f64>>>,
}

impl AdamOptimizer {
    pub fn new(config: AdamConfig) -> Self {
        Self {
            config,
            m: HashMap::new(),
            v: HashMap::new(),
            t: 0,
            restored: None,
        }
    }

    /// Rebuild moment arrays from a loaded flat state once the parameter
    /// shapes are known.
    fn materialize_restored(
        &mut self,
        parameters: &HashMap<String, Array2<f64>>,
    ) -> TrainResult<()> {
        let Some(flat) = self.restored.take() else {
            return Ok(());
        };
        for (name, param) in parameters {
            for (prefix, store) in [("m_", &mut self.m), ("v_", &mut self.v)] {
                if let Some(values) = flat.get(&format!("{}{}", prefix, name)) {
                    if values.len() != param.len() {
                        return Err(TrainError::Optimizer(format!(
                            "restored moment for '{}' has {} values, parameter has {}",
                            name,
                            values.len(),
                            param.len()
                        )));
                    }
                    let array = Array2::from_shape_vec(param.raw_dim(), values.clone())
                        .map_err(|e| TrainError::Optimizer(e.to_string()))?;
                    store.insert(name.clone(), array);
                }
            }
        }
        Ok(())
    }
}

impl Optimizer for AdamOptimizer {
    fn step(
        &mut self,
        parameters: &mut HashMap<String, Array2<f64>>,
        gradients: &HashMap<String, Array2<f64>>,
    ) -> TrainResult<()> {
        self.materialize_restored(parameters)?;

        self.t += 1;
        let AdamConfig {
            learning_rate: lr,
            beta1,
            beta2,
            epsilon,
        } = self.config;
        let lr_t = lr * (1.0 - beta2.powi(self.t as i32)).sqrt() / (1.0 - beta1.powi(self.t as i32));

        for (name, param) in parameters.iter_mut() {
            let grad = gradients.get(name).ok_or_else(|| {
                TrainError::Optimizer(format!("missing gradient for parameter '{}'", name))
            })?;
            if grad.raw_dim() != param.raw_dim() {
                return Err(TrainError::Optimizer(format!(
                    "gradient shape {:?} does not match parameter '{}' shape {:?}",
                    grad.shape(),
                    name,
                    param.shape()
                )));
            }

            let m = self
                .m
                .entry(name.clone())
                .or_insert_with(|| Array2::zeros(param.raw_dim()));
            let v = self
                .v
                .entry(name.clone())
                .or_insert_with(|| Array2::zeros(param.raw_dim()));

            *m = &*m * beta1 + &(grad * (1.0 - beta1));
            *v = &*v * beta2 + &(grad.mapv(|g| g * g) * (1.0 - beta2));

            let update = m.mapv(|m_val| m_val * lr_t) / &v.mapv(|v_val| v_val.sqrt() + epsilon);
            *param = &*param - &update;
        }
        Ok(())
    }

    fn zero_grad(&mut self) {}

    fn learning_rate(&self) -> f64 {
        self.config.learning_rate
    }

    fn set_learning_rate(&mut self, lr: f64) {
        self.config.learning_rate = lr;
    }

    fn state_dict(&self) -> HashMap<String, Vec<f64>> {
        let mut state = HashMap::new();
        state.insert("t".to_string(), vec![self.t as f64]);
        for (name, m) in &self.m {
            state.insert(format!("m_{}", name), m.iter().copied().collect());
        }
        for (name, v) in &self.v {
            state.insert(format!("v_{}", name), v.iter().copied().collect());
        }
        state
    }

    fn load_state_dict(&mut self, state: HashMap<String, Vec<f64>>) {
        if let Some(t) = state.get("t").and_then(|v| v.first()) {
            self.t = *t as usize;
        }
        self.m.clear();
        self.v.clear();
        self.restored = Some(state);
    }
}
