//! Metric registry and value types.
//!
//! Metrics are pure functions resolved once at startup and dispatched by
//! name. The registry iterates in registration order, so summary keys come
//! out the same way on every run.

mod basic;

pub use basic::{f1_summary, precision_summary, recall_summary};

use crate::summary::MetricsSummary;
use crate::TrainResult;
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A computed metric: a scalar or a nested name-to-value mapping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetricValue {
    Scalar(f64),
    Nested(BTreeMap<String, f64>),
}

impl MetricValue {
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            MetricValue::Scalar(v) => Some(*v),
            MetricValue::Nested(_) => None,
        }
    }

    /// Look up a key inside a nested value.
    pub fn get(&self, key: &str) -> Option<f64> {
        match self {
            MetricValue::Scalar(_) => None,
            MetricValue::Nested(map) => map.get(key).copied(),
        }
    }
}

/// Signature every registered metric function satisfies: binarized
/// predictions, integer targets, and the label names, in that order.
pub type MetricFn =
    fn(&ArrayView2<'_, i32>, &ArrayView2<'_, i32>, &[String]) -> TrainResult<MetricValue>;

/// Name-keyed metric dispatch.
pub struct MetricRegistry {
    entries: Vec<(String, MetricFn)>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// The default set: precision, recall, f1.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("precision", precision_summary);
        registry.register("recall", recall_summary);
        registry.register("f1", f1_summary);
        registry
    }

    /// Register a metric; re-registering a name replaces the function but
    /// keeps its position.
    pub fn register(&mut self, name: &str, func: MetricFn) {
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| n == name) {
            entry.1 = func;
        } else {
            self.entries.push((name.to_string(), func));
        }
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run every registered metric over one epoch's accumulated matrices.
    pub fn compute(
        &self,
        outputs: &ArrayView2<'_, i32>,
        targets: &ArrayView2<'_, i32>,
        target_names: &[String],
    ) -> TrainResult<MetricsSummary> {
        let mut summary = MetricsSummary::new();
        for (name, func) in &self.entries {
            summary.insert(name.clone(), func(outputs, targets, target_names)?);
        }
        Ok(summary)
    }
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
