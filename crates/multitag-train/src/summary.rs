//! Metrics summaries and their on-disk layout.

use crate::metrics::MetricValue;
use crate::{TrainError, TrainResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Evaluation split a summary belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Partition {
    Train,
    Test,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Train => "train",
            Partition::Test => "test",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One epoch's computed metrics for one partition.
///
/// Backed by a sorted map so serialized key order is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricsSummary {
    values: BTreeMap<String, MetricValue>,
}

impl MetricsSummary {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: MetricValue) {
        self.values.insert(name.into(), value);
    }

    pub fn insert_scalar(&mut self, name: impl Into<String>, value: f64) {
        self.insert(name, MetricValue::Scalar(value));
    }

    pub fn get(&self, name: &str) -> Option<&MetricValue> {
        self.values.get(name)
    }

    pub fn scalar(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(MetricValue::as_scalar)
    }

    /// The model-selection criterion: `f1.macro_f1`.
    pub fn macro_f1(&self) -> TrainResult<f64> {
        self.get("f1")
            .and_then(|v| v.get("macro_f1"))
            .ok_or_else(|| TrainError::Metrics("summary has no f1.macro_f1 entry".into()))
    }

    pub fn loss_avg(&self) -> Option<f64> {
        self.scalar("loss_avg")
    }

    /// Stamp the 1-based epoch that produced this summary.
    pub fn set_epoch(&mut self, epoch: usize) {
        self.insert_scalar("epoch", epoch as f64);
    }

    pub fn save_json(&self, path: &Path) -> TrainResult<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| TrainError::Metrics(format!("failed to serialize summary: {}", e)))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TrainError::Metrics(format!(
                    "failed to create metrics dir {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
        std::fs::write(path, json).map_err(|e| {
            TrainError::Metrics(format!("failed to write {}: {}", path.display(), e))
        })
    }

    pub fn load_json(path: &Path) -> TrainResult<Self> {
        let json = std::fs::read_to_string(path).map_err(|e| {
            TrainError::Metrics(format!("failed to read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&json).map_err(|e| {
            TrainError::Metrics(format!("malformed summary {}: {}", path.display(), e))
        })
    }
}

/// `<exp_dir>/metrics/<name>/<partition>/epoch_<N>_<partition>_f1.json`
pub fn epoch_summary_path(
    exp_dir: &Path,
    name: &str,
    partition: Partition,
    epoch_display: usize,
) -> PathBuf {
    exp_dir
        .join("metrics")
        .join(name)
        .join(partition.as_str())
        .join(format!("epoch_{}_{}_f1.json", epoch_display, partition))
}

/// `<exp_dir>/metrics/<name>/<partition>/best_<partition>_f1.json`
pub fn best_summary_path(exp_dir: &Path, name: &str, partition: Partition) -> PathBuf {
    exp_dir
        .join("metrics")
        .join(name)
        .join(partition.as_str())
        .join(format!("best_{}_f1.json", partition))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;

    #[test]
    fn test_macro_f1_lookup() {
        let mut summary = MetricsSummary::new();
        let mut f1 = BTreeMap::new();
        f1.insert("macro_f1".to_string(), 0.42);
        summary.insert("f1", MetricValue::Nested(f1));

        assert_eq!(summary.macro_f1().unwrap(), 0.42);
    }

    #[test]
    fn test_missing_macro_f1_is_fatal() {
        let summary = MetricsSummary::new();
        assert!(matches!(summary.macro_f1(), Err(TrainError::Metrics(_))));
    }

    #[test]
    fn test_epoch_stamp_and_loss() {
        let mut summary = MetricsSummary::new();
        summary.insert_scalar("loss_avg", 1.5);
        summary.set_epoch(3);
        assert_eq!(summary.loss_avg(), Some(1.5));
        assert_eq!(summary.scalar("epoch"), Some(3.0));
    }

    #[test]
    fn test_save_load_roundtrip() {
        let mut summary = MetricsSummary::new();
        summary.insert_scalar("loss_avg", 0.25);
        let mut f1 = BTreeMap::new();
        f1.insert("macro_f1".to_string(), 0.5);
        summary.insert("f1", MetricValue::Nested(f1));

        let path = temp_dir().join("multitag_test_summary/roundtrip.json");
        summary.save_json(&path).unwrap();
        let loaded = MetricsSummary::load_json(&path).unwrap();
        assert_eq!(loaded, summary);

        std::fs::remove_dir_all(path.parent().unwrap()).ok();
    }

    #[test]
    fn test_paths_follow_layout() {
        let exp = Path::new("/tmp/exp");
        assert_eq!(
            epoch_summary_path(exp, "run1", Partition::Train, 4),
            PathBuf::from("/tmp/exp/metrics/run1/train/epoch_4_train_f1.json")
        );
        assert_eq!(
            best_summary_path(exp, "run1", Partition::Test),
            PathBuf::from("/tmp/exp/metrics/run1/test/best_test_f1.json")
        );
    }
}
