//! Supervised training orchestration for multi-label text classification.
//!
//! This crate drives the epoch loop end to end:
//! - micro-batch gradient accumulation with a bounded memory footprint,
//! - epoch-level metric aggregation through a name-keyed registry,
//! - independent best-score tracking for the train and test partitions,
//! - checkpoint persistence (last/best/periodic slots) and resume.
//!
//! The model, loss, and optimizer sit behind traits so the loop stays
//! agnostic to the architecture being trained; `HashingClassifier`,
//! `BceLoss`, and `AdamOptimizer` are the shipped implementations.

mod accumulate;
mod checkpoint;
mod data;
mod device;
mod error;
mod evaluate;
mod loss;
mod metrics;
mod model;
mod optim;
mod params;
mod summary;
mod trainer;

pub use accumulate::{binarize, EpochAccumulator};
pub use checkpoint::{load_checkpoint, save_checkpoint, Checkpoint, CheckpointCompression};
pub use data::{Batch, BatchIter, DataLoader, TextDataset};
pub use device::{Device, DeviceContext, MemoryStats};
pub use error::{TrainError, TrainResult};
pub use evaluate::evaluate;
pub use loss::{BceLoss, Loss};
pub use metrics::{
    f1_summary, precision_summary, recall_summary, MetricFn, MetricRegistry, MetricValue,
};
pub use model::{HashingClassifier, Model};
pub use optim::{AdamConfig, AdamOptimizer, Optimizer};
pub use params::Params;
pub use summary::{best_summary_path, epoch_summary_path, MetricsSummary, Partition};
pub use trainer::{restore_checkpoint_path, train_and_evaluate, train_one_epoch, BestTracker};
