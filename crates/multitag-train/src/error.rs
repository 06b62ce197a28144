//! Error types for training operations.

use thiserror::Error;

/// Errors that can occur while driving a training run.
#[derive(Error, Debug)]
pub enum TrainError {
    /// Missing or invalid run configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Dataset construction or loading failure.
    #[error("data error: {0}")]
    Data(String),

    /// Mismatched array dimensions between collaborators.
    #[error("shape error: {0}")]
    Shape(String),

    /// Loss computation failure.
    #[error("loss error: {0}")]
    Loss(String),

    /// Optimizer step failure.
    #[error("optimizer error: {0}")]
    Optimizer(String),

    /// Metric computation or lookup failure.
    #[error("metrics error: {0}")]
    Metrics(String),

    /// Checkpoint save/load failure.
    #[error("checkpoint error: {0}")]
    Checkpoint(String),

    /// Model forward/backward or state-dict failure.
    #[error("model error: {0}")]
    Model(String),

    /// An epoch finished without recording a single optimizer-step group.
    #[error("no gradient groups were recorded; the training loader yielded no batches")]
    EmptyAccumulation,
}

/// Result type for training operations.
pub type TrainResult<T> = Result<T, TrainError>;
