//! Epoch training loop, best-score tracking, and run orchestration.

use crate::accumulate::{binarize, EpochAccumulator};
use crate::checkpoint::{load_checkpoint, save_checkpoint, Checkpoint, CheckpointCompression};
use crate::data::DataLoader;
use crate::device::DeviceContext;
use crate::evaluate::evaluate;
use crate::loss::Loss;
use crate::metrics::MetricRegistry;
use crate::model::Model;
use crate::optim::Optimizer;
use crate::params::Params;
use crate::summary::{best_summary_path, epoch_summary_path, MetricsSummary, Partition};
use crate::{TrainError, TrainResult};
use ndarray::Array2;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Add a batch's gradients into the pending accumulation map.
fn accumulate_gradients(
    pending: &mut HashMap<String, Array2<f64>>,
    gradients: HashMap<String, Array2<f64>>,
) {
    for (name, grad) in gradients {
        match pending.entry(name) {
            Entry::Occupied(mut entry) => {
                let acc = entry.get_mut();
                *acc = &*acc + &grad;
            }
            Entry::Vacant(entry) => {
                entry.insert(grad);
            }
        }
    }
}

/// Run exactly one training pass over the loader.
///
/// Gradients accumulate across batches and an optimizer step is applied
/// every `update_grad_every` batches; the loss recorded for a group is the
/// last one observed before its step. A trailing incomplete group is always
/// flushed so no batch's gradients are dropped.
#[allow(clippy::too_many_arguments)]
pub fn train_one_epoch(
    model: &mut dyn Model,
    optimizer: &mut dyn Optimizer,
    loss_fn: &dyn Loss,
    loader: &DataLoader,
    params: &Params,
    registry: &MetricRegistry,
    device: &mut DeviceContext,
    target_names: &[String],
    epoch: usize,
) -> TrainResult<MetricsSummary> {
    model.train_mode(true);

    let mut pending: HashMap<String, Array2<f64>> = HashMap::new();
    let mut group_losses: Vec<f64> = Vec::new();
    let mut accumulator = EpochAccumulator::new();
    let mut last_loss = 0.0;
    let mut num_batches = 0;

    for (i, batch) in loader.batches(epoch).enumerate() {
        let step = i + 1;
        log::debug!("training on batch {}", step);

        let scores = model.forward(&batch.documents)?;
        let loss = loss_fn.compute(&scores.view(), &batch.targets.view())?;
        let grad_scores = loss_fn.gradient(&scores.view(), &batch.targets.view())?;
        let gradients = model.backward(&batch.documents, &grad_scores.view())?;
        accumulate_gradients(&mut pending, gradients);
        last_loss = loss;
        num_batches = step;

        // Sub-batching: one parameter update per `update_grad_every` batches.
        if step % params.update_grad_every == 0 {
            optimizer.step(model.parameters_mut(), &pending)?;
            optimizer.zero_grad();
            pending.clear();
            group_losses.push(loss);
        }

        let outputs = binarize(&scores.view(), params.threshold);
        let targets = batch.targets.mapv(|t| t as i32);
        accumulator.update(&outputs.view(), &targets.view())?;

        device.track(
            (scores.len() + grad_scores.len() + batch.targets.len())
                * std::mem::size_of::<f64>(),
        );
        device.reclaim();
    }

    // Flush the final incomplete group so trailing gradients are not lost.
    if num_batches % params.update_grad_every != 0 {
        optimizer.step(model.parameters_mut(), &pending)?;
        optimizer.zero_grad();
        pending.clear();
        group_losses.push(last_loss);
    }

    if group_losses.is_empty() {
        return Err(TrainError::EmptyAccumulation);
    }

    let (outputs, targets) = accumulator.finalize()?;
    let mut summary = registry.compute(&outputs.view(), &targets.view(), target_names)?;
    summary.insert_scalar(
        "loss_avg",
        group_losses.iter().sum::<f64>() / group_losses.len() as f64,
    );
    Ok(summary)
}

/// Running maxima for the two tracked partitions.
///
/// Ties count as improvement, so the latest equal-best epoch owns the best
/// artifacts. The tracker lives for the process only: it is deliberately not
/// part of the checkpoint record, and a resumed run restarts both maxima at
/// zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BestTracker {
    pub best_train_macro_f1: f64,
    pub best_test_macro_f1: f64,
}

impl BestTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a train score; returns whether it matched or beat the best.
    pub fn update_train(&mut self, value: f64) -> bool {
        let is_best = value >= self.best_train_macro_f1;
        if is_best {
            self.best_train_macro_f1 = value;
        }
        is_best
    }

    /// Record a test score; returns whether it matched or beat the best.
    pub fn update_test(&mut self, value: f64) -> bool {
        let is_best = value >= self.best_test_macro_f1;
        if is_best {
            self.best_test_macro_f1 = value;
        }
        is_best
    }
}

/// Restore points live at the experiment root, named without extension.
pub fn restore_checkpoint_path(exp_dir: &Path, restore_name: &str) -> PathBuf {
    let plain = exp_dir.join(format!("{}.json", restore_name));
    if plain.exists() {
        return plain;
    }
    let gzipped = exp_dir.join(format!("{}.json.gz", restore_name));
    if gzipped.exists() {
        gzipped
    } else {
        // Missing either way; report the plain path.
        plain
    }
}

/// Drive the whole run: train, evaluate both partitions, track bests,
/// persist summaries and checkpoints, epoch after epoch.
///
/// The training pass's own summary is informational only; model selection
/// reads the full re-evaluation passes over each partition.
#[allow(clippy::too_many_arguments)]
pub fn train_and_evaluate(
    model: &mut dyn Model,
    optimizer: &mut dyn Optimizer,
    loss_fn: &dyn Loss,
    train_loader: &DataLoader,
    test_loader: &DataLoader,
    params: &Params,
    registry: &MetricRegistry,
    exp_dir: &Path,
    name: &str,
    device: &mut DeviceContext,
    target_names: &[String],
    restore_file: Option<&str>,
    compression: CheckpointCompression,
) -> TrainResult<BestTracker> {
    let mut start_epoch = 0;
    let mut tracker = BestTracker::new();

    if let Some(restore) = restore_file {
        let restore_path = restore_checkpoint_path(exp_dir, restore);
        log::info!("restoring from checkpoint at {}", restore_path.display());
        let checkpoint = load_checkpoint(&restore_path)?;
        model.load_state_dict(checkpoint.model_state)?;
        optimizer.load_state_dict(checkpoint.optimizer_state);
        start_epoch = checkpoint.epoch + 1;
    }

    let states_dir = exp_dir.join("model_states").join(name);
    let mut last_saved: Option<(Checkpoint, bool)> = None;

    for epoch in start_epoch..params.num_epochs {
        log::info!("epoch {}", epoch + 1);

        let train_pass = train_one_epoch(
            model,
            optimizer,
            loss_fn,
            train_loader,
            params,
            registry,
            device,
            target_names,
            epoch,
        )?;
        log::debug!("in-training loss_avg: {:?}", train_pass.loss_avg());

        let mut test_stats = evaluate(
            model,
            loss_fn,
            test_loader,
            params,
            registry,
            device,
            target_names,
            epoch,
        )?;
        let mut train_stats = evaluate(
            model,
            loss_fn,
            train_loader,
            params,
            registry,
            device,
            target_names,
            epoch,
        )?;

        let train_macro_f1 = train_stats.macro_f1()?;
        let test_macro_f1 = test_stats.macro_f1()?;
        let is_train_best = tracker.update_train(train_macro_f1);
        let is_test_best = tracker.update_test(test_macro_f1);

        log::info!(
            "test macro F1: {:.5}, train macro F1: {:.5}, avg test loss: {:.5}, avg train loss: {:.5}",
            test_macro_f1,
            train_macro_f1,
            test_stats.loss_avg().unwrap_or(f64::NAN),
            train_stats.loss_avg().unwrap_or(f64::NAN),
        );

        train_stats.save_json(&epoch_summary_path(exp_dir, name, Partition::Train, epoch + 1))?;
        test_stats.save_json(&epoch_summary_path(exp_dir, name, Partition::Test, epoch + 1))?;

        if is_train_best {
            train_stats.set_epoch(epoch + 1);
            train_stats.save_json(&best_summary_path(exp_dir, name, Partition::Train))?;
        }
        if is_test_best {
            test_stats.set_epoch(epoch + 1);
            test_stats.save_json(&best_summary_path(exp_dir, name, Partition::Test))?;
            log::info!(
                "new best test macro F1: {:.5}",
                tracker.best_test_macro_f1
            );
        }

        let checkpoint = Checkpoint {
            epoch,
            model_state: model.state_dict(),
            optimizer_state: optimizer.state_dict(),
        };
        save_checkpoint(
            &checkpoint,
            is_test_best,
            &states_dir,
            (epoch + 1).is_multiple_of(params.save_every),
            compression,
        )?;
        last_saved = Some((checkpoint, is_test_best));
    }

    // The final epoch's state is always kept as a periodic snapshot, even
    // when it never improved on the tracked bests.
    match last_saved {
        Some((checkpoint, is_test_best)) => {
            save_checkpoint(&checkpoint, is_test_best, &states_dir, true, compression)?;
        }
        None => log::warn!(
            "no epochs ran (start epoch {}, num_epochs {}); skipping terminal save",
            start_epoch,
            params.num_epochs
        ),
    }

    Ok(tracker)
}
