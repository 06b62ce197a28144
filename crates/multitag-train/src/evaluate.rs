//! Gradient-free evaluation of one partition.

use crate::accumulate::{binarize, EpochAccumulator};
use crate::data::DataLoader;
use crate::device::DeviceContext;
use crate::loss::Loss;
use crate::metrics::MetricRegistry;
use crate::model::Model;
use crate::params::Params;
use crate::summary::MetricsSummary;
use crate::{TrainError, TrainResult};

/// Run a full forward pass over a partition and compute its metrics summary.
///
/// No gradients are computed and no state is mutated beyond the model's
/// train/eval flag. `epoch` keys the loader's deterministic visit order.
#[allow(clippy::too_many_arguments)]
pub fn evaluate(
    model: &mut dyn Model,
    loss_fn: &dyn Loss,
    loader: &DataLoader,
    params: &Params,
    registry: &MetricRegistry,
    device: &mut DeviceContext,
    target_names: &[String],
    epoch: usize,
) -> TrainResult<MetricsSummary> {
    model.train_mode(false);

    let mut batch_losses = Vec::new();
    let mut accumulator = EpochAccumulator::new();

    for batch in loader.batches(epoch) {
        let scores = model.forward(&batch.documents)?;
        let loss = loss_fn.compute(&scores.view(), &batch.targets.view())?;
        batch_losses.push(loss);

        let outputs = binarize(&scores.view(), params.threshold);
        let targets = batch.targets.mapv(|t| t as i32);
        accumulator.update(&outputs.view(), &targets.view())?;

        device.track((scores.len() + batch.targets.len()) * std::mem::size_of::<f64>());
        device.reclaim();
    }

    if batch_losses.is_empty() {
        return Err(TrainError::Data(
            "evaluation partition yielded no batches".into(),
        ));
    }

    let (outputs, targets) = accumulator.finalize()?;
    let mut summary = registry.compute(&outputs.view(), &targets.view(), target_names)?;
    summary.insert_scalar(
        "loss_avg",
        batch_losses.iter().sum::<f64>() / batch_losses.len() as f64,
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::TextDataset;
    use crate::loss::BceLoss;
    use crate::model::HashingClassifier;
    use crate::Device;
    use ndarray::Array2;

    fn toy_loader() -> DataLoader {
        let documents = vec![
            "alpha beta".to_string(),
            "beta gamma".to_string(),
            "gamma delta".to_string(),
        ];
        let targets = Array2::from_shape_vec(
            (3, 2),
            vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0],
        )
        .unwrap();
        let dataset =
            TextDataset::from_parts(documents, targets, vec!["x".into(), "y".into()]).unwrap();
        DataLoader::new(dataset, 2, false, 47)
    }

    #[test]
    fn test_evaluate_produces_loss_and_f1() {
        let loader = toy_loader();
        let mut model = HashingClassifier::new(64, 2, 16, 47);
        let loss_fn = BceLoss::default();
        let registry = MetricRegistry::standard();
        let mut device = DeviceContext::new(Device::Cpu);
        let names = loader.dataset().label_names().to_vec();
        let params = Params::default();

        let summary = evaluate(
            &mut model,
            &loss_fn,
            &loader,
            &params,
            &registry,
            &mut device,
            &names,
            0,
        )
        .unwrap();

        assert!(summary.loss_avg().unwrap() > 0.0);
        let macro_f1 = summary.macro_f1().unwrap();
        assert!((0.0..=1.0).contains(&macro_f1));
        // One reclamation hint per batch.
        assert_eq!(device.stats().reclaim_count, 2);
        assert!(!model.is_training());
    }

    #[test]
    fn test_empty_partition_is_fatal() {
        let dataset = TextDataset::from_parts(
            Vec::new(),
            Array2::zeros((0, 2)),
            vec!["x".into(), "y".into()],
        )
        .unwrap();
        let loader = DataLoader::new(dataset, 2, false, 47);
        let mut model = HashingClassifier::new(64, 2, 16, 47);
        let loss_fn = BceLoss::default();
        let registry = MetricRegistry::standard();
        let mut device = DeviceContext::new(Device::Cpu);
        let params = Params::default();

        let err = evaluate(
            &mut model,
            &loss_fn,
            &loader,
            &params,
            &registry,
            &mut device,
            &["x".to_string(), "y".to_string()],
            0,
        )
        .unwrap_err();
        assert!(matches!(err, TrainError::Data(_)));
    }
}
