//! Command-line entry point for multitag training runs.

use anyhow::{bail, Context, Result};
use clap::Parser;
use multitag_train::{
    train_and_evaluate, AdamConfig, AdamOptimizer, BceLoss, CheckpointCompression, DataLoader,
    Device, DeviceContext, HashingClassifier, MemoryStats, MetricRegistry, Params, TextDataset,
};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "multitag", about = "Train a multi-label text classifier")]
struct Cli {
    /// Run name; namespaces metrics and model states inside the experiment dir.
    #[arg(short, long)]
    name: String,

    /// Directories containing `train/` and `test/` document subdirectories.
    #[arg(short, long = "data-dirs", num_args = 1.., default_values = ["data/"])]
    data_dirs: Vec<PathBuf>,

    /// JSON files mapping document ids to their label lists.
    #[arg(short, long = "targets-paths", num_args = 1.., default_values = ["targets/targets.json"])]
    targets_paths: Vec<PathBuf>,

    /// Experiment directory holding params and receiving metrics and model states.
    #[arg(short = 'x', long, default_value = "experiments/")]
    exp_dir: PathBuf,

    /// Params file name inside `<exp-dir>/params/`.
    #[arg(short, long, default_value = "params.json")]
    params: String,

    /// Compute device to run on.
    #[arg(long, default_value = "cpu")]
    device: String,

    /// Restore-point name, resolved at the experiment root.
    #[arg(short, long)]
    restore_file: Option<String>,

    /// Path to a JSON array of label names to restrict the target space to.
    #[arg(short, long)]
    unique_labels: Option<PathBuf>,

    /// Model variant to train.
    #[arg(short, long, default_value = "hashing-bow")]
    model: String,

    /// Write gzip-compressed checkpoints.
    #[arg(long)]
    compress_checkpoints: bool,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    if let Err(e) = run() {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();

    if cli.device != "cpu" {
        log::warn!(
            "no support for device '{}' compiled in; switching to cpu",
            cli.device
        );
    }
    let mut device = DeviceContext::new(Device::Cpu);

    let params_path = cli.exp_dir.join("params").join(&cli.params);
    let params = Params::from_file(&params_path)?;
    log::info!("loaded params from {}", params_path.display());

    let label_subset: Option<Vec<String>> = match &cli.unique_labels {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("cannot read label subset {}", path.display()))?;
            Some(
                serde_json::from_str(&json)
                    .with_context(|| format!("malformed label subset {}", path.display()))?,
            )
        }
        None => None,
    };

    let train_dirs: Vec<PathBuf> = cli.data_dirs.iter().map(|d| d.join("train")).collect();
    let test_dirs: Vec<PathBuf> = cli.data_dirs.iter().map(|d| d.join("test")).collect();

    let train_dataset =
        TextDataset::from_dirs(&train_dirs, &cli.targets_paths, label_subset.as_deref())?;
    let test_dataset =
        TextDataset::from_dirs(&test_dirs, &cli.targets_paths, label_subset.as_deref())?;

    let target_names = train_dataset.label_names().to_vec();
    log::info!(
        "training on {} documents, evaluating on {}, {} labels",
        train_dataset.len(),
        test_dataset.len(),
        target_names.len()
    );

    if cli.model != "hashing-bow" {
        bail!("unknown model variant '{}'", cli.model);
    }
    let mut model = HashingClassifier::new(
        params.num_features,
        target_names.len(),
        params.max_length,
        params.seed,
    );

    let mut optimizer = AdamOptimizer::new(AdamConfig {
        learning_rate: params.learning_rate,
        ..AdamConfig::default()
    });
    let loss_fn = BceLoss::default();
    let registry = MetricRegistry::standard();

    let train_loader = DataLoader::new(train_dataset, params.batch_size, true, params.seed);
    let test_loader = DataLoader::new(test_dataset, params.batch_size, true, params.seed);

    let compression = if cli.compress_checkpoints {
        CheckpointCompression::Gzip
    } else {
        CheckpointCompression::None
    };

    let tracker = train_and_evaluate(
        &mut model,
        &mut optimizer,
        &loss_fn,
        &train_loader,
        &test_loader,
        &params,
        &registry,
        &cli.exp_dir,
        &cli.name,
        &mut device,
        &target_names,
        cli.restore_file.as_deref(),
        compression,
    )?;

    log::info!(
        "run complete: best test macro F1 {:.5}, best train macro F1 {:.5}, peak batch memory {}",
        tracker.best_test_macro_f1,
        tracker.best_train_macro_f1,
        MemoryStats::format_bytes(device.stats().peak_bytes)
    );
    Ok(())
}
