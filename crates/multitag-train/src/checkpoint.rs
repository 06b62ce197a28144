//! Checkpoint persistence: last, best, and periodic slots.

use crate::{TrainError, TrainResult};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

/// Compression applied to checkpoint files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CheckpointCompression {
    /// Plain JSON.
    #[default]
    None,
    /// Gzip-wrapped JSON (`.json.gz`).
    Gzip,
}

/// Everything needed to resume a run: the 0-based index of the last fully
/// completed epoch plus flattened model and optimizer state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub epoch: usize,
    pub model_state: HashMap<String, Vec<f64>>,
    pub optimizer_state: HashMap<String, Vec<f64>>,
}

fn slot_file(base: &str, compression: CheckpointCompression) -> String {
    match compression {
        CheckpointCompression::None => format!("{}.json", base),
        CheckpointCompression::Gzip => format!("{}.json.gz", base),
    }
}

fn write_checkpoint(
    checkpoint: &Checkpoint,
    path: &Path,
    compression: CheckpointCompression,
) -> TrainResult<()> {
    let json = serde_json::to_string_pretty(checkpoint)
        .map_err(|e| TrainError::Checkpoint(format!("failed to serialize checkpoint: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            TrainError::Checkpoint(format!(
                "failed to create checkpoint dir {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    match compression {
        CheckpointCompression::None => std::fs::write(path, json).map_err(|e| {
            TrainError::Checkpoint(format!("failed to write {}: {}", path.display(), e))
        }),
        CheckpointCompression::Gzip => {
            let file = File::create(path).map_err(|e| {
                TrainError::Checkpoint(format!("failed to create {}: {}", path.display(), e))
            })?;
            let mut encoder = GzEncoder::new(file, Compression::default());
            encoder.write_all(json.as_bytes()).map_err(|e| {
                TrainError::Checkpoint(format!("failed to compress checkpoint: {}", e))
            })?;
            encoder
                .finish()
                .map(|_| ())
                .map_err(|e| TrainError::Checkpoint(format!("failed to finish gzip: {}", e)))
        }
    }
}

/// Persist one epoch's checkpoint.
///
/// The `last` slot is overwritten on every call; `best` only when `is_best`
/// holds; an `epoch_<N>` snapshot (1-based, matching the metric file
/// numbering) only when `also_save_periodic` holds.
pub fn save_checkpoint(
    checkpoint: &Checkpoint,
    is_best: bool,
    dir: &Path,
    also_save_periodic: bool,
    compression: CheckpointCompression,
) -> TrainResult<()> {
    write_checkpoint(checkpoint, &dir.join(slot_file("last", compression)), compression)?;
    if is_best {
        write_checkpoint(checkpoint, &dir.join(slot_file("best", compression)), compression)?;
    }
    if also_save_periodic {
        let base = format!("epoch_{}", checkpoint.epoch + 1);
        write_checkpoint(checkpoint, &dir.join(slot_file(&base, compression)), compression)?;
    }
    Ok(())
}

/// Read a checkpoint back; `.gz` paths are decompressed transparently.
/// A missing file is fatal.
pub fn load_checkpoint(path: &Path) -> TrainResult<Checkpoint> {
    let json = if path.extension().is_some_and(|ext| ext == "gz") {
        let file = File::open(path).map_err(|e| {
            TrainError::Checkpoint(format!("no checkpoint at {}: {}", path.display(), e))
        })?;
        let mut decoder = GzDecoder::new(file);
        let mut json = String::new();
        decoder.read_to_string(&mut json).map_err(|e| {
            TrainError::Checkpoint(format!("failed to decompress {}: {}", path.display(), e))
        })?;
        json
    } else {
        std::fs::read_to_string(path).map_err(|e| {
            TrainError::Checkpoint(format!("no checkpoint at {}: {}", path.display(), e))
        })?
    };

    serde_json::from_str(&json).map_err(|e| {
        TrainError::Checkpoint(format!("malformed checkpoint {}: {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env::temp_dir;

    fn sample_checkpoint(epoch: usize) -> Checkpoint {
        let mut model_state = HashMap::new();
        model_state.insert("weight".to_string(), vec![0.1, 0.2, 0.3]);
        let mut optimizer_state = HashMap::new();
        optimizer_state.insert("t".to_string(), vec![3.0]);
        Checkpoint {
            epoch,
            model_state,
            optimizer_state,
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = temp_dir().join("multitag_test_ckpt_roundtrip");
        let checkpoint = sample_checkpoint(4);
        save_checkpoint(&checkpoint, false, &dir, false, CheckpointCompression::None).unwrap();

        let loaded = load_checkpoint(&dir.join("last.json")).unwrap();
        assert_eq!(loaded, checkpoint);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_best_and_periodic_slots() {
        let dir = temp_dir().join("multitag_test_ckpt_slots");
        let checkpoint = sample_checkpoint(1);
        save_checkpoint(&checkpoint, true, &dir, true, CheckpointCompression::None).unwrap();

        assert!(dir.join("last.json").exists());
        assert!(dir.join("best.json").exists());
        assert!(dir.join("epoch_2.json").exists());

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_best_not_written_without_improvement() {
        let dir = temp_dir().join("multitag_test_ckpt_nobest");
        let checkpoint = sample_checkpoint(0);
        save_checkpoint(&checkpoint, false, &dir, false, CheckpointCompression::None).unwrap();

        assert!(dir.join("last.json").exists());
        assert!(!dir.join("best.json").exists());

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_gzip_roundtrip() {
        let dir = temp_dir().join("multitag_test_ckpt_gzip");
        let checkpoint = sample_checkpoint(7);
        save_checkpoint(&checkpoint, false, &dir, false, CheckpointCompression::Gzip).unwrap();

        let path = dir.join("last.json.gz");
        assert!(path.exists());
        let loaded = load_checkpoint(&path).unwrap();
        assert_eq!(loaded, checkpoint);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_missing_checkpoint_is_fatal() {
        let err = load_checkpoint(Path::new("/nonexistent/last.json")).unwrap_err();
        assert!(matches!(err, TrainError::Checkpoint(_)));
    }
}
