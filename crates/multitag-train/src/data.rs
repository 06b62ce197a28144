//! Text dataset construction and batch iteration.

use crate::{TrainError, TrainResult};
use ndarray::Array2;
use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

/// In-memory corpus: raw documents with fixed-width multi-hot targets.
#[derive(Debug, Clone)]
pub struct TextDataset {
    documents: Vec<String>,
    targets: Array2<f64>,
    label_names: Vec<String>,
}

impl TextDataset {
    /// Build a partition from document directories and target files.
    ///
    /// Each directory holds `<doc_id>.txt` files; each targets file is a
    /// JSON object mapping a doc id to its list of label names. The label
    /// set is the sorted union over every targets file unless an explicit
    /// subset is given, in which case labels outside the subset are dropped
    /// from the targets. Documents without a targets entry are skipped with
    /// a warning.
    pub fn from_dirs(
        data_dirs: &[PathBuf],
        targets_paths: &[PathBuf],
        label_subset: Option<&[String]>,
    ) -> TrainResult<Self> {
        let mut target_map: HashMap<String, Vec<String>> = HashMap::new();
        for path in targets_paths {
            let json = std::fs::read_to_string(path).map_err(|e| {
                TrainError::Data(format!("no targets file at {}: {}", path.display(), e))
            })?;
            let parsed: HashMap<String, Vec<String>> =
                serde_json::from_str(&json).map_err(|e| {
                    TrainError::Data(format!("malformed targets file {}: {}", path.display(), e))
                })?;
            target_map.extend(parsed);
        }

        let label_names: Vec<String> = match label_subset {
            Some(subset) => subset.to_vec(),
            None => target_map
                .values()
                .flatten()
                .cloned()
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
        };
        if label_names.is_empty() {
            return Err(TrainError::Data("target label set is empty".into()));
        }
        let label_index: HashMap<&str, usize> = label_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut documents = Vec::new();
        let mut target_rows: Vec<f64> = Vec::new();
        for dir in data_dirs {
            let entries = std::fs::read_dir(dir).map_err(|e| {
                TrainError::Data(format!("cannot read data dir {}: {}", dir.display(), e))
            })?;
            // Sorted scan so the corpus order is stable across platforms.
            let mut paths: Vec<PathBuf> = entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().is_some_and(|ext| ext == "txt"))
                .collect();
            paths.sort();

            for path in paths {
                let Some(doc_id) = path.file_stem().and_then(|s| s.to_str()) else {
                    continue;
                };
                let Some(labels) = target_map.get(doc_id) else {
                    log::warn!("no targets for document '{}'; skipping", doc_id);
                    continue;
                };
                let text = std::fs::read_to_string(&path).map_err(|e| {
                    TrainError::Data(format!("cannot read {}: {}", path.display(), e))
                })?;

                let mut row = vec![0.0; label_names.len()];
                for label in labels {
                    if let Some(&j) = label_index.get(label.as_str()) {
                        row[j] = 1.0;
                    }
                }
                documents.push(text);
                target_rows.extend(row);
            }
        }

        if documents.is_empty() {
            return Err(TrainError::Data(format!(
                "no labeled documents found under {:?}",
                data_dirs
            )));
        }

        let targets = Array2::from_shape_vec((documents.len(), label_names.len()), target_rows)
            .map_err(|e| TrainError::Data(format!("target matrix construction failed: {}", e)))?;

        Ok(Self {
            documents,
            targets,
            label_names,
        })
    }

    /// Construct directly from in-memory parts.
    pub fn from_parts(
        documents: Vec<String>,
        targets: Array2<f64>,
        label_names: Vec<String>,
    ) -> TrainResult<Self> {
        if documents.len() != targets.nrows() {
            return Err(TrainError::Data(format!(
                "{} documents but {} target rows",
                documents.len(),
                targets.nrows()
            )));
        }
        if label_names.len() != targets.ncols() {
            return Err(TrainError::Data(format!(
                "{} label names but {} target columns",
                label_names.len(),
                targets.ncols()
            )));
        }
        Ok(Self {
            documents,
            targets,
            label_names,
        })
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn num_labels(&self) -> usize {
        self.label_names.len()
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }
}

/// One batch of raw documents with their multi-hot target rows.
#[derive(Debug, Clone)]
pub struct Batch {
    pub documents: Vec<String>,
    pub targets: Array2<f64>,
}

/// Batches a dataset, reshuffling deterministically per epoch.
///
/// The visit order for epoch `e` is a pure function of `(seed, e)`, so a run
/// resumed from a checkpoint walks the same batches an uninterrupted run
/// would have.
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: TextDataset,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
}

impl DataLoader {
    pub fn new(dataset: TextDataset, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        Self {
            dataset,
            batch_size: batch_size.max(1),
            shuffle,
            seed,
        }
    }

    pub fn dataset(&self) -> &TextDataset {
        &self.dataset
    }

    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Iterate one full pass for the given epoch.
    pub fn batches(&self, epoch: usize) -> BatchIter<'_> {
        let mut order: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            // Fisher-Yates driven by an LCG seeded from (seed, epoch).
            let mut state = self
                .seed
                .wrapping_add((epoch as u64).wrapping_mul(0x9e3779b97f4a7c15));
            for i in (1..order.len()).rev() {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
                let j = (state % (i as u64 + 1)) as usize;
                order.swap(i, j);
            }
        }
        BatchIter {
            loader: self,
            order,
            cursor: 0,
        }
    }
}

/// Iterator over one epoch's batches.
pub struct BatchIter<'a> {
    loader: &'a DataLoader,
    order: Vec<usize>,
    cursor: usize,
}

impl Iterator for BatchIter<'_> {
    type Item = Batch;

    fn next(&mut self) -> Option<Batch> {
        if self.cursor >= self.order.len() {
            return None;
        }
        let end = (self.cursor + self.loader.batch_size).min(self.order.len());
        let indices = &self.order[self.cursor..end];
        self.cursor = end;

        let dataset = &self.loader.dataset;
        let documents = indices
            .iter()
            .map(|&i| dataset.documents[i].clone())
            .collect();
        let mut targets = Array2::zeros((indices.len(), dataset.num_labels()));
        for (row, &i) in indices.iter().enumerate() {
            targets.row_mut(row).assign(&dataset.targets.row(i));
        }
        Some(Batch { documents, targets })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::env::temp_dir;

    fn toy_dataset(n: usize) -> TextDataset {
        let documents = (0..n).map(|i| format!("doc number {}", i)).collect();
        let targets = Array2::from_shape_fn((n, 2), |(i, j)| ((i + j) % 2) as f64);
        TextDataset::from_parts(documents, targets, vec!["a".into(), "b".into()]).unwrap()
    }

    #[test]
    fn test_batch_sizes_cover_all_rows() {
        let loader = DataLoader::new(toy_dataset(10), 3, false, 47);
        let sizes: Vec<usize> = loader.batches(0).map(|b| b.documents.len()).collect();
        assert_eq!(sizes, vec![3, 3, 3, 1]);
        assert_eq!(loader.num_batches(), 4);
    }

    #[test]
    fn test_epoch_order_is_deterministic() {
        let loader = DataLoader::new(toy_dataset(12), 4, true, 47);
        let first: Vec<Vec<String>> = loader.batches(3).map(|b| b.documents).collect();
        let second: Vec<Vec<String>> = loader.batches(3).map(|b| b.documents).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_epochs_shuffle_differently() {
        let loader = DataLoader::new(toy_dataset(12), 12, true, 47);
        let a = loader.batches(0).next().unwrap().documents;
        let b = loader.batches(1).next().unwrap().documents;
        assert_ne!(a, b);
    }

    #[test]
    fn test_unshuffled_order_matches_dataset() {
        let loader = DataLoader::new(toy_dataset(4), 2, false, 47);
        let batch = loader.batches(0).next().unwrap();
        assert_eq!(batch.documents[0], "doc number 0");
        assert_eq!(batch.documents[1], "doc number 1");
        assert_eq!(batch.targets, array![[0.0, 1.0], [1.0, 0.0]]);
    }

    #[test]
    fn test_from_parts_row_mismatch() {
        let err = TextDataset::from_parts(
            vec!["one".into()],
            Array2::zeros((2, 2)),
            vec!["a".into(), "b".into()],
        )
        .unwrap_err();
        assert!(matches!(err, TrainError::Data(_)));
    }

    #[test]
    fn test_from_dirs_reads_documents_and_targets() {
        let root = temp_dir().join("multitag_test_from_dirs");
        let docs = root.join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("d1.txt"), "alpha beta").unwrap();
        std::fs::write(docs.join("d2.txt"), "gamma").unwrap();
        std::fs::write(docs.join("unlabeled.txt"), "ignored").unwrap();
        let targets_path = root.join("targets.json");
        std::fs::write(
            &targets_path,
            r#"{"d1": ["x", "y"], "d2": ["y"]}"#,
        )
        .unwrap();

        let dataset =
            TextDataset::from_dirs(&[docs], &[targets_path], None).unwrap();
        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.label_names(), &["x".to_string(), "y".to_string()]);
        // d1 sorts first: both labels set; d2 only "y".
        assert_eq!(dataset.targets.row(0).to_vec(), vec![1.0, 1.0]);
        assert_eq!(dataset.targets.row(1).to_vec(), vec![0.0, 1.0]);

        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_label_subset_drops_other_labels() {
        let root = temp_dir().join("multitag_test_label_subset");
        let docs = root.join("docs");
        std::fs::create_dir_all(&docs).unwrap();
        std::fs::write(docs.join("d1.txt"), "alpha").unwrap();
        let targets_path = root.join("targets.json");
        std::fs::write(&targets_path, r#"{"d1": ["x", "y"]}"#).unwrap();

        let subset = vec!["y".to_string()];
        let dataset =
            TextDataset::from_dirs(&[docs], &[targets_path], Some(&subset)).unwrap();
        assert_eq!(dataset.num_labels(), 1);
        assert_eq!(dataset.targets.row(0).to_vec(), vec![1.0]);

        std::fs::remove_dir_all(root).ok();
    }
}
