//! Dataset loading
//!
//! A data directory holds one utterance per line in `<split>.txt` and one
//! 0/1 label per line in `<split>_label.txt`:
//!
//! | File | Required |
//! |---|---|
//! | `train.txt`, `train_label.txt` | yes |
//! | `test.txt`, `test_label.txt` | yes |
//! | `pool.txt` | yes |
//! | `dev.txt`, `dev_label.txt` | no |
//! | `pool_label.txt` | simulation mode only |

use crate::error::{Error, Result};
use crate::features::FeatureSpace;
use crate::pool_index::PoolIndex;
use alcoord_common::protocol::{is_valid_label, Label};
use std::path::Path;
use tracing::info;

pub const POOL_FILE: &str = "pool.txt";
pub const POOL_LABEL_FILE: &str = "pool_label.txt";

/// Texts with their gold labels
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSplit {
    pub texts: Vec<String>,
    pub labels: Vec<Label>,
}

impl LabeledSplit {
    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    pub train: LabeledSplit,
    pub test: LabeledSplit,
    pub dev: Option<LabeledSplit>,
    pub pool: PoolIndex,
    /// Ground truth for the pool, used by simulation mode
    pub pool_labels: Option<Vec<Label>>,
}

impl Dataset {
    /// Load and validate every split under `dir`
    pub fn load(dir: &Path, require_pool_labels: bool) -> Result<Self> {
        if !dir.is_dir() {
            return Err(Error::Config(format!(
                "Data directory {} does not exist",
                dir.display()
            )));
        }

        let train = load_split(dir, "train")?;
        let test = load_split(dir, "test")?;
        let dev = if dir.join("dev.txt").exists() {
            Some(load_split(dir, "dev")?)
        } else {
            None
        };

        let pool = PoolIndex::build(&dir.join(POOL_FILE))?;

        let pool_label_path = dir.join(POOL_LABEL_FILE);
        let pool_labels = if pool_label_path.exists() {
            let labels = read_labels(&pool_label_path)?;
            if labels.len() != pool.len() {
                return Err(Error::Config(format!(
                    "{} has {} labels but {} has {} lines",
                    POOL_LABEL_FILE,
                    labels.len(),
                    POOL_FILE,
                    pool.len()
                )));
            }
            Some(labels)
        } else if require_pool_labels {
            return Err(Error::Config(format!(
                "Simulation mode requires {}",
                pool_label_path.display()
            )));
        } else {
            None
        };

        info!(
            "Loaded dataset from {}: train={} test={} dev={} pool={}{}",
            dir.display(),
            train.len(),
            test.len(),
            dev.as_ref().map_or(0, LabeledSplit::len),
            pool.len(),
            if pool_labels.is_some() { " (labeled)" } else { "" }
        );

        Ok(Self {
            train,
            test,
            dev,
            pool,
            pool_labels,
        })
    }

    /// Fit the feature space on train ∪ pool
    pub fn fit_features(&self) -> Result<FeatureSpace> {
        let mut builder = FeatureSpace::builder();
        for text in &self.train.texts {
            builder.add(text);
        }
        self.pool.for_each_line(|_, line| builder.add(line))?;
        let space = builder.build();
        if space.is_empty() {
            return Err(Error::Config(
                "Vocabulary is empty; train and pool contain no usable tokens".to_string(),
            ));
        }
        info!("Feature space: {} features", space.len());
        Ok(space)
    }
}

fn load_split(dir: &Path, name: &str) -> Result<LabeledSplit> {
    let texts = read_lines(&dir.join(format!("{}.txt", name)))?;
    let labels = read_labels(&dir.join(format!("{}_label.txt", name)))?;
    if texts.len() != labels.len() {
        return Err(Error::Config(format!(
            "{}.txt has {} lines but {}_label.txt has {}",
            name,
            texts.len(),
            name,
            labels.len()
        )));
    }
    Ok(LabeledSplit { texts, labels })
}

/// Non-empty file, one entry per line, trailing whitespace stripped
fn read_lines(path: &Path) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
    let lines: Vec<String> = content.lines().map(|l| l.trim_end().to_string()).collect();
    if lines.is_empty() {
        return Err(Error::Config(format!("{} is empty", path.display())));
    }
    Ok(lines)
}

fn read_labels(path: &Path) -> Result<Vec<Label>> {
    read_lines(path)?
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let label: Label = line.trim().parse().map_err(|_| {
                Error::Dataset(format!(
                    "{} line {}: '{}' is not an integer label",
                    path.display(),
                    i + 1,
                    line
                ))
            })?;
            if !is_valid_label(label) {
                return Err(Error::Dataset(format!(
                    "{} line {}: label {} is not 0 or 1",
                    path.display(),
                    i + 1,
                    label
                )));
            }
            Ok(label)
        })
        .collect()
}
