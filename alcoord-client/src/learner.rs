//! Learner: labeled set, consumed set and local persistence
//!
//! Every incorporated label is appended to `labels.jsonl` in the session
//! directory before it touches memory. On startup the file is replayed, so
//! a restarted client resumes at its previous count with the same
//! consumed set and an identically retrained classifier.

use crate::classifier::{self, ClassifierState, TrainOptions};
use crate::dataset::{Dataset, LabeledSplit};
use crate::error::{Error, Result};
use crate::features::{FeatureSpace, SparseVector};
use crate::metrics::Scores;
use alcoord_common::protocol::{is_valid_label, Label};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub const LABELS_FILE: &str = "labels.jsonl";

/// One annotated utterance; immutable once recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabeledInstance {
    pub utterance: String,
    pub label: Label,
    /// Seconds spent selecting this utterance, when measured locally
    #[serde(default)]
    pub al_time: Option<f64>,
    /// Seconds between the server push and receipt
    #[serde(default)]
    pub io_time: Option<f64>,
    pub created_at: DateTime<Utc>,
}

impl LabeledInstance {
    pub fn new(utterance: impl Into<String>, label: Label) -> Self {
        Self {
            utterance: utterance.into(),
            label,
            al_time: None,
            io_time: None,
            created_at: alcoord_common::time::now(),
        }
    }
}

/// Append-only JSON-lines file of labeled instances
#[derive(Debug, Clone)]
pub struct LabelStore {
    path: PathBuf,
}

impl LabelStore {
    /// Open the store in `dir`, creating the directory if needed
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            path: dir.join(LABELS_FILE),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<LabeledInstance>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(&self.path)?);
        let mut instances = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let instance: LabeledInstance = serde_json::from_str(&line).map_err(|e| {
                Error::Dataset(format!("{} line {}: {}", self.path.display(), i + 1, e))
            })?;
            if !is_valid_label(instance.label) {
                return Err(Error::Dataset(format!(
                    "{} line {}: label {} is not 0 or 1",
                    self.path.display(),
                    i + 1,
                    instance.label
                )));
            }
            instances.push(instance);
        }
        Ok(instances)
    }

    pub fn append(&self, instance: &LabeledInstance) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut line = serde_json::to_string(instance)?;
        line.push('\n');
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

/// Output of one retrain
#[derive(Debug, Clone)]
pub struct Trained {
    pub classifier: ClassifierState,
    pub scores: Scores,
    pub dev_scores: Option<Scores>,
}

/// Owned inputs of one full retrain, runnable off the async runtime
#[derive(Debug, Clone)]
pub struct TrainingJob {
    dim: usize,
    seed: Arc<Vectors>,
    extra_x: Arc<Vec<SparseVector>>,
    extra_y: Arc<Vec<Label>>,
    test: Arc<Vectors>,
    dev: Option<Arc<Vectors>>,
    options: TrainOptions,
}

impl TrainingJob {
    pub fn run(&self) -> Result<Trained> {
        let classifier = classifier::train(
            self.dim,
            &self.seed.x,
            &self.seed.y,
            &self.extra_x,
            &self.extra_y,
            &self.options,
        )?;
        let scores = classifier::score(&classifier, &self.test.x, &self.test.y);
        let dev_scores = self
            .dev
            .as_ref()
            .map(|dev| classifier::score(&classifier, &dev.x, &dev.y));
        Ok(Trained {
            classifier,
            scores,
            dev_scores,
        })
    }
}

/// Read-only view handed to a selection
#[derive(Clone)]
pub struct LearnerSnapshot {
    pub features: Arc<FeatureSpace>,
    pub classifier: Arc<ClassifierState>,
    pub consumed: Arc<HashSet<String>>,
}

#[derive(Debug)]
struct Vectors {
    x: Vec<SparseVector>,
    y: Vec<Label>,
}

impl Vectors {
    fn of(features: &FeatureSpace, split: &LabeledSplit) -> Self {
        Self {
            x: features.transform_all(&split.texts),
            y: split.labels.clone(),
        }
    }
}

pub struct Learner {
    features: Arc<FeatureSpace>,
    seed: Arc<Vectors>,
    test: Arc<Vectors>,
    dev: Option<Arc<Vectors>>,
    labeled: Vec<LabeledInstance>,
    extra_x: Arc<Vec<SparseVector>>,
    extra_y: Arc<Vec<Label>>,
    consumed: Arc<HashSet<String>>,
    classifier: Arc<ClassifierState>,
    scores: Scores,
    dev_scores: Option<Scores>,
    store: LabelStore,
    options: TrainOptions,
}

impl Learner {
    /// Build the seed set, replay persisted labels and train
    pub fn open(
        dataset: &Dataset,
        features: Arc<FeatureSpace>,
        session_dir: &Path,
        options: TrainOptions,
    ) -> Result<Self> {
        let store = LabelStore::open(session_dir)?;

        let mut labeled = Vec::new();
        let mut consumed = HashSet::new();
        let mut extra_x = Vec::new();
        let mut extra_y = Vec::new();
        for instance in store.load()? {
            if !consumed.insert(instance.utterance.clone()) {
                warn!(
                    "Ignoring duplicate persisted label for '{}'",
                    instance.utterance
                );
                continue;
            }
            extra_x.push(features.transform(&instance.utterance));
            extra_y.push(instance.label);
            labeled.push(instance);
        }
        if !labeled.is_empty() {
            info!(
                "Restored {} labels from {}",
                labeled.len(),
                store.path().display()
            );
        }

        let seed = Arc::new(Vectors::of(&features, &dataset.train));
        let test = Arc::new(Vectors::of(&features, &dataset.test));
        let dev = dataset
            .dev
            .as_ref()
            .map(|split| Arc::new(Vectors::of(&features, split)));

        let extra_x = Arc::new(extra_x);
        let extra_y = Arc::new(extra_y);
        let trained = TrainingJob {
            dim: features.len(),
            seed: Arc::clone(&seed),
            extra_x: Arc::clone(&extra_x),
            extra_y: Arc::clone(&extra_y),
            test: Arc::clone(&test),
            dev: dev.clone(),
            options: options.clone(),
        }
        .run()?;

        Ok(Self {
            features,
            seed,
            test,
            dev,
            labeled,
            extra_x,
            extra_y,
            consumed: Arc::new(consumed),
            classifier: Arc::new(trained.classifier),
            scores: trained.scores,
            dev_scores: trained.dev_scores,
            store,
            options,
        })
    }

    /// Number of labels incorporated so far
    pub fn count(&self) -> u64 {
        self.labeled.len() as u64
    }

    pub fn scores(&self) -> Scores {
        self.scores
    }

    pub fn dev_scores(&self) -> Option<Scores> {
        self.dev_scores
    }

    pub fn labeled(&self) -> &[LabeledInstance] {
        &self.labeled
    }

    pub fn is_consumed(&self, utterance: &str) -> bool {
        self.consumed.contains(utterance)
    }

    pub fn classifier(&self) -> &ClassifierState {
        &self.classifier
    }

    pub fn snapshot(&self) -> LearnerSnapshot {
        LearnerSnapshot {
            features: Arc::clone(&self.features),
            classifier: Arc::clone(&self.classifier),
            consumed: Arc::clone(&self.consumed),
        }
    }

    /// Persist and append a label without retraining
    ///
    /// Returns false (and records nothing) for an utterance that is already
    /// consumed.
    pub fn record(&mut self, instance: LabeledInstance) -> Result<bool> {
        if !is_valid_label(instance.label) {
            return Err(Error::Training(format!(
                "Label {} is not 0 or 1",
                instance.label
            )));
        }
        if self.consumed.contains(&instance.utterance) {
            return Ok(false);
        }

        self.store.append(&instance)?;

        Arc::make_mut(&mut self.consumed).insert(instance.utterance.clone());
        Arc::make_mut(&mut self.extra_x).push(self.features.transform(&instance.utterance));
        Arc::make_mut(&mut self.extra_y).push(instance.label);
        self.labeled.push(instance);
        Ok(true)
    }

    pub fn training_job(&self) -> TrainingJob {
        TrainingJob {
            dim: self.features.len(),
            seed: Arc::clone(&self.seed),
            extra_x: Arc::clone(&self.extra_x),
            extra_y: Arc::clone(&self.extra_y),
            test: Arc::clone(&self.test),
            dev: self.dev.clone(),
            options: self.options.clone(),
        }
    }

    pub fn install(&mut self, trained: Trained) {
        self.classifier = Arc::new(trained.classifier);
        self.scores = trained.scores;
        self.dev_scores = trained.dev_scores;
    }

    /// Record and retrain in place
    pub fn incorporate(&mut self, instance: LabeledInstance) -> Result<bool> {
        if !self.record(instance)? {
            return Ok(false);
        }
        let trained = self.training_job().run()?;
        self.install(trained);
        Ok(true)
    }
}
