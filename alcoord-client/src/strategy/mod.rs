//! Selection strategies
//!
//! A strategy picks the next pool utterance for a session, never one the
//! session has already consumed.

mod least_confidence;
mod random;

pub use least_confidence::LeastConfidence;
pub use random::RandomSelection;

use crate::classifier::ClassifierState;
use crate::error::Result;
use crate::features::FeatureSpace;
use crate::pool_index::PoolIndex;
use crate::scan::{ScanEngine, ScanSettings};
use alcoord_common::protocol::Label;
use serde::Deserialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// Everything a strategy may read while selecting
pub struct SelectionContext<'a> {
    pub pool: &'a PoolIndex,
    /// Ground truth, when the dataset provides it
    pub pool_labels: Option<&'a [Label]>,
    pub consumed: &'a HashSet<String>,
    pub features: &'a FeatureSpace,
    pub classifier: &'a ClassifierState,
}

impl SelectionContext<'_> {
    fn label_of(&self, index: usize) -> Option<Label> {
        self.pool_labels.and_then(|labels| labels.get(index).copied())
    }
}

/// One selected pool line
#[derive(Debug, Clone, PartialEq)]
pub struct Selected {
    pub index: usize,
    pub utterance: String,
    pub label: Option<Label>,
}

pub trait SelectionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Fails with `PoolExhausted` once every pool line is consumed
    fn select(&self, ctx: &SelectionContext<'_>) -> Result<Selected>;
}

/// Strategy names accepted on the command line and in TOML
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum StrategyKind {
    Random,
    LeastConfidence,
}

impl StrategyKind {
    /// `pool_len` sizes the scan workers of pool-scanning strategies
    pub fn build(self, scan: ScanSettings, pool_len: usize) -> Result<Arc<dyn SelectionStrategy>> {
        Ok(match self {
            StrategyKind::Random => Arc::new(RandomSelection),
            StrategyKind::LeastConfidence => {
                Arc::new(LeastConfidence::new(ScanEngine::new(scan, pool_len)?))
            }
        })
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyKind::Random => write!(f, "random"),
            StrategyKind::LeastConfidence => write!(f, "least-confidence"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{train, TrainOptions};
    use crate::error::Error;
    use std::io::Write;

    struct Fixture {
        _file: tempfile::NamedTempFile,
        pool: PoolIndex,
        labels: Vec<Label>,
        features: FeatureSpace,
        classifier: ClassifierState,
    }

    fn fixture() -> Fixture {
        let lines = ["good good good", "bad bad bad", "good bad", "plain text"];
        let mut file = tempfile::NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        let pool = PoolIndex::build(file.path()).unwrap();

        let seed = ["good movie", "bad movie"];
        let features = FeatureSpace::fit(seed.iter().copied().chain(lines));
        let classifier = train(
            features.len(),
            &features.transform_all(&seed),
            &[1, 0],
            &[],
            &[],
            &TrainOptions::default(),
        )
        .unwrap();

        Fixture {
            _file: file,
            pool,
            labels: vec![1, 0, 1, 0],
            features,
            classifier,
        }
    }

    fn context<'a>(f: &'a Fixture, consumed: &'a HashSet<String>) -> SelectionContext<'a> {
        SelectionContext {
            pool: &f.pool,
            pool_labels: Some(&f.labels),
            consumed,
            features: &f.features,
            classifier: &f.classifier,
        }
    }

    #[test]
    fn test_random_never_returns_consumed() {
        let f = fixture();
        let consumed: HashSet<String> = ["good good good", "bad bad bad", "plain text"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        for _ in 0..20 {
            let selected = RandomSelection.select(&context(&f, &consumed)).unwrap();
            assert_eq!(selected.utterance, "good bad");
            assert_eq!(selected.index, 2);
            assert_eq!(selected.label, Some(1));
        }
    }

    #[test]
    fn test_strategies_report_exhaustion() {
        let f = fixture();
        let consumed: HashSet<String> = ["good good good", "bad bad bad", "good bad", "plain text"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let ctx = context(&f, &consumed);

        assert!(matches!(RandomSelection.select(&ctx), Err(Error::PoolExhausted)));
        let least = StrategyKind::LeastConfidence
            .build(
                ScanSettings {
                    chunk_size: 2,
                    workers: 2,
                },
                f.pool.len(),
            )
            .unwrap();
        assert!(matches!(least.select(&ctx), Err(Error::PoolExhausted)));
    }

    #[test]
    fn test_least_confidence_prefers_uncertain_lines() {
        let f = fixture();
        let consumed = HashSet::new();
        let least = LeastConfidence::new(ScanEngine::with_threads(4, 1).unwrap());
        let selected = least.select(&context(&f, &consumed)).unwrap();

        // Both carry no net evidence; the one-sided lines are far more confident
        assert!(selected.utterance == "good bad" || selected.utterance == "plain text");
        assert_eq!(selected.label, Some(f.labels[selected.index]));
    }

    #[test]
    fn test_strategy_kind_parses_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            strategy: StrategyKind,
        }
        let parsed: Wrapper = toml::from_str(r#"strategy = "least-confidence""#).unwrap();
        assert_eq!(parsed.strategy, StrategyKind::LeastConfidence);
        assert_eq!(parsed.strategy.to_string(), "least-confidence");
    }
}
