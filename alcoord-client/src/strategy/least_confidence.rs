use super::{Selected, SelectionContext, SelectionStrategy};
use crate::error::Result;
use crate::scan::{ScanEngine, TrainedModel};
use tracing::debug;

/// Uncertainty sampling: the pool line whose max class probability is lowest
#[derive(Debug)]
pub struct LeastConfidence {
    engine: ScanEngine,
}

impl LeastConfidence {
    pub fn new(engine: ScanEngine) -> Self {
        Self { engine }
    }
}

impl SelectionStrategy for LeastConfidence {
    fn name(&self) -> &'static str {
        "least-confidence"
    }

    fn select(&self, ctx: &SelectionContext<'_>) -> Result<Selected> {
        let model = TrainedModel {
            features: ctx.features,
            classifier: ctx.classifier,
        };
        let candidate = self
            .engine
            .least_confident(ctx.pool, &model, ctx.consumed)?;
        debug!(
            "Least confident: line {} at {:.4}",
            candidate.index, candidate.confidence
        );
        Ok(Selected {
            index: candidate.index,
            label: ctx.label_of(candidate.index),
            utterance: candidate.utterance,
        })
    }
}
