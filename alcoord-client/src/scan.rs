//! Parallel scan engine
//!
//! Partitions the pool into contiguous chunks of `chunk_size` lines and
//! scores them on a dedicated rayon pool. Each chunk opens its own pool
//! handle and returns its locally least-confident unconsumed line. The
//! reduction walks chunks in index order and only replaces the running
//! minimum on a strictly lower confidence, so the outcome does not depend
//! on the thread count.

use crate::classifier::ClassifierState;
use crate::error::{Error, Result};
use crate::features::FeatureSpace;
use crate::pool_index::PoolIndex;
use rayon::prelude::*;
use rayon::ThreadPool;
use std::collections::HashSet;
use tracing::debug;

pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Per-utterance confidence under a fixed model
///
/// Implementations are shared read-only by every worker.
pub trait ConfidenceModel: Sync {
    fn confidence(&self, utterance: &str) -> Result<f64>;
}

/// The session's current classifier over the frozen feature space
pub struct TrainedModel<'a> {
    pub features: &'a FeatureSpace,
    pub classifier: &'a ClassifierState,
}

impl ConfidenceModel for TrainedModel<'_> {
    fn confidence(&self, utterance: &str) -> Result<f64> {
        let confidence = self
            .classifier
            .confidence(&self.features.transform(utterance));
        if confidence.is_finite() {
            Ok(confidence)
        } else {
            Err(Error::Scan(format!(
                "non-finite confidence for '{}'",
                utterance
            )))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanSettings {
    /// Lines per chunk
    pub chunk_size: usize,
    /// Requested workers; 0 = hardware concurrency
    pub workers: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            workers: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Pool line number
    pub index: usize,
    pub utterance: String,
    pub confidence: f64,
}

/// `[start, end)` line ranges of each chunk; the last may be shorter
pub fn chunk_bounds(pool_len: usize, chunk_size: usize) -> Vec<(usize, usize)> {
    let chunk_size = chunk_size.max(1);
    (0..pool_len)
        .step_by(chunk_size)
        .map(|start| (start, (start + chunk_size).min(pool_len)))
        .collect()
}

/// Threads actually started: never above hardware concurrency or the
/// number of chunks, never below one
pub fn effective_workers(requested: usize, chunks: usize) -> usize {
    let hardware = num_cpus::get().max(1);
    let requested = if requested == 0 { hardware } else { requested };
    requested.min(hardware).min(chunks).max(1)
}

/// A fixed rayon pool plus the chunking it applies to every scan
#[derive(Debug)]
pub struct ScanEngine {
    threads: ThreadPool,
    chunk_size: usize,
}

impl ScanEngine {
    /// Size the pool for a corpus of `pool_len` lines
    pub fn new(settings: ScanSettings, pool_len: usize) -> Result<Self> {
        let chunks = chunk_bounds(pool_len, settings.chunk_size).len();
        Self::with_threads(
            effective_workers(settings.workers, chunks),
            settings.chunk_size,
        )
    }

    /// Exactly `threads` workers, uncapped
    pub fn with_threads(threads: usize, chunk_size: usize) -> Result<Self> {
        let threads = rayon::ThreadPoolBuilder::new()
            .num_threads(threads.max(1))
            .thread_name(|i| format!("alcoord-scan-{}", i))
            .build()
            .map_err(|e| Error::Scan(format!("cannot start scan workers: {}", e)))?;
        Ok(Self {
            threads,
            chunk_size: chunk_size.max(1),
        })
    }

    pub fn threads(&self) -> usize {
        self.threads.current_num_threads()
    }

    /// Least-confident unconsumed utterance over the whole pool
    ///
    /// Any chunk failure fails the scan. Returns `PoolExhausted` when every
    /// line is in `consumed`.
    pub fn least_confident<M: ConfidenceModel>(
        &self,
        pool: &PoolIndex,
        model: &M,
        consumed: &HashSet<String>,
    ) -> Result<Candidate> {
        let chunks = chunk_bounds(pool.len(), self.chunk_size);
        debug!(
            "Scanning {} lines in {} chunks on {} threads",
            pool.len(),
            chunks.len(),
            self.threads()
        );

        // Collected in chunk order
        let minima: Vec<Option<Candidate>> = self.threads.install(|| {
            chunks
                .par_iter()
                .map(|&(start, end)| scan_chunk(pool, model, consumed, start, end))
                .collect::<Result<Vec<_>>>()
        })?;

        let mut best: Option<Candidate> = None;
        for candidate in minima.into_iter().flatten() {
            if best
                .as_ref()
                .map_or(true, |b| candidate.confidence < b.confidence)
            {
                best = Some(candidate);
            }
        }

        best.ok_or(Error::PoolExhausted)
    }
}

/// Locally least-confident unconsumed line of `[start, end)`
fn scan_chunk<M: ConfidenceModel>(
    pool: &PoolIndex,
    model: &M,
    consumed: &HashSet<String>,
    start: usize,
    end: usize,
) -> Result<Option<Candidate>> {
    let mut reader = pool.reader()?;
    let lines = reader.read_range(start, end)?;

    let mut best: Option<Candidate> = None;
    for (offset, line) in lines.into_iter().enumerate() {
        if consumed.contains(&line) {
            continue;
        }
        let confidence = model.confidence(&line)?;
        if best.as_ref().map_or(true, |b| confidence < b.confidence) {
            best = Some(Candidate {
                index: start + offset,
                utterance: line,
                confidence,
            });
        }
    }
    Ok(best)
}
