//! Client session state machine
//!
//! ```text
//! Disconnected → Connecting → Registered → AwaitingAnnotation ⇄ (next cycle)
//!                                   └──────────────┴──→ Finished
//! ```
//!
//! The learner sits behind one async mutex. A selection+train cycle holds
//! it from start to finish, so two cycles never interleave. CPU-bound work
//! (selection scans, retraining) runs on the blocking pool.
//!
//! Simulation runs on the same events as a human-annotated session: the
//! selection carries its ground-truth label and the server echoes it back
//! as an `annotation` once the instance is stored. A label is therefore
//! only learned after the server has persisted it.

use crate::error::{Error, Result};
use crate::learner::{LabeledInstance, Learner};
use crate::pool_index::PoolIndex;
use crate::strategy::{Selected, SelectionContext, SelectionStrategy};
use alcoord_common::protocol::Label;
use alcoord_common::time::{elapsed_seconds, unix_seconds};
use alcoord_common::{ClientMessage, ServerMessage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Registered,
    AwaitingAnnotation,
    /// Terminal; no automatic restart
    Finished,
}

/// Identity and mode of a session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub project_name: String,
    pub model_name: String,
    /// Label selections from pool ground truth instead of waiting for humans
    pub simulation: bool,
}

/// The last emitted selection, until its annotation arrives
#[derive(Debug, Clone, PartialEq)]
struct Awaiting {
    utterance: String,
    al_time: f64,
}

struct Cycle {
    learner: Learner,
    awaiting: Option<Awaiting>,
}

pub struct Session {
    settings: SessionSettings,
    cycle: Mutex<Cycle>,
    strategy: Arc<dyn SelectionStrategy>,
    pool: Arc<PoolIndex>,
    pool_labels: Option<Arc<[Label]>>,
    outbound: mpsc::UnboundedSender<ClientMessage>,
    state: watch::Sender<SessionState>,
    cancel: CancellationToken,
    exhausted: AtomicBool,
}

impl Session {
    /// Create a session plus the queue of messages it wants sent
    pub fn new(
        settings: SessionSettings,
        learner: Learner,
        strategy: Arc<dyn SelectionStrategy>,
        pool: Arc<PoolIndex>,
        pool_labels: Option<Arc<[Label]>>,
    ) -> Result<(Arc<Self>, mpsc::UnboundedReceiver<ClientMessage>)> {
        if settings.simulation && pool_labels.is_none() {
            return Err(Error::Config(
                "Simulation mode requires pool ground-truth labels".to_string(),
            ));
        }
        let (outbound, rx) = mpsc::unbounded_channel();
        let (state, _) = watch::channel(SessionState::Disconnected);
        let session = Arc::new(Self {
            settings,
            cycle: Mutex::new(Cycle {
                learner,
                awaiting: None,
            }),
            strategy,
            pool,
            pool_labels,
            outbound,
            state,
            cancel: CancellationToken::new(),
            exhausted: AtomicBool::new(false),
        });
        Ok((session, rx))
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Move to `next` unless already finished
    pub fn set_state(&self, next: SessionState) {
        self.state.send_if_modified(|current| {
            if *current == SessionState::Finished || *current == next {
                false
            } else {
                debug!("Session state {:?} -> {:?}", current, next);
                *current = next;
                true
            }
        });
    }

    /// Cancelled when the server finishes the session
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted.load(Ordering::Relaxed)
    }

    pub async fn count(&self) -> u64 {
        self.cycle.lock().await.learner.count()
    }

    /// Registration carrying the current count; resent on every reconnect
    pub async fn register_message(&self) -> ClientMessage {
        ClientMessage::Register {
            project_name: self.settings.project_name.clone(),
            model_name: self.settings.model_name.clone(),
            count: self.count().await,
        }
    }

    /// Queue the current scores at the current count
    pub async fn emit_scores(&self) -> Result<()> {
        let cycle = self.cycle.lock().await;
        self.send_scores(&cycle.learner)
    }

    /// React to one server event; runs to completion before the next
    pub async fn handle(&self, message: ServerMessage) -> Result<()> {
        match message {
            ServerMessage::NextUtterance { io_time_start } => {
                if self.is_exhausted() {
                    debug!("Ignoring next_utterance; pool exhausted");
                    return Ok(());
                }
                let client_start = Instant::now();
                let mut cycle = self.cycle.lock().await;
                self.select_and_emit(&mut cycle, client_start, io_time_start)
                    .await
                    .map(|_| ())
            }

            ServerMessage::Annotation {
                utterance,
                annotation,
                io_time_start,
            } => {
                let client_start = Instant::now();
                let mut cycle = self.cycle.lock().await;
                if self.cancel.is_cancelled() {
                    return Err(Error::Cancelled);
                }

                let mut instance = LabeledInstance::new(utterance, annotation);
                instance.io_time = Some((unix_seconds() - io_time_start).max(0.0));
                if let Some(awaiting) = cycle.awaiting.take() {
                    if awaiting.utterance == instance.utterance {
                        instance.al_time = Some(awaiting.al_time);
                    } else {
                        cycle.awaiting = Some(awaiting);
                    }
                }

                let utterance = instance.utterance.clone();
                if cycle.learner.record(instance)? {
                    info!(
                        "Incorporated label {} for '{}' (count {})",
                        annotation,
                        utterance,
                        cycle.learner.count()
                    );
                    self.retrain(&mut cycle.learner).await?;
                } else {
                    info!("Annotation for '{}' already incorporated", utterance);
                }
                self.set_state(SessionState::Registered);

                if self.is_exhausted() {
                    return Ok(());
                }
                self.select_and_emit(&mut cycle, client_start, io_time_start)
                    .await
                    .map(|_| ())
            }

            ServerMessage::Finished { cause } => {
                info!("Server finished session: {}", cause);
                self.finish();
                Ok(())
            }
        }
    }

    /// Enter the terminal state and cancel outstanding work
    pub fn finish(&self) {
        self.state.send_replace(SessionState::Finished);
        self.cancel.cancel();
    }

    /// Cancel outstanding work without claiming the server finished us
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Run the strategy and queue the resulting `utterance`
    ///
    /// Returns `None` after logging when the pool is exhausted; the session
    /// then stops asking for work.
    async fn select_and_emit(
        &self,
        cycle: &mut Cycle,
        client_start: Instant,
        io_time_start: f64,
    ) -> Result<Option<Selected>> {
        let snapshot = cycle.learner.snapshot();
        let strategy = Arc::clone(&self.strategy);
        let pool = Arc::clone(&self.pool);
        let pool_labels = self.pool_labels.clone();

        let al_start = Instant::now();
        let result = tokio::task::spawn_blocking(move || {
            let ctx = SelectionContext {
                pool: &pool,
                pool_labels: pool_labels.as_deref(),
                consumed: &snapshot.consumed,
                features: &snapshot.features,
                classifier: &snapshot.classifier,
            };
            strategy.select(&ctx)
        })
        .await
        .map_err(|e| Error::Scan(format!("selection task failed: {}", e)))?;
        let al_time = elapsed_seconds(al_start);

        if self.cancel.is_cancelled() {
            debug!("Discarding selection; session finished");
            return Err(Error::Cancelled);
        }

        let selected = match result {
            Ok(selected) => selected,
            Err(Error::PoolExhausted) => {
                warn!(
                    "Pool exhausted after {} labels; {} stops requesting work",
                    cycle.learner.count(),
                    self.settings.model_name
                );
                self.exhausted.store(true, Ordering::Relaxed);
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let count = cycle.learner.count();
        self.send(ClientMessage::Utterance {
            utterance: selected.utterance.clone(),
            label: if self.settings.simulation {
                selected.label
            } else {
                None
            },
            count,
            client_time: elapsed_seconds(client_start),
            al_time,
            io_time_start,
        })?;
        info!(
            "Selected '{}' (line {}) with {} at count {}",
            selected.utterance,
            selected.index,
            self.strategy.name(),
            count
        );
        cycle.awaiting = Some(Awaiting {
            utterance: selected.utterance.clone(),
            al_time,
        });
        self.set_state(SessionState::AwaitingAnnotation);
        Ok(Some(selected))
    }

    async fn retrain(&self, learner: &mut Learner) -> Result<()> {
        let job = learner.training_job();
        let trained = tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(|e| Error::Training(format!("training task failed: {}", e)))??;
        learner.install(trained);
        if let Some(dev) = learner.dev_scores() {
            debug!("Dev scores at count {}: {:?}", learner.count(), dev);
        }
        self.send_scores(learner)
    }

    fn send_scores(&self, learner: &Learner) -> Result<()> {
        let scores = learner.scores();
        self.send(ClientMessage::Scores {
            precision: scores.precision,
            recall: scores.recall,
            f1: scores.f1,
            count: learner.count(),
        })?;
        info!(
            "Scores at count {}: p={:.4} r={:.4} f1={:.4}",
            learner.count(),
            scores.precision,
            scores.recall,
            scores.f1
        );
        Ok(())
    }

    fn send(&self, message: ClientMessage) -> Result<()> {
        self.outbound
            .send(message)
            .map_err(|_| Error::Transport("outbound queue closed".to_string()))
    }
}
