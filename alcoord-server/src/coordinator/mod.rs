//! Server coordination service
//!
//! Binds websocket connections to stored sessions, tracks each session's
//! progress counter, enforces the per-project annotation budget and pushes
//! work, annotation and finish signals.
//!
//! Every mutation that touches a session counter or checks the budget runs
//! under its project's lock, so sibling sessions cannot race past
//! `max_count` and one session's counter has a single writer.

pub mod balance;
pub mod connections;

pub use connections::{ConnectionHandle, ConnectionRegistry};

use crate::db::{self, instances, projects, scores, sessions, NewInstance, ScoreSample};
use crate::error::{Error, Result};
use alcoord_common::protocol::{is_valid_label, Label};
use alcoord_common::{time, ServerMessage};
use rand::seq::SliceRandom;
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Tunables for the coordination service
#[derive(Debug, Clone, PartialEq)]
pub struct CoordinatorSettings {
    /// Largest tolerated count spread between sibling sessions
    pub balance_threshold: i64,
    /// Auto-label selections whose utterance was already annotated
    pub reuse_labels: bool,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            balance_threshold: 5,
            reuse_labels: false,
        }
    }
}

/// A connection's registered session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionBinding {
    pub session_id: i64,
    pub project_id: i64,
    pub connection_id: Uuid,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegisterOutcome {
    /// Connection is bound; the session may keep working
    Accepted(SessionBinding),
    /// `finished` was sent and the connection stays unbound
    Finished,
}

/// One selected utterance as reported by a client
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub utterance: String,
    pub label: Option<Label>,
    pub count: u64,
    pub client_time: f64,
    pub al_time: f64,
    pub io_time_start: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UtteranceOutcome {
    Persisted { instance_id: i64 },
    /// Budget reached; `finished` was sent and the binding dropped
    Finished,
}

/// Pending instance handed to a human annotator
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfferedInstance {
    pub instance_id: i64,
    pub utterance: String,
    pub session: String,
}

/// Coordination state shared by the websocket endpoint and the HTTP API
pub struct Coordinator {
    db: SqlitePool,
    settings: CoordinatorSettings,
    connections: ConnectionRegistry,
    project_locks: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl Coordinator {
    pub fn new(db: SqlitePool, settings: CoordinatorSettings) -> Self {
        Self {
            db,
            settings,
            connections: ConnectionRegistry::new(),
            project_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn db(&self) -> &SqlitePool {
        &self.db
    }

    pub fn settings(&self) -> &CoordinatorSettings {
        &self.settings
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    async fn project_lock(&self, project_id: i64) -> Arc<Mutex<()>> {
        let mut locks = self.project_locks.lock().await;
        locks
            .entry(project_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Handle a `register` message arriving on `connection`
    ///
    /// Unknown (project, session) pairs and count regressions are answered
    /// with `finished`. A valid registration adopts the reported count and
    /// prompts the session: `finished` at budget, else the oldest
    /// undelivered annotation, else `next_utterance` unless an instance is
    /// already waiting for a human.
    pub async fn register(
        &self,
        connection: &ConnectionHandle,
        project_name: &str,
        model_name: &str,
        count: u64,
    ) -> Result<RegisterOutcome> {
        let session = match projects::find_by_name(&self.db, project_name).await? {
            Some(project) => sessions::find(&self.db, project.id, model_name)
                .await?
                .map(|session| (project, session)),
            None => None,
        };
        let Some((project, session)) = session else {
            info!(
                "Rejected registration for unknown project '{}' / model '{}'",
                project_name, model_name
            );
            connection.send(ServerMessage::Finished {
                cause: format!(
                    "project_name: {} or model_name: {} not found",
                    project_name, model_name
                ),
            });
            return Ok(RegisterOutcome::Finished);
        };

        let lock = self.project_lock(project.id).await;
        let _guard = lock.lock().await;

        // Re-read under the lock; a sibling may have advanced it meanwhile.
        let session = sessions::get(&self.db, session.id).await?;
        let count = to_count(count)?;
        if count < session.count {
            warn!(
                "Rejected registration of {}/{}: count {} is behind stored count {}",
                project.name, session.name, count, session.count
            );
            connection.send(ServerMessage::Finished {
                cause: format!(
                    "count regression: reported {} but {} already recorded",
                    count, session.count
                ),
            });
            return Ok(RegisterOutcome::Finished);
        }

        if count >= project.max_count {
            sessions::update_progress(&self.db, session.id, count, false).await?;
            info!(
                "Session {}/{} registered at budget ({}); finishing",
                project.name, session.name, project.max_count
            );
            connection.send(ServerMessage::Finished {
                cause: format!("max count: {} reached", project.max_count),
            });
            return Ok(RegisterOutcome::Finished);
        }

        sessions::update_progress(&self.db, session.id, count, true).await?;
        self.connections.bind(session.id, connection.clone()).await;
        info!(
            "Registered session {}/{} at count {} (connection {})",
            project.name, session.name, count, connection.id
        );

        if let Some(instance) = instances::first_undelivered_for_session(&self.db, session.id).await? {
            if let Some(annotation) = instance.annotation {
                connection.send(ServerMessage::Annotation {
                    utterance: instance.utterance.clone(),
                    annotation,
                    io_time_start: time::unix_seconds(),
                });
                instances::mark_delivered(&self.db, instance.id).await?;
                info!(
                    "Redelivered annotation of instance {} to {}/{}",
                    instance.id, project.name, session.name
                );
            }
        } else if instances::first_pending_for_session(&self.db, session.id)
            .await?
            .is_none()
        {
            connection.send(ServerMessage::NextUtterance {
                io_time_start: time::unix_seconds(),
            });
        } else {
            info!(
                "Session {}/{} has an instance awaiting annotation; not requesting more",
                project.name, session.name
            );
        }

        Ok(RegisterOutcome::Accepted(SessionBinding {
            session_id: session.id,
            project_id: project.id,
            connection_id: connection.id,
        }))
    }

    /// Handle an `utterance` message from a registered session
    pub async fn receive_utterance(
        &self,
        binding: &SessionBinding,
        selection: Selection,
    ) -> Result<UtteranceOutcome> {
        let lock = self.project_lock(binding.project_id).await;
        let _guard = lock.lock().await;

        let project = projects::get(&self.db, binding.project_id).await?;
        let session = sessions::get(&self.db, binding.session_id).await?;
        let count = to_count(selection.count)?;

        if count < session.count {
            return Err(Error::Invariant(format!(
                "session {}/{} sent count {} after {}",
                project.name, session.name, count, session.count
            )));
        }

        if count >= project.max_count {
            let reached = count.min(project.max_count).max(session.count);
            sessions::update_progress(&self.db, session.id, reached, false).await?;
            self.finish_session(binding, &format!("max count: {} reached", project.max_count))
                .await?;
            info!(
                "Session {}/{} reached budget {}; finished",
                project.name, session.name, project.max_count
            );
            if count > project.max_count {
                return Err(Error::BudgetExceeded(format!(
                    "session {}/{} emitted a selection at count {} past budget {}",
                    project.name, session.name, count, project.max_count
                )));
            }
            return Ok(UtteranceOutcome::Finished);
        }

        sessions::update_progress(&self.db, session.id, count, true).await?;

        let io_time = (time::unix_seconds() - selection.io_time_start) - selection.client_time;

        let (annotation, copied) = match selection.label {
            Some(label) => (Some(label), false),
            None if self.settings.reuse_labels => {
                match instances::find_existing_label(&self.db, project.id, &selection.utterance)
                    .await?
                {
                    Some(label) => (Some(label), true),
                    None => (None, false),
                }
            }
            None => (None, false),
        };

        let instance_id = instances::insert(
            &self.db,
            &NewInstance {
                project_id: project.id,
                session_id: session.id,
                utterance: &selection.utterance,
                annotation,
                client_time: selection.client_time,
                al_time: selection.al_time,
                io_time,
                copied,
                delivered: false,
            },
        )
        .await?;

        info!(
            "Persisted instance {} for {}/{} at count {}",
            instance_id, project.name, session.name, count
        );

        // Pre-labeled instances are echoed back; the session learns the
        // label only once it is stored here.
        if let Some(annotation) = annotation {
            let pushed = self
                .connections
                .send(
                    session.id,
                    ServerMessage::Annotation {
                        utterance: selection.utterance,
                        annotation,
                        io_time_start: time::unix_seconds(),
                    },
                )
                .await;
            if pushed {
                instances::mark_delivered(&self.db, instance_id).await?;
            }
            info!(
                "Returned {} label {} for instance {}",
                if copied { "reused" } else { "simulated" },
                annotation,
                instance_id
            );
        }

        Ok(UtteranceOutcome::Persisted { instance_id })
    }

    /// Store a metric snapshot
    pub async fn receive_scores(
        &self,
        binding: &SessionBinding,
        precision: f64,
        recall: f64,
        f1: f64,
        count: u64,
    ) -> Result<()> {
        scores::upsert(
            &self.db,
            &ScoreSample {
                session_id: binding.session_id,
                count: to_count(count)?,
                precision,
                recall,
                f1,
            },
        )
        .await
    }

    /// Attach a human label to a pending instance and push it to its session
    pub async fn annotate(&self, instance_id: i64, annotation: Label) -> Result<db::InstanceRecord> {
        if !is_valid_label(annotation) {
            return Err(Error::BadRequest(format!(
                "annotation must be 0 or 1, got {}",
                annotation
            )));
        }

        let instance = instances::get(&self.db, instance_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("instance {}", instance_id)))?;

        let lock = self.project_lock(instance.project_id).await;
        let _guard = lock.lock().await;

        if !instances::set_annotation(&self.db, instance.id, annotation).await? {
            return Err(Error::Conflict(format!(
                "instance {} is already annotated",
                instance.id
            )));
        }

        let pushed = self
            .connections
            .send(
                instance.session_id,
                ServerMessage::Annotation {
                    utterance: instance.utterance.clone(),
                    annotation,
                    io_time_start: time::unix_seconds(),
                },
            )
            .await;

        if pushed {
            instances::mark_delivered(&self.db, instance.id).await?;
            info!(
                "Annotation {} of instance {} pushed to session {}",
                annotation, instance.id, instance.session_id
            );
        } else {
            info!(
                "Annotation {} of instance {} stored; session {} offline",
                annotation, instance.id, instance.session_id
            );
        }

        instances::get(&self.db, instance.id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("instance {}", instance.id)))
    }

    /// Pick the next pending instance of a project for a human annotator
    pub async fn next_instance(&self, project_name: &str) -> Result<OfferedInstance> {
        let project = projects::find_by_name(&self.db, project_name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("project '{}'", project_name)))?;

        let siblings = sessions::list_for_project(&self.db, project.id).await?;
        let pending = instances::pending_for_project(&self.db, project.id).await?;
        if pending.is_empty() {
            return Err(Error::NotFound(format!(
                "no pending instance in project '{}'",
                project.name
            )));
        }

        let candidates =
            balance::balance_candidates(&siblings, pending, self.settings.balance_threshold)
                .map_err(|e| {
                    error!("Project '{}': {}", project.name, e);
                    e
                })?;

        let chosen = candidates
            .choose(&mut rand::thread_rng())
            .ok_or_else(|| Error::Invariant("empty candidate list".to_string()))?;

        let session = siblings
            .iter()
            .find(|s| s.id == chosen.session_id)
            .map(|s| s.name.clone())
            .ok_or_else(|| {
                Error::Invariant(format!(
                    "instance {} belongs to unknown session {}",
                    chosen.id, chosen.session_id
                ))
            })?;

        Ok(OfferedInstance {
            instance_id: chosen.id,
            utterance: chosen.utterance.clone(),
            session,
        })
    }

    /// Per-session progress and label tallies
    pub async fn project_status(
        &self,
        project_name: &str,
    ) -> Result<(db::ProjectRecord, Vec<db::SessionStatus>)> {
        let project = projects::find_by_name(&self.db, project_name)
            .await?
            .ok_or_else(|| Error::NotFound(format!("project '{}'", project_name)))?;
        let statuses = sessions::status_for_project(&self.db, project.id).await?;
        Ok((project, statuses))
    }

    /// Connection closed; keep all durable state, drop the transport
    pub async fn disconnect(&self, binding: &SessionBinding) -> Result<()> {
        if self
            .connections
            .unbind(binding.session_id, binding.connection_id)
            .await
        {
            sessions::set_online(&self.db, binding.session_id, false).await?;
            info!("Session {} disconnected", binding.session_id);
        }
        Ok(())
    }

    async fn finish_session(&self, binding: &SessionBinding, cause: &str) -> Result<()> {
        self.connections
            .send(
                binding.session_id,
                ServerMessage::Finished {
                    cause: cause.to_string(),
                },
            )
            .await;
        self.connections
            .unbind(binding.session_id, binding.connection_id)
            .await;
        sessions::set_online(&self.db, binding.session_id, false).await
    }
}

fn to_count(count: u64) -> Result<i64> {
    i64::try_from(count).map_err(|_| Error::BadRequest(format!("count {} out of range", count)))
}
