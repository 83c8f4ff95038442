//! Client startup and lifetime
//!
//! Load dataset → features and pool index → replay labels and train →
//! connect and register → react to server events until finished.

use crate::config::ClientConfig;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::learner::Learner;
use crate::session::{Session, SessionSettings, SessionState};
use crate::transport::{self, TransportConfig};
use alcoord_common::protocol::Label;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinError;
use tracing::info;

/// Run one model session until the server finishes it or `shutdown` fires
pub async fn run<F>(config: ClientConfig, shutdown: F) -> Result<SessionState>
where
    F: Future<Output = ()> + Send,
{
    let dataset = Dataset::load(&config.data_dir, config.simulation)?;
    let features = Arc::new(dataset.fit_features()?);

    let session_dir = config.session_dir();
    let learner = Learner::open(&dataset, features, &session_dir, config.train.clone())?;
    let baseline = learner.scores();
    info!(
        "Session {}.{} at count {} (labels in {}): p={:.4} r={:.4} f1={:.4}",
        config.project,
        config.name,
        learner.count(),
        session_dir.display(),
        baseline.precision,
        baseline.recall,
        baseline.f1
    );

    let Dataset {
        pool, pool_labels, ..
    } = dataset;
    let strategy = config.strategy.build(config.scan, pool.len())?;
    info!("Selection strategy: {}", strategy.name());

    let (session, outbound) = Session::new(
        SessionSettings {
            project_name: config.project.clone(),
            model_name: config.name.clone(),
            simulation: config.simulation,
        },
        learner,
        strategy,
        Arc::new(pool),
        pool_labels.map(Arc::<[Label]>::from),
    )?;

    let mut link = tokio::spawn(transport::run(
        Arc::clone(&session),
        outbound,
        TransportConfig::new(config.url()),
    ));

    tokio::pin!(shutdown);
    tokio::select! {
        result = &mut link => return joined(result),
        _ = &mut shutdown => {
            info!("Shutdown requested; closing session");
            session.stop();
        }
    }
    joined(link.await)
}

fn joined(result: std::result::Result<Result<SessionState>, JoinError>) -> Result<SessionState> {
    let state = result.map_err(|e| task_failed("transport", e))??;
    info!("Session ended in state {:?}", state);
    Ok(state)
}

fn task_failed(task: &str, e: JoinError) -> Error {
    Error::Task(format!("{} task failed: {}", task, e))
}
