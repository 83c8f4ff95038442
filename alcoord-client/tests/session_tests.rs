//! Client sessions run against a real coordination server

use std::path::{Path, PathBuf};
use std::time::Duration;

use tempfile::TempDir;
use tokio::net::TcpListener;

use alcoord_client::config::{CliOverrides, ClientConfig};
use alcoord_client::learner::LabelStore;
use alcoord_client::strategy::StrategyKind;
use alcoord_client::{runner, SessionState};
use alcoord_server::db::{self, instances, projects, scores, sessions};
use alcoord_server::{build_router, AppState, CoordinatorSettings, Error as ServerError};

const TIMEOUT: Duration = Duration::from_secs(60);

async fn start_server(max_count: i64, model: &str) -> (u16, AppState) {
    let pool = db::init_memory_database().await.unwrap();
    projects::create_project(&pool, "sst2", max_count, &[model.to_string()])
        .await
        .unwrap();
    let state = AppState::new(pool, CoordinatorSettings::default());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let app = build_router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (port, state)
}

fn write_corpus(dir: &Path) {
    let write = |name: &str, content: &str| std::fs::write(dir.join(name), content).unwrap();
    write("train.txt", "good film\nbad film\ngreat story\nterrible story\n");
    write("train_label.txt", "1\n0\n1\n0\n");
    write("test.txt", "good\nbad\ngood plot\nterrible plot\n");
    write("test_label.txt", "1\n0\n1\n0\n");
    write(
        "pool.txt",
        "great plot\nawful plot\ngood acting\nbad acting\nlovely music\ndull music\n",
    );
    write("pool_label.txt", "1\n0\n1\n0\n1\n0\n");
}

fn client_config(
    port: u16,
    model: &str,
    data: &Path,
    out: &Path,
    simulation: bool,
) -> ClientConfig {
    ClientConfig::resolve(
        CliOverrides {
            project: Some("sst2".to_string()),
            name: Some(model.to_string()),
            host: Some("127.0.0.1".to_string()),
            port: Some(port),
            strategy: Some(StrategyKind::Random),
            data_dir: Some(PathBuf::from(data)),
            output_dir: Some(PathBuf::from(out)),
            simulation,
            ..Default::default()
        },
        None,
    )
    .unwrap()
}

async fn session_id(state: &AppState, model: &str) -> i64 {
    let pool = state.coordinator.db();
    let project = projects::find_by_name(pool, "sst2").await.unwrap().unwrap();
    sessions::find(pool, project.id, model).await.unwrap().unwrap().id
}

/// The client's persisted labels, in order, are exactly the server's
/// annotated instances for the session
async fn assert_labels_match_server(state: &AppState, session: i64, config: &ClientConfig) {
    let local: Vec<(String, Option<i64>)> = LabelStore::open(&config.session_dir())
        .unwrap()
        .load()
        .unwrap()
        .into_iter()
        .map(|l| (l.utterance, Some(l.label)))
        .collect();
    let remote: Vec<(String, Option<i64>)> =
        instances::list_for_session(state.coordinator.db(), session)
            .await
            .unwrap()
            .into_iter()
            .map(|i| (i.utterance, i.annotation))
            .collect();
    assert_eq!(local, remote);
}

#[tokio::test]
async fn test_simulation_runs_to_budget_and_resumes_finished() {
    let (port, state) = start_server(3, "sim").await;
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_corpus(data.path());
    let config = client_config(port, "sim", data.path(), out.path(), true);

    let end = tokio::time::timeout(
        TIMEOUT,
        runner::run(config.clone(), std::future::pending()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(end, SessionState::Finished);

    let session = session_id(&state, "sim").await;
    let pool = state.coordinator.db();
    let stored = instances::list_for_session(pool, session).await.unwrap();
    assert_eq!(stored.len(), 3);
    assert!(stored.iter().all(|i| i.annotation.is_some() && i.delivered));
    assert_labels_match_server(&state, session, &config).await;
    assert_eq!(sessions::get(pool, session).await.unwrap().count, 3);

    let score_counts: Vec<i64> = scores::list_for_session(pool, session)
        .await
        .unwrap()
        .iter()
        .map(|s| s.count)
        .collect();
    assert!(score_counts.contains(&3));
    assert!(score_counts.iter().all(|c| *c <= 3));

    // The persisted labels carry the count to the budget
    let end = tokio::time::timeout(
        TIMEOUT,
        runner::run(config.clone(), std::future::pending()),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(end, SessionState::Finished);
    assert_eq!(
        instances::list_for_session(pool, session).await.unwrap().len(),
        3
    );
    assert_labels_match_server(&state, session, &config).await;
}

#[tokio::test]
async fn test_live_session_with_annotator() {
    let (port, state) = start_server(2, "live").await;
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_corpus(data.path());
    let config = client_config(port, "live", data.path(), out.path(), false);

    let client = tokio::spawn(runner::run(config.clone(), std::future::pending()));

    for _ in 0..2 {
        let offered = loop {
            match state.coordinator.next_instance("sst2").await {
                Ok(offered) => break offered,
                Err(ServerError::NotFound(_)) => {
                    tokio::time::sleep(Duration::from_millis(20)).await;
                }
                Err(e) => panic!("unexpected error: {}", e),
            }
        };
        assert_eq!(offered.session, "live");
        state
            .coordinator
            .annotate(offered.instance_id, 1)
            .await
            .unwrap();
    }

    let end = tokio::time::timeout(TIMEOUT, client)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(end, SessionState::Finished);

    let session = session_id(&state, "live").await;
    let stored = instances::list_for_session(state.coordinator.db(), session)
        .await
        .unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().all(|i| i.annotation == Some(1)));
    assert!(stored.iter().all(|i| i.io_time.is_some()));
    assert_labels_match_server(&state, session, &config).await;
    assert_eq!(
        sessions::get(state.coordinator.db(), session).await.unwrap().count,
        2
    );
}

#[tokio::test]
async fn test_shutdown_stops_a_waiting_session() {
    let (port, _state) = start_server(5, "idle").await;
    let data = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_corpus(data.path());
    let config = client_config(port, "idle", data.path(), out.path(), false);

    let end = tokio::time::timeout(
        TIMEOUT,
        runner::run(config, tokio::time::sleep(Duration::from_millis(300))),
    )
    .await
    .unwrap()
    .unwrap();
    assert_ne!(end, SessionState::Finished);
}
