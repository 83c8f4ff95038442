//! Integration tests for the annotation HTTP API

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::util::ServiceExt; // for `oneshot` method

use alcoord_common::time;
use alcoord_server::coordinator::{ConnectionHandle, RegisterOutcome, Selection, UtteranceOutcome};
use alcoord_server::db::{self, projects};
use alcoord_server::{build_router, AppState, CoordinatorSettings};

/// Test helper: state with one project "sst2" and sessions "least" and "random"
async fn setup_state() -> AppState {
    let pool = db::init_memory_database().await.unwrap();
    projects::create_project(
        &pool,
        "sst2",
        10,
        &["least".to_string(), "random".to_string()],
    )
    .await
    .unwrap();
    AppState::new(pool, CoordinatorSettings::default())
}

/// Test helper: register "least" and persist one pending selection
async fn queue_instance(state: &AppState, utterance: &str) -> i64 {
    let (handle, _rx) = ConnectionHandle::new();
    let RegisterOutcome::Accepted(binding) = state
        .coordinator
        .register(&handle, "sst2", "least", 0)
        .await
        .unwrap()
    else {
        panic!("registration was finished");
    };
    let outcome = state
        .coordinator
        .receive_utterance(
            &binding,
            Selection {
                utterance: utterance.to_string(),
                label: None,
                count: 0,
                client_time: 0.1,
                al_time: 0.05,
                io_time_start: time::unix_seconds(),
            },
        )
        .await
        .unwrap();
    match outcome {
        UtteranceOutcome::Persisted { instance_id } => instance_id,
        UtteranceOutcome::Finished => panic!("session finished"),
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// Test helper: Extract JSON body from response
async fn extract_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX)
        .await
        .expect("Should read body");
    serde_json::from_slice(&bytes).expect("Should parse JSON")
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = build_router(setup_state().await);
    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "alcoord-server");
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn test_next_instance_offers_pending_utterance() {
    let state = setup_state().await;
    let instance_id = queue_instance(&state, "a warm, funny film").await;
    let app = build_router(state);

    let response = app
        .oneshot(get("/api/projects/sst2/instances/next"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = extract_json(response.into_body()).await;
    assert_eq!(body["instance_id"], instance_id);
    assert_eq!(body["utterance"], "a warm, funny film");
    assert_eq!(body["session"], "least");
}

#[tokio::test]
async fn test_next_instance_empty_project_is_404() {
    let app = build_router(setup_state().await);
    let response = app
        .oneshot(get("/api/projects/sst2/instances/next"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn test_annotate_then_status_tallies() {
    let state = setup_state().await;
    let instance_id = queue_instance(&state, "dull").await;

    let app = build_router(state.clone());
    let response = app
        .oneshot(post_json(
            "/api/annotate",
            json!({"instance_id": instance_id, "annotation": 0}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["annotation"], 0);

    let app = build_router(state.clone());
    let response = app
        .oneshot(post_json(
            "/api/annotate",
            json!({"instance_id": instance_id, "annotation": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let app = build_router(state);
    let response = app.oneshot(get("/api/projects/sst2/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = extract_json(response.into_body()).await;
    assert_eq!(body["project"], "sst2");
    assert_eq!(body["max_count"], 10);
    let sessions = body["sessions"].as_array().unwrap();
    assert_eq!(sessions.len(), 2);
    assert_eq!(sessions[0]["name"], "least");
    assert_eq!(sessions[0]["negatives"], 1);
    assert_eq!(sessions[0]["positives"], 0);
    assert_eq!(sessions[1]["name"], "random");
    assert_eq!(sessions[1]["online"], false);
}

#[tokio::test]
async fn test_annotate_rejects_bad_label_and_unknown_id() {
    let state = setup_state().await;
    let instance_id = queue_instance(&state, "x").await;

    let app = build_router(state.clone());
    let response = app
        .oneshot(post_json(
            "/api/annotate",
            json!({"instance_id": instance_id, "annotation": 7}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let app = build_router(state);
    let response = app
        .oneshot(post_json(
            "/api/annotate",
            json!({"instance_id": 424242, "annotation": 1}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_status_of_unknown_project_is_404() {
    let app = build_router(setup_state().await);
    let response = app.oneshot(get("/api/projects/none/status")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
