//! alcoord-server library - active-learning coordination service
//!
//! Hosts the `/model` websocket that model clients register on, and the
//! JSON API a human annotation front-end drives.

use axum::Router;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

pub mod api;
pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;

pub use coordinator::{Coordinator, CoordinatorSettings};
pub use error::{ApiError, Error, Result};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    /// Create new application state
    pub fn new(db: SqlitePool, settings: CoordinatorSettings) -> Self {
        Self {
            coordinator: Arc::new(Coordinator::new(db, settings)),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::{get, post};

    Router::new()
        .route(alcoord_common::protocol::MODEL_ENDPOINT, get(api::model_socket))
        .route(
            "/api/projects/:project/instances/next",
            get(api::next_instance),
        )
        .route("/api/projects/:project/status", get(api::project_status))
        .route("/api/annotate", post(api::annotate))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
