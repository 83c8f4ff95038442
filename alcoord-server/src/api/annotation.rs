//! Annotation API consumed by the human annotation front-end

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::coordinator::OfferedInstance;
use crate::error::ApiResult;
use crate::AppState;
use alcoord_common::protocol::Label;

/// GET /api/projects/:project/instances/next
///
/// Balanced random pick among the project's unlabeled instances.
pub async fn next_instance(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> ApiResult<Json<OfferedInstance>> {
    let offered = state.coordinator.next_instance(&project).await?;
    debug!(
        "Offering instance {} of session '{}'",
        offered.instance_id, offered.session
    );
    Ok(Json(offered))
}

#[derive(Debug, Deserialize)]
pub struct AnnotateRequest {
    pub instance_id: i64,
    pub annotation: Label,
}

#[derive(Debug, Serialize)]
pub struct AnnotateResponse {
    pub instance_id: i64,
    pub annotation: Label,
    /// Whether the owning session received the label immediately
    pub delivered: bool,
}

/// POST /api/annotate
pub async fn annotate(
    State(state): State<AppState>,
    Json(request): Json<AnnotateRequest>,
) -> ApiResult<Json<AnnotateResponse>> {
    let instance = state
        .coordinator
        .annotate(request.instance_id, request.annotation)
        .await?;
    Ok(Json(AnnotateResponse {
        instance_id: instance.id,
        annotation: request.annotation,
        delivered: instance.delivered,
    }))
}
