//! Project status endpoint

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;

use crate::db::SessionStatus;
use crate::error::ApiResult;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ProjectStatusResponse {
    pub project: String,
    pub max_count: i64,
    pub sessions: Vec<SessionStatus>,
}

/// GET /api/projects/:project/status
pub async fn project_status(
    State(state): State<AppState>,
    Path(project): Path<String>,
) -> ApiResult<Json<ProjectStatusResponse>> {
    let (project, sessions) = state.coordinator.project_status(&project).await?;
    Ok(Json(ProjectStatusResponse {
        project: project.name,
        max_count: project.max_count,
        sessions,
    }))
}
