//! Project queries

use super::models::ProjectRecord;
use crate::error::{Error, Result};
use sqlx::SqlitePool;
use tracing::info;

/// Find a project by its unique name
pub async fn find_by_name(db: &SqlitePool, name: &str) -> Result<Option<ProjectRecord>> {
    let project = sqlx::query_as::<_, ProjectRecord>(
        "SELECT id, name, max_count FROM projects WHERE name = ?",
    )
    .bind(name)
    .fetch_optional(db)
    .await?;
    Ok(project)
}

/// Get a project by id
pub async fn get(db: &SqlitePool, project_id: i64) -> Result<ProjectRecord> {
    sqlx::query_as::<_, ProjectRecord>("SELECT id, name, max_count FROM projects WHERE id = ?")
        .bind(project_id)
        .fetch_optional(db)
        .await?
        .ok_or_else(|| Error::NotFound(format!("project id {}", project_id)))
}

/// Create a project together with its sessions in one transaction
pub async fn create_project(
    db: &SqlitePool,
    name: &str,
    max_count: i64,
    session_names: &[String],
) -> Result<ProjectRecord> {
    if name.trim().is_empty() {
        return Err(Error::BadRequest("project name must not be empty".to_string()));
    }
    if max_count < 0 {
        return Err(Error::BadRequest(format!(
            "max_count must be non-negative, got {}",
            max_count
        )));
    }
    if find_by_name(db, name).await?.is_some() {
        return Err(Error::Conflict(format!("project '{}' already exists", name)));
    }

    let mut tx = db.begin().await?;

    let project_id = sqlx::query("INSERT INTO projects (name, max_count) VALUES (?, ?)")
        .bind(name)
        .bind(max_count)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

    for session_name in session_names {
        if session_name.trim().is_empty() {
            return Err(Error::BadRequest("session name must not be empty".to_string()));
        }
        sqlx::query("INSERT INTO sessions (project_id, name) VALUES (?, ?)")
            .bind(project_id)
            .bind(session_name)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
                    Error::Conflict(format!("duplicate session name '{}'", session_name))
                }
                other => Error::Database(other),
            })?;
    }

    tx.commit().await?;

    info!(
        "Created project '{}' (max_count={}) with {} sessions",
        name,
        max_count,
        session_names.len()
    );

    Ok(ProjectRecord {
        id: project_id,
        name: name.to_string(),
        max_count,
    })
}
