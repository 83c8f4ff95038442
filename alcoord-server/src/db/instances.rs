//! Instance queries
//!
//! Instances are append-only; the only mutations are attaching a label to a
//! pending row and flagging a label as delivered.

use super::models::{InstanceRecord, NewInstance};
use crate::error::Result;
use sqlx::SqlitePool;

const INSTANCE_COLUMNS: &str = "id, project_id, session_id, utterance, annotation, \
     client_time, al_time, io_time, copied, delivered";

/// Insert a new instance, returning its id
pub async fn insert(db: &SqlitePool, instance: &NewInstance<'_>) -> Result<i64> {
    let id = sqlx::query(
        r#"
        INSERT INTO instances
            (project_id, session_id, utterance, annotation, client_time, al_time, io_time,
             copied, delivered, annotated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?,
                CASE WHEN ? IS NULL THEN NULL ELSE CURRENT_TIMESTAMP END)
        "#,
    )
    .bind(instance.project_id)
    .bind(instance.session_id)
    .bind(instance.utterance)
    .bind(instance.annotation)
    .bind(instance.client_time)
    .bind(instance.al_time)
    .bind(instance.io_time)
    .bind(instance.copied)
    .bind(instance.delivered)
    .bind(instance.annotation)
    .execute(db)
    .await?
    .last_insert_rowid();
    Ok(id)
}

/// Get an instance by id
pub async fn get(db: &SqlitePool, instance_id: i64) -> Result<Option<InstanceRecord>> {
    let instance = sqlx::query_as::<_, InstanceRecord>(&format!(
        "SELECT {} FROM instances WHERE id = ?",
        INSTANCE_COLUMNS
    ))
    .bind(instance_id)
    .fetch_optional(db)
    .await?;
    Ok(instance)
}

/// Unlabeled instances of a project, in insertion order
pub async fn pending_for_project(db: &SqlitePool, project_id: i64) -> Result<Vec<InstanceRecord>> {
    let instances = sqlx::query_as::<_, InstanceRecord>(&format!(
        "SELECT {} FROM instances WHERE project_id = ? AND annotation IS NULL ORDER BY id",
        INSTANCE_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(db)
    .await?;
    Ok(instances)
}

/// Oldest unlabeled instance of a session, if any
pub async fn first_pending_for_session(
    db: &SqlitePool,
    session_id: i64,
) -> Result<Option<InstanceRecord>> {
    let instance = sqlx::query_as::<_, InstanceRecord>(&format!(
        "SELECT {} FROM instances WHERE session_id = ? AND annotation IS NULL ORDER BY id LIMIT 1",
        INSTANCE_COLUMNS
    ))
    .bind(session_id)
    .fetch_optional(db)
    .await?;
    Ok(instance)
}

/// Oldest labeled instance whose label never reached the session
pub async fn first_undelivered_for_session(
    db: &SqlitePool,
    session_id: i64,
) -> Result<Option<InstanceRecord>> {
    let instance = sqlx::query_as::<_, InstanceRecord>(&format!(
        "SELECT {} FROM instances \
         WHERE session_id = ? AND annotation IS NOT NULL AND delivered = 0 \
         ORDER BY id LIMIT 1",
        INSTANCE_COLUMNS
    ))
    .bind(session_id)
    .fetch_optional(db)
    .await?;
    Ok(instance)
}

/// All instances of a session, in insertion order
pub async fn list_for_session(db: &SqlitePool, session_id: i64) -> Result<Vec<InstanceRecord>> {
    let instances = sqlx::query_as::<_, InstanceRecord>(&format!(
        "SELECT {} FROM instances WHERE session_id = ? ORDER BY id",
        INSTANCE_COLUMNS
    ))
    .bind(session_id)
    .fetch_all(db)
    .await?;
    Ok(instances)
}

/// Attach a label to a pending instance
///
/// Returns false when the instance was already labeled.
pub async fn set_annotation(db: &SqlitePool, instance_id: i64, annotation: i64) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE instances SET annotation = ?, annotated_at = CURRENT_TIMESTAMP \
         WHERE id = ? AND annotation IS NULL",
    )
    .bind(annotation)
    .bind(instance_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Flag an instance's label as delivered to its session
pub async fn mark_delivered(db: &SqlitePool, instance_id: i64) -> Result<()> {
    sqlx::query("UPDATE instances SET delivered = 1 WHERE id = ?")
        .bind(instance_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Earliest human label given to `utterance` anywhere in the project
pub async fn find_existing_label(
    db: &SqlitePool,
    project_id: i64,
    utterance: &str,
) -> Result<Option<i64>> {
    let label = sqlx::query_scalar::<_, i64>(
        "SELECT annotation FROM instances \
         WHERE project_id = ? AND utterance = ? AND annotation IS NOT NULL AND copied = 0 \
         ORDER BY id LIMIT 1",
    )
    .bind(project_id)
    .bind(utterance)
    .fetch_optional(db)
    .await?;
    Ok(label)
}
