//! Session queries

use super::models::{SessionRecord, SessionStatus};
use crate::error::{Error, Result};
use sqlx::SqlitePool;

const SESSION_COLUMNS: &str = "id, project_id, name, count, online";

/// Find a session by (project, name)
pub async fn find(db: &SqlitePool, project_id: i64, name: &str) -> Result<Option<SessionRecord>> {
    let session = sqlx::query_as::<_, SessionRecord>(&format!(
        "SELECT {} FROM sessions WHERE project_id = ? AND name = ?",
        SESSION_COLUMNS
    ))
    .bind(project_id)
    .bind(name)
    .fetch_optional(db)
    .await?;
    Ok(session)
}

/// Get a session by id
pub async fn get(db: &SqlitePool, session_id: i64) -> Result<SessionRecord> {
    sqlx::query_as::<_, SessionRecord>(&format!(
        "SELECT {} FROM sessions WHERE id = ?",
        SESSION_COLUMNS
    ))
    .bind(session_id)
    .fetch_optional(db)
    .await?
    .ok_or_else(|| Error::NotFound(format!("session id {}", session_id)))
}

/// All sessions of a project, lowest count first
pub async fn list_for_project(db: &SqlitePool, project_id: i64) -> Result<Vec<SessionRecord>> {
    let sessions = sqlx::query_as::<_, SessionRecord>(&format!(
        "SELECT {} FROM sessions WHERE project_id = ? ORDER BY count ASC, id ASC",
        SESSION_COLUMNS
    ))
    .bind(project_id)
    .fetch_all(db)
    .await?;
    Ok(sessions)
}

/// Record a session's progress counter and connectivity
///
/// Refuses to move the counter backwards.
pub async fn update_progress(
    db: &SqlitePool,
    session_id: i64,
    count: i64,
    online: bool,
) -> Result<()> {
    let result = sqlx::query(
        "UPDATE sessions SET count = ?, online = ? WHERE id = ? AND count <= ?",
    )
    .bind(count)
    .bind(online)
    .bind(session_id)
    .bind(count)
    .execute(db)
    .await?;

    if result.rows_affected() == 0 {
        let current = get(db, session_id).await?;
        return Err(Error::Invariant(format!(
            "session '{}' count would move backwards from {} to {}",
            current.name, current.count, count
        )));
    }
    Ok(())
}

/// Mark a session online/offline without touching its counter
pub async fn set_online(db: &SqlitePool, session_id: i64, online: bool) -> Result<()> {
    sqlx::query("UPDATE sessions SET online = ? WHERE id = ?")
        .bind(online)
        .bind(session_id)
        .execute(db)
        .await?;
    Ok(())
}

/// Progress and label tallies for every session of a project
pub async fn status_for_project(db: &SqlitePool, project_id: i64) -> Result<Vec<SessionStatus>> {
    let statuses = sqlx::query_as::<_, SessionStatus>(
        r#"
        SELECT s.name, s.online, s.count,
               COALESCE(SUM(CASE WHEN i.annotation = 1 THEN 1 ELSE 0 END), 0) AS positives,
               COALESCE(SUM(CASE WHEN i.annotation = 0 THEN 1 ELSE 0 END), 0) AS negatives
        FROM sessions s
        LEFT JOIN instances i ON i.session_id = s.id
        WHERE s.project_id = ?
        GROUP BY s.id
        ORDER BY s.id
        "#,
    )
    .bind(project_id)
    .fetch_all(db)
    .await?;
    Ok(statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init::init_memory_database, projects};

    #[tokio::test]
    async fn test_count_never_moves_backwards() {
        let db = init_memory_database().await.unwrap();
        let project = projects::create_project(&db, "p", 10, &["m".to_string()])
            .await
            .unwrap();
        let session = find(&db, project.id, "m").await.unwrap().unwrap();
        assert_eq!(session.count, 0);
        assert!(!session.online);

        update_progress(&db, session.id, 3, true).await.unwrap();
        update_progress(&db, session.id, 3, true).await.unwrap();
        let result = update_progress(&db, session.id, 2, true).await;
        assert!(matches!(result, Err(Error::Invariant(_))));

        let session = get(&db, session.id).await.unwrap();
        assert_eq!(session.count, 3);
        assert!(session.online);
    }

    #[tokio::test]
    async fn test_list_orders_by_count() {
        let db = init_memory_database().await.unwrap();
        let project = projects::create_project(
            &db,
            "p",
            10,
            &["a".to_string(), "b".to_string(), "c".to_string()],
        )
        .await
        .unwrap();
        let a = find(&db, project.id, "a").await.unwrap().unwrap();
        update_progress(&db, a.id, 4, false).await.unwrap();

        let names: Vec<String> = list_for_project(&db, project.id)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["b", "c", "a"]);
    }
}
