//! Score sample queries

use super::models::ScoreSample;
use crate::error::Result;
use sqlx::SqlitePool;

/// Store a metric snapshot keyed by (session, count)
///
/// A repeated snapshot at the same count (baseline re-sent after a
/// reconnect) replaces the earlier one.
pub async fn upsert(db: &SqlitePool, sample: &ScoreSample) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO scores (session_id, count, precision, recall, f1)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (session_id, count) DO UPDATE SET
            precision = excluded.precision,
            recall = excluded.recall,
            f1 = excluded.f1,
            created_at = CURRENT_TIMESTAMP
        "#,
    )
    .bind(sample.session_id)
    .bind(sample.count)
    .bind(sample.precision)
    .bind(sample.recall)
    .bind(sample.f1)
    .execute(db)
    .await?;
    Ok(())
}

/// All samples of a session ordered by count
pub async fn list_for_session(db: &SqlitePool, session_id: i64) -> Result<Vec<ScoreSample>> {
    let samples = sqlx::query_as::<_, ScoreSample>(
        "SELECT session_id, count, precision, recall, f1 FROM scores \
         WHERE session_id = ? ORDER BY count",
    )
    .bind(session_id)
    .fetch_all(db)
    .await?;
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init::init_memory_database, projects, sessions};

    #[tokio::test]
    async fn test_upsert_replaces_same_count() {
        let db = init_memory_database().await.unwrap();
        let project = projects::create_project(&db, "p", 10, &["m".to_string()])
            .await
            .unwrap();
        let session = sessions::find(&db, project.id, "m").await.unwrap().unwrap();

        let mut sample = ScoreSample {
            session_id: session.id,
            count: 0,
            precision: 0.5,
            recall: 0.5,
            f1: 0.5,
        };
        upsert(&db, &sample).await.unwrap();
        sample.f1 = 0.75;
        upsert(&db, &sample).await.unwrap();
        sample.count = 1;
        upsert(&db, &sample).await.unwrap();

        let stored = list_for_session(&db, session.id).await.unwrap();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].f1, 0.75);
        assert_eq!(stored[1].count, 1);
    }
}
