//! Store records

use serde::Serialize;

/// A group of sibling sessions sharing one annotation budget
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ProjectRecord {
    pub id: i64,
    pub name: String,
    /// Annotation budget per session
    pub max_count: i64,
}

/// One client's run within a project
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SessionRecord {
    pub id: i64,
    pub project_id: i64,
    pub name: String,
    /// Number of labels the client has incorporated; never decreases
    pub count: i64,
    pub online: bool,
}

/// One selected utterance, labeled or still pending
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct InstanceRecord {
    pub id: i64,
    pub project_id: i64,
    pub session_id: i64,
    pub utterance: String,
    /// `None` while waiting for a human annotator
    pub annotation: Option<i64>,
    pub client_time: Option<f64>,
    pub al_time: Option<f64>,
    pub io_time: Option<f64>,
    /// Label was reused from an earlier instance rather than annotated
    pub copied: bool,
    /// Label has been pushed to the owning session
    pub delivered: bool,
}

/// Fields for a new instance row
#[derive(Debug, Clone)]
pub struct NewInstance<'a> {
    pub project_id: i64,
    pub session_id: i64,
    pub utterance: &'a str,
    pub annotation: Option<i64>,
    pub client_time: f64,
    pub al_time: f64,
    pub io_time: f64,
    pub copied: bool,
    pub delivered: bool,
}

/// One reported metric snapshot
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct ScoreSample {
    pub session_id: i64,
    pub count: i64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Session progress plus label tallies, for the status endpoint
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct SessionStatus {
    pub name: String,
    pub online: bool,
    pub count: i64,
    pub positives: i64,
    pub negatives: i64,
}
