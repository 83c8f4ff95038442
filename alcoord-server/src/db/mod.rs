//! Coordination store
//!
//! Durable records for projects, sessions, labeled instances and score
//! samples. Backed by SQLite through sqlx.

pub mod init;
pub mod instances;
pub mod models;
pub mod projects;
pub mod scores;
pub mod sessions;

pub use init::{init_database, init_memory_database};
pub use models::*;
