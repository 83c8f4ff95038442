//! Cross-session load balancing
//!
//! Keeps sibling sessions of a project within `threshold` labels of each
//! other by only offering the laggards' instances once the spread grows
//! too wide.

use crate::db::{InstanceRecord, SessionRecord};
use crate::error::{Error, Result};
use tracing::info;

/// Restrict `pending` to what may be offered next
///
/// When `max(count) - min(count) > threshold`, only instances belonging to
/// a session at the minimum count survive. An empty result after filtering
/// means a lagging session has nothing queued while a leader does, which
/// the protocol never allows.
pub fn balance_candidates(
    sessions: &[SessionRecord],
    pending: Vec<InstanceRecord>,
    threshold: i64,
) -> Result<Vec<InstanceRecord>> {
    let (Some(min), Some(max)) = (
        sessions.iter().map(|s| s.count).min(),
        sessions.iter().map(|s| s.count).max(),
    ) else {
        return Ok(pending);
    };

    if max - min <= threshold {
        return Ok(pending);
    }

    let laggards: Vec<i64> = sessions
        .iter()
        .filter(|s| s.count == min)
        .map(|s| s.id)
        .collect();

    let filtered: Vec<InstanceRecord> = pending
        .into_iter()
        .filter(|instance| laggards.contains(&instance.session_id))
        .collect();

    if filtered.is_empty() {
        return Err(Error::Invariant(format!(
            "count spread {} exceeds {} but sessions at count {} have no pending instance",
            max - min,
            threshold,
            min
        )));
    }

    info!(
        "Balancing: spread {} > {}, offering only sessions at count {}",
        max - min,
        threshold,
        min
    );
    Ok(filtered)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: i64, count: i64) -> SessionRecord {
        SessionRecord {
            id,
            project_id: 1,
            name: format!("s{}", id),
            count,
            online: true,
        }
    }

    fn instance(id: i64, session_id: i64) -> InstanceRecord {
        InstanceRecord {
            id,
            project_id: 1,
            session_id,
            utterance: format!("u{}", id),
            annotation: None,
            client_time: None,
            al_time: None,
            io_time: None,
            copied: false,
            delivered: false,
        }
    }

    #[test]
    fn test_wide_spread_offers_only_laggards() {
        let sessions = vec![session(1, 0), session(2, 0), session(3, 6)];
        let pending = vec![instance(10, 3), instance(11, 1), instance(12, 2), instance(13, 3)];

        let candidates = balance_candidates(&sessions, pending, 5).unwrap();
        let owners: Vec<i64> = candidates.iter().map(|i| i.session_id).collect();
        assert_eq!(owners, vec![1, 2]);
    }

    #[test]
    fn test_spread_at_threshold_keeps_everything() {
        let sessions = vec![session(1, 0), session(2, 5)];
        let pending = vec![instance(10, 2), instance(11, 1)];

        let candidates = balance_candidates(&sessions, pending, 5).unwrap();
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn test_empty_filter_is_invariant_violation() {
        let sessions = vec![session(1, 0), session(2, 0), session(3, 6)];
        let pending = vec![instance(10, 3)];

        let result = balance_candidates(&sessions, pending, 5);
        assert!(matches!(result, Err(Error::Invariant(_))));
    }
}
