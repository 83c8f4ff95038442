//! Live transport handles, keyed by session

use alcoord_common::ServerMessage;
use std::collections::HashMap;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

/// Outbound half of one websocket connection
///
/// Messages queued here are written to the socket by the connection's
/// writer task, in order.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    pub id: Uuid,
    tx: mpsc::UnboundedSender<ServerMessage>,
}

impl ConnectionHandle {
    /// New handle plus the receiver its writer task drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ServerMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                id: Uuid::new_v4(),
                tx,
            },
            rx,
        )
    }

    /// Queue a message; false if the connection is gone
    pub fn send(&self, message: ServerMessage) -> bool {
        self.tx.send(message).is_ok()
    }
}

/// Session id → currently bound connection
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    handles: RwLock<HashMap<i64, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `handle` to a session, replacing any previous connection
    pub async fn bind(&self, session_id: i64, handle: ConnectionHandle) {
        let mut handles = self.handles.write().await;
        if let Some(previous) = handles.insert(session_id, handle.clone()) {
            if previous.id != handle.id {
                warn!(
                    "Session {} re-registered from connection {}; dropping connection {}",
                    session_id, handle.id, previous.id
                );
            }
        }
    }

    /// Remove the binding only if it still belongs to `connection_id`
    ///
    /// Returns true when a binding was removed.
    pub async fn unbind(&self, session_id: i64, connection_id: Uuid) -> bool {
        let mut handles = self.handles.write().await;
        match handles.get(&session_id) {
            Some(handle) if handle.id == connection_id => {
                handles.remove(&session_id);
                debug!("Unbound session {} from connection {}", session_id, connection_id);
                true
            }
            _ => false,
        }
    }

    /// Push a message to a session's live connection
    ///
    /// Returns false when the session is offline.
    pub async fn send(&self, session_id: i64, message: ServerMessage) -> bool {
        let handles = self.handles.read().await;
        match handles.get(&session_id) {
            Some(handle) => handle.send(message),
            None => false,
        }
    }

    pub async fn is_connected(&self, session_id: i64) -> bool {
        self.handles.read().await.contains_key(&session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_send_reaches_bound_connection() {
        let registry = ConnectionRegistry::new();
        let (handle, mut rx) = ConnectionHandle::new();
        registry.bind(7, handle).await;

        assert!(registry.send(7, ServerMessage::NextUtterance { io_time_start: 1.0 }).await);
        assert!(!registry.send(8, ServerMessage::NextUtterance { io_time_start: 1.0 }).await);
        assert_eq!(
            rx.recv().await,
            Some(ServerMessage::NextUtterance { io_time_start: 1.0 })
        );
    }

    #[tokio::test]
    async fn test_stale_connection_cannot_unbind_replacement() {
        let registry = ConnectionRegistry::new();
        let (old, _old_rx) = ConnectionHandle::new();
        let (new, _new_rx) = ConnectionHandle::new();
        let old_id = old.id;
        let new_id = new.id;

        registry.bind(1, old).await;
        registry.bind(1, new).await;

        assert!(!registry.unbind(1, old_id).await);
        assert!(registry.is_connected(1).await);
        assert!(registry.unbind(1, new_id).await);
        assert!(!registry.is_connected(1).await);
    }
}
