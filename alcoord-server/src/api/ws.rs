//! Model coordination websocket
//!
//! One connection per model client. A writer task drains the connection's
//! outbound queue; the reader handles inbound frames one at a time so a
//! session's messages are never processed out of order.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::coordinator::{
    ConnectionHandle, Coordinator, RegisterOutcome, Selection, SessionBinding, UtteranceOutcome,
};
use crate::error::{Error, Result};
use crate::AppState;
use alcoord_common::ClientMessage;

/// GET /model (websocket upgrade)
pub async fn model_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state.coordinator))
}

async fn handle_socket(socket: WebSocket, coordinator: Arc<Coordinator>) {
    let (mut sink, mut stream) = socket.split();
    let (handle, mut outbound) = ConnectionHandle::new();
    debug!("Model connection {} opened", handle.id);

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            let text = match message.encode() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode {} message: {}", message.kind(), e);
                    continue;
                }
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
            if message.is_terminal() {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    });

    let mut binding: Option<SessionBinding> = None;

    while let Some(frame) = stream.next().await {
        let text = match frame {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("Connection {} read error: {}", handle.id, e);
                break;
            }
        };

        let message = match ClientMessage::decode(&text) {
            Ok(message) => message,
            Err(e) => {
                warn!("Connection {} sent an invalid frame: {}", handle.id, e);
                continue;
            }
        };

        if let Err(e) = dispatch(&coordinator, &handle, &mut binding, message).await {
            match e {
                Error::Invariant(_) | Error::BudgetExceeded(_) => {
                    error!("Connection {}: {}", handle.id, e)
                }
                _ => warn!("Connection {}: {}", handle.id, e),
            }
        }

        if writer.is_finished() {
            break;
        }
    }

    if let Some(binding) = binding {
        if let Err(e) = coordinator.disconnect(&binding).await {
            warn!("Failed to record disconnect of session {}: {}", binding.session_id, e);
        }
    }
    info!("Model connection {} closed", handle.id);

    drop(handle);
    let _ = writer.await;
}

/// Handle one decoded frame
async fn dispatch(
    coordinator: &Coordinator,
    handle: &ConnectionHandle,
    binding: &mut Option<SessionBinding>,
    message: ClientMessage,
) -> Result<()> {
    debug!("Connection {} -> {}", handle.id, message.kind());
    match message {
        ClientMessage::Register {
            project_name,
            model_name,
            count,
        } => {
            if let Some(previous) = binding.take() {
                coordinator.disconnect(&previous).await?;
            }
            match coordinator
                .register(handle, &project_name, &model_name, count)
                .await?
            {
                RegisterOutcome::Accepted(accepted) => *binding = Some(accepted),
                RegisterOutcome::Finished => {}
            }
            Ok(())
        }

        ClientMessage::Utterance {
            utterance,
            label,
            count,
            client_time,
            al_time,
            io_time_start,
        } => {
            let bound = binding
                .as_ref()
                .ok_or_else(|| Error::Protocol("utterance before register".to_string()))?;
            let selection = Selection {
                utterance,
                label,
                count,
                client_time,
                al_time,
                io_time_start,
            };
            let outcome = coordinator.receive_utterance(bound, selection).await;
            if matches!(outcome, Ok(UtteranceOutcome::Finished) | Err(Error::BudgetExceeded(_))) {
                *binding = None;
            }
            outcome.map(|_| ())
        }

        ClientMessage::Scores {
            precision,
            recall,
            f1,
            count,
        } => {
            let bound = binding
                .as_ref()
                .ok_or_else(|| Error::Protocol("scores before register".to_string()))?;
            coordinator
                .receive_scores(bound, precision, recall, f1, count)
                .await
        }
    }
}
