//! Websocket link to the coordination server
//!
//! Keeps one connection open for the lifetime of a session. Every fresh
//! connection starts with a `register` carrying the current count, so a
//! dropped link resumes exactly where the learner is. Server frames are
//! handled inline, one at a time, in arrival order.

use crate::error::{Error, Result};
use crate::session::{Session, SessionState};
use alcoord_common::{ClientMessage, ServerMessage};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// `ws://host:port/model`
    pub url: String,
    /// First delay after a failed or dropped connection
    pub reconnect_delay: Duration,
    /// Backoff cap; the delay doubles per consecutive failure
    pub max_reconnect_delay: Duration,
}

impl TransportConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Duration::from_millis(500),
            max_reconnect_delay: Duration::from_secs(10),
        }
    }
}

/// How one connection ended
enum LinkEnd {
    /// Session over; do not reconnect
    Done,
    /// Socket closed or failed; reconnect after backoff
    Dropped(String),
}

/// Drive the session over the network until it finishes or is stopped
pub async fn run(
    session: Arc<Session>,
    mut outbound: mpsc::UnboundedReceiver<ClientMessage>,
    config: TransportConfig,
) -> Result<SessionState> {
    let cancel = session.cancellation();
    let mut delay = config.reconnect_delay;

    loop {
        if cancel.is_cancelled() {
            return Ok(session.state());
        }

        session.set_state(SessionState::Connecting);
        debug!("Connecting to {}", config.url);

        let connected = tokio::select! {
            _ = cancel.cancelled() => return Ok(session.state()),
            result = connect_async(config.url.as_str()) => result,
        };

        match connected {
            Ok((socket, _response)) => {
                info!("Connected to {}", config.url);
                delay = config.reconnect_delay;
                match drive(&session, socket, &mut outbound).await? {
                    LinkEnd::Done => return Ok(session.state()),
                    LinkEnd::Dropped(reason) => {
                        warn!("Connection to {} lost: {}", config.url, reason);
                    }
                }
            }
            Err(e) => {
                warn!("Cannot connect to {}: {}", config.url, e);
            }
        }

        session.set_state(SessionState::Disconnected);
        debug!("Reconnecting in {:?}", delay);
        tokio::select! {
            _ = cancel.cancelled() => return Ok(session.state()),
            _ = tokio::time::sleep(delay) => {}
        }
        delay = (delay * 2).min(config.max_reconnect_delay);
    }
}

/// Serve one connection
///
/// Socket failures end the link with `Dropped`; local failures (training,
/// label store I/O) are returned as errors and end the session.
async fn drive(
    session: &Session,
    socket: Socket,
    outbound: &mut mpsc::UnboundedReceiver<ClientMessage>,
) -> Result<LinkEnd> {
    let cancel = session.cancellation();
    let (mut sink, mut stream) = socket.split();

    let register = session.register_message().await;
    if let Err(e) = sink.send(Message::Text(register.encode()?)).await {
        return Ok(LinkEnd::Dropped(e.to_string()));
    }
    info!(
        "Registered {}/{}",
        session.settings().project_name,
        session.settings().model_name
    );
    session.set_state(SessionState::Registered);
    // Baseline (or latest) scores at the registered count
    session.emit_scores().await?;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                // Flush whatever the session queued before stopping
                while let Ok(message) = outbound.try_recv() {
                    if sink.send(Message::Text(message.encode()?)).await.is_err() {
                        break;
                    }
                }
                let _ = sink.send(Message::Close(None)).await;
                return Ok(LinkEnd::Done);
            }

            message = outbound.recv() => {
                let Some(message) = message else {
                    let _ = sink.send(Message::Close(None)).await;
                    return Ok(LinkEnd::Done);
                };
                debug!("Sending {}", message.kind());
                if let Err(e) = sink.send(Message::Text(message.encode()?)).await {
                    // The reconnect register carries the count, so the
                    // server can recover without this frame
                    warn!("Dropped {} message: {}", message.kind(), e);
                    return Ok(LinkEnd::Dropped(e.to_string()));
                }
            }

            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let message = match ServerMessage::decode(&text) {
                        Ok(message) => message,
                        Err(e) => {
                            warn!("Ignoring malformed server frame: {}", e);
                            continue;
                        }
                    };
                    debug!("Received {}", message.kind());
                    match session.handle(message).await {
                        Ok(()) | Err(Error::Cancelled) => {}
                        Err(e) => {
                            error!("Session failed: {}", e);
                            return Err(e);
                        }
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    if cancel.is_cancelled() {
                        return Ok(LinkEnd::Done);
                    }
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "closed by server".to_string());
                    return Ok(LinkEnd::Dropped(reason));
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Ok(LinkEnd::Dropped(e.to_string())),
                None => return Ok(LinkEnd::Dropped("stream ended".to_string())),
            }
        }
    }
}
