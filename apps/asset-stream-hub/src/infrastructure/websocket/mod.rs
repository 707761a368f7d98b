//! WebSocket Connection Acceptor
//!
//! Upgrades HTTP requests on the hub path to WebSocket channels and hands
//! each connection's lifecycle to the [`ConnectionHub`](crate::ConnectionHub):
//!
//! 1. Upgrade (origin is not checked).
//! 2. Optionally read a client identifier as the first message; a failure
//!    here drops the connection without registering it.
//! 3. Register the write half with the hub.
//! 4. Read inbound frames only to notice the peer going away, or until the
//!    hub closes the sink after a failed write.
//! 5. Unregister and drop both halves, which releases the socket.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::State;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use futures::Stream;
use futures::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::application::ports::{SinkError, SnapshotSink};
use crate::domain::connection::{ClientIdentifier, ConnectionState};
use crate::infrastructure::metrics;
use crate::infrastructure::server::HubServerState;

// =============================================================================
// Outbound Adapter
// =============================================================================

/// Write half of an upgraded WebSocket, stored in the hub registry.
///
/// Closing it also fires [`WebSocketSink::close_signal`] so the read half
/// stops waiting on the peer.
pub struct WebSocketSink<S = SplitSink<WebSocket, Message>> {
    inner: S,
    closed: bool,
    close_signal: CancellationToken,
}

impl<S> WebSocketSink<S> {
    /// Wrap a sink half.
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            closed: false,
            close_signal: CancellationToken::new(),
        }
    }

    /// Token cancelled once this sink is closed.
    #[must_use]
    pub fn close_signal(&self) -> CancellationToken {
        self.close_signal.clone()
    }
}

#[async_trait]
impl<S> SnapshotSink for WebSocketSink<S>
where
    S: futures::Sink<Message, Error = axum::Error> + Unpin + Send,
{
    async fn send_text(&mut self, payload: &str) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::Closed);
        }
        self.inner
            .send(Message::Text(payload.to_owned().into()))
            .await
            .map_err(|e| SinkError::SendFailed(e.to_string()))
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.close_signal.cancel();
        if let Err(e) = self.inner.close().await {
            tracing::debug!(error = %e, "WebSocket close did not complete cleanly");
        }
    }
}

// =============================================================================
// Inbound Handling
// =============================================================================

/// Failure reading the client identifier.
#[derive(Debug, thiserror::Error)]
pub enum HandshakeError {
    /// Peer closed before sending an identifier.
    #[error("connection closed before client identifier was received")]
    Closed,
    /// Transport error while reading.
    #[error("read failed: {0}")]
    ReadFailed(String),
    /// First message was not a JSON string.
    #[error("invalid client identifier: {0}")]
    InvalidIdentifier(String),
}

/// Why the read loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectCause {
    /// Peer sent a close frame.
    CloseFrame,
    /// Stream ended without a close frame.
    StreamEnded,
    /// Read failed.
    ReadFailed(String),
    /// Hub closed the write half.
    ClosedByHub,
}

/// Read the first data message as a JSON-encoded string identifier.
///
/// Ping and pong frames before it are skipped.
///
/// # Errors
///
/// Returns `HandshakeError` if the peer closes, the read fails, or the
/// message is not a JSON string.
pub async fn read_client_identifier<S>(stream: &mut S) -> Result<ClientIdentifier, HandshakeError>
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let message = match stream.next().await {
            None | Some(Ok(Message::Close(_))) => return Err(HandshakeError::Closed),
            Some(Err(e)) => return Err(HandshakeError::ReadFailed(e.to_string())),
            Some(Ok(message)) => message,
        };

        let parsed = match message {
            Message::Text(text) => serde_json::from_str::<String>(text.as_str()),
            Message::Binary(bytes) => serde_json::from_slice::<String>(&bytes),
            Message::Ping(_) | Message::Pong(_) | Message::Close(_) => continue,
        };

        return parsed.map_err(|e| HandshakeError::InvalidIdentifier(e.to_string()));
    }
}

/// Drain inbound frames until the peer goes away or `closed` fires.
///
/// Message content is ignored.
pub async fn watch_liveness<S>(stream: &mut S, closed: &CancellationToken) -> DisconnectCause
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let message = tokio::select! {
            () = closed.cancelled() => return DisconnectCause::ClosedByHub,
            message = stream.next() => message,
        };
        match message {
            None => return DisconnectCause::StreamEnded,
            Some(Ok(Message::Close(_))) => return DisconnectCause::CloseFrame,
            Some(Ok(_)) => {}
            Some(Err(e)) => return DisconnectCause::ReadFailed(e.to_string()),
        }
    }
}

// =============================================================================
// HTTP Handler
// =============================================================================

/// Upgrade handler mounted on the hub path.
pub async fn ws_handler(
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
    State(state): State<Arc<HubServerState>>,
) -> Response {
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            tracing::warn!(error = %rejection, "WebSocket upgrade rejected");
            metrics::record_handshake_failure();
            return rejection.into_response();
        }
    };

    upgrade
        .on_failed_upgrade(|e| {
            tracing::warn!(error = %e, "WebSocket upgrade failed");
            metrics::record_handshake_failure();
        })
        .on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one upgraded connection from registration to unregistration.
async fn handle_socket(socket: WebSocket, state: Arc<HubServerState>) {
    let (sink, mut stream) = socket.split();
    tracing::debug!(state = ?ConnectionState::Pending, "WebSocket upgraded");

    let client_id = if state.identify_clients() {
        match read_client_identifier(&mut stream).await {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(error = %e, "Error reading client identifier");
                metrics::record_handshake_failure();
                return;
            }
        }
    } else {
        None
    };

    let sink = WebSocketSink::new(sink);
    let closed = sink.close_signal();

    let hub = state.hub();
    let connection_id = hub.register(Box::new(sink), client_id).await;

    let cause = watch_liveness(&mut stream, &closed).await;
    tracing::debug!(connection_id = %connection_id, cause = ?cause, "Client read loop ended");

    hub.unregister(connection_id).await;
}

// =============================================================================
// Tests
// =============================================================================
