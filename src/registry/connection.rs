//! Websocket connection handles.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing and identity checks
//! - Own the write half of an accepted websocket
//! - Serialize writes so concurrent senders never interleave frames
//! - Send protocol close frames with a bounded deadline

use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message};
use futures_util::{Sink, SinkExt};
use serde::Serialize;
use tokio::sync::{watch, Mutex};

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Close code sent to a socket that was superseded by a newer one.
pub const CLOSE_CONN_REPLACED: u16 = 4001;

/// Standard "going away" close code, used on shutdown.
pub const CLOSE_GOING_AWAY: u16 = 1001;

/// Close reason sent alongside [`CLOSE_CONN_REPLACED`].
pub const REASON_CONN_REPLACED: &str = r#"{"command":"disconnect","status":"conn_replaced"}"#;

/// Close reason sent alongside [`CLOSE_GOING_AWAY`].
pub const REASON_SHUTTING_DOWN: &str = r#"{"command":"disconnect","status":"server_shutting_down"}"#;

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// The write half of a websocket, type-erased so tests can substitute a channel.
pub type FrameSink = Pin<Box<dyn Sink<Message, Error = axum::Error> + Send>>;

/// Error writing to a connection.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("websocket write failed: {0}")]
    Transport(#[from] axum::Error),
}

/// A live websocket as seen by the rest of the gateway.
///
/// The sink mutex is the write-serialization lock: transaction deliveries
/// and command responses for this socket queue on it, one frame at a time.
pub struct Connection {
    id: ConnectionId,
    sink: Mutex<FrameSink>,
    closed: watch::Sender<bool>,
}

impl Connection {
    /// Wrap the write half of an accepted websocket.
    pub fn new(sink: FrameSink) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::new(),
            sink: Mutex::new(sink),
            closed: watch::Sender::new(false),
        })
    }

    /// Get this connection's ID.
    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// Encode `value` as JSON and write it as a single text frame.
    pub async fn send_json<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), SendError> {
        let text = serde_json::to_string(value)?;
        self.send_text(text).await
    }

    /// Write a raw text frame.
    pub async fn send_text(&self, text: String) -> Result<(), SendError> {
        let mut sink = self.sink.lock().await;
        sink.send(Message::Text(text.into())).await?;
        Ok(())
    }

    /// Send a close frame and close the write half, giving up after `deadline`.
    pub async fn close(&self, code: u16, reason: &str, deadline: Duration) {
        let frame = CloseFrame {
            code,
            reason: reason.into(),
        };
        let result = tokio::time::timeout(deadline, async {
            let mut sink = self.sink.lock().await;
            sink.send(Message::Close(Some(frame))).await?;
            sink.close().await
        })
        .await;

        match result {
            Ok(Ok(())) => tracing::trace!(connection_id = %self.id, code, "Close frame sent"),
            Ok(Err(e)) => {
                tracing::debug!(connection_id = %self.id, error = %e, "Failed to send close frame")
            }
            Err(_) => tracing::debug!(connection_id = %self.id, "Timed out sending close frame"),
        }
        self.closed.send_replace(true);
    }

    /// Resolve once [`close`](Self::close) has finished, so the read loop
    /// can stop even if the peer never answers the close frame.
    pub async fn closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    /// Whether [`close`](Self::close) has finished.
    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Close the write half without a close frame (used once the read side is gone).
    pub async fn shutdown(&self) {
        let mut sink = self.sink.lock().await;
        let _ = sink.close().await;
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").field("id", &self.id).finish()
    }
}
