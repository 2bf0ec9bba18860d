//! A registered appservice and its websocket binding.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::registry::connection::{
    Connection, CLOSE_CONN_REPLACED, CLOSE_GOING_AWAY, REASON_CONN_REPLACED, REASON_SHUTTING_DOWN,
};
use crate::registry::slot::{Accepted, ConnectionSlot};

/// Failure to hand a message to an endpoint's websocket.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No websocket is bound; the message is dropped, not queued.
    #[error("endpoint is not connected to websocket")]
    NotConnected,

    /// The bound websocket rejected the write.
    #[error("failed to send data through websocket: {0}")]
    SendFailed(String),
}

/// One registered bridge.
///
/// Identity and tokens are fixed for the process lifetime; only the
/// connection slot changes.
pub struct Endpoint {
    id: String,
    inbound_token: String,
    outbound_token: String,
    slot: ConnectionSlot,
}

impl Endpoint {
    pub fn new(
        id: impl Into<String>,
        inbound_token: impl Into<String>,
        outbound_token: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            inbound_token: inbound_token.into(),
            outbound_token: outbound_token.into(),
            slot: ConnectionSlot::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Token the homeserver uses to push transactions.
    pub fn inbound_token(&self) -> &str {
        &self.inbound_token
    }

    /// Token the bridge uses to open the websocket.
    pub fn outbound_token(&self) -> &str {
        &self.outbound_token
    }

    /// Bind `conn` as this endpoint's websocket.
    ///
    /// A previously bound socket is told it was replaced and closed in a
    /// separate task; the new socket does not wait for that. After shutdown
    /// started, `conn` itself is closed with the shutting-down status and
    /// `false` is returned.
    pub async fn attach(&self, conn: Arc<Connection>, close_timeout: Duration) -> bool {
        let new_id = conn.id();
        match self.slot.accept(conn).await {
            Accepted::Bound { replaced: None } => true,
            Accepted::Bound {
                replaced: Some(old),
            } => {
                tracing::info!(
                    endpoint = %self.id,
                    old_connection = %old.id(),
                    new_connection = %new_id,
                    "Replacing existing websocket"
                );
                tokio::spawn(async move {
                    old.close(CLOSE_CONN_REPLACED, REASON_CONN_REPLACED, close_timeout)
                        .await;
                });
                true
            }
            Accepted::Sealed(conn) => {
                tracing::info!(endpoint = %self.id, connection_id = %new_id, "Refusing websocket during shutdown");
                tokio::spawn(async move {
                    conn.close(CLOSE_GOING_AWAY, REASON_SHUTTING_DOWN, close_timeout)
                        .await;
                });
                false
            }
        }
    }

    /// Unbind `conn` if it is still current, running `on_detached` under the
    /// slot's transition lock. Returns whether `conn` was the bound socket.
    pub async fn detach<F, Fut>(&self, conn: &Arc<Connection>, on_detached: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        self.slot.detach(conn, on_detached).await
    }

    /// Snapshot of the bound websocket.
    pub fn connection(&self) -> Option<Arc<Connection>> {
        self.slot.current()
    }

    /// Whether a websocket is currently bound.
    pub fn is_connected(&self) -> bool {
        self.slot.current().is_some()
    }

    /// Write `payload` to the bound websocket as one JSON frame.
    ///
    /// Returns only after the write itself completed. A failed write leaves
    /// the binding alone; the socket's own read loop detaches it.
    pub async fn deliver<T: Serialize + ?Sized>(&self, payload: &T) -> Result<(), DeliveryError> {
        let conn = self.connection().ok_or(DeliveryError::NotConnected)?;
        conn.send_json(payload)
            .await
            .map_err(|e| DeliveryError::SendFailed(e.to_string()))
    }

    /// Close the bound websocket (if any) with the shutting-down status and
    /// refuse any socket that tries to bind afterwards.
    ///
    /// Waits for a detach that is still running its stop-sync call.
    pub async fn disconnect_for_shutdown(&self, close_timeout: Duration) {
        if let Some(conn) = self.slot.seal().await {
            tracing::info!(endpoint = %self.id, connection_id = %conn.id(), "Closing websocket for shutdown");
            tokio::spawn(async move {
                conn.close(CLOSE_GOING_AWAY, REASON_SHUTTING_DOWN, close_timeout)
                    .await;
            });
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Tokens are credentials; keep them out of logs.
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
