//! Bridge websocket handling.
//!
//! # Responsibilities
//! - Authenticate the upgrade request by outbound token
//! - Bind the accepted socket to its endpoint, replacing any older socket
//! - Read commands until the socket breaks and hand each to the dispatcher
//! - Unbind on exit and tell the sync proxy to stop
//!
//! # Data Flow
//! ```text
//! GET /_matrix/client/unstable/fi.mau.as_sync
//!     → auth (403 before upgrade on missing/unknown token)
//!     → upgrade → {"status":"connected"} → Endpoint::attach
//!     → read loop → Dispatcher::spawn per command
//!     → read error / malformed frame / close / replaced
//!     → Endpoint::detach (stop sync proxy if still bound)
//! ```
//!
//! # Design Decisions
//! - A frame that is not a valid command ends the session; the bridge
//!   reconnects with a clean state
//! - The read loop also stops when the gateway closed the socket itself
//!   (replacement or shutdown), without waiting for the peer's close reply
//! - A socket accepted after shutdown started is closed without reading

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{HeaderMap, Uri},
    response::{IntoResponse, Response},
};
use futures_util::{Stream, StreamExt};

use crate::http::auth::authenticate_outbound;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::protocol::{CommandEnvelope, ConnectedStatus, Dispatcher};
use crate::registry::{Connection, Endpoint};
use crate::syncproxy::SyncProxyClient;

/// `GET /_matrix/client/unstable/fi.mau.as_sync`.
pub async fn sync_websocket(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let endpoint = match authenticate_outbound(&state.registry, &headers, &uri) {
        Ok(endpoint) => endpoint,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected websocket");
            return e.into_response();
        }
    };
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            tracing::warn!(endpoint = %endpoint.id(), error = %rejection, "Not a websocket upgrade");
            return rejection.into_response();
        }
    };

    let close_timeout = Duration::from_secs(state.http.close_timeout_secs);
    let sync_proxy = state.sync_proxy.clone();
    let failed_endpoint = endpoint.id().to_string();
    upgrade
        .on_failed_upgrade(move |e| {
            tracing::warn!(endpoint = %failed_endpoint, error = %e, "Failed to upgrade websocket");
        })
        .on_upgrade(move |socket: WebSocket| async move {
            let (sink, stream) = socket.split();
            let conn = Connection::new(Box::pin(sink));
            run_session(endpoint, sync_proxy, conn, stream, close_timeout).await;
        })
}

/// Drive one websocket session from bind to unbind.
pub async fn run_session<S>(
    endpoint: Arc<Endpoint>,
    sync_proxy: Arc<SyncProxyClient>,
    conn: Arc<Connection>,
    mut stream: S,
    close_timeout: Duration,
) where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    tracing::info!(endpoint = %endpoint.id(), connection_id = %conn.id(), "Websocket connected");

    if let Err(e) = conn.send_json(&ConnectedStatus::default()).await {
        tracing::warn!(
            endpoint = %endpoint.id(),
            connection_id = %conn.id(),
            error = %e,
            "Failed to write connected status"
        );
    }
    if !endpoint.attach(conn.clone(), close_timeout).await {
        conn.closed().await;
        return;
    }
    metrics::set_connected(endpoint.id(), true);

    let dispatcher = Dispatcher::new(endpoint.clone(), sync_proxy.clone());
    loop {
        let frame = tokio::select! {
            biased;
            _ = conn.closed() => {
                tracing::debug!(connection_id = %conn.id(), "Websocket closed by gateway");
                break;
            }
            frame = stream.next() => frame,
        };

        let message = match frame {
            Some(Ok(message)) => message,
            Some(Err(e)) => {
                tracing::info!(endpoint = %endpoint.id(), connection_id = %conn.id(), error = %e, "Error reading from websocket");
                break;
            }
            None => break,
        };

        let decoded = match &message {
            Message::Text(text) => serde_json::from_str::<CommandEnvelope>(text.as_str()),
            Message::Binary(bytes) => serde_json::from_slice::<CommandEnvelope>(bytes),
            Message::Close(frame) => {
                tracing::info!(
                    endpoint = %endpoint.id(),
                    connection_id = %conn.id(),
                    code = frame.as_ref().map(|f| f.code),
                    "Websocket closed by peer"
                );
                break;
            }
            Message::Ping(_) | Message::Pong(_) => continue,
        };

        match decoded {
            Ok(cmd) => {
                tracing::debug!(
                    endpoint = %endpoint.id(),
                    command = %cmd.command,
                    request_id = cmd.request_id,
                    "Received command"
                );
                dispatcher.spawn(conn.clone(), cmd);
            }
            Err(e) => {
                tracing::warn!(
                    endpoint = %endpoint.id(),
                    connection_id = %conn.id(),
                    error = %e,
                    "Malformed command from websocket"
                );
                break;
            }
        }
    }

    tracing::info!(endpoint = %endpoint.id(), connection_id = %conn.id(), "Websocket disconnected");
    let (ep, proxy) = (&endpoint, &sync_proxy);
    endpoint
        .detach(&conn, move || async move {
            metrics::set_connected(ep.id(), false);
            if let Err(e) = proxy.stop(ep).await {
                tracing::warn!(
                    endpoint = %ep.id(),
                    error = %e,
                    "Failed to stop sync proxy after websocket disconnected"
                );
            }
        })
        .await;
    conn.shutdown().await;
}
