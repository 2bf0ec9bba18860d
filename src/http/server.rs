//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router for transaction ingress and the bridge websocket
//! - Wire up middleware (tracing, request ID, timeout)
//! - Serve on a bound listener until shutdown, then close every websocket
//!   and drain in-flight requests up to a deadline

use std::sync::Arc;
use std::time::Duration;

use axum::{
    error_handling::HandleErrorLayer,
    routing::{get, put},
    BoxError, Router,
};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, watch};
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::trace::TraceLayer;

use crate::config::HttpConfig;
use crate::http::error::IngressError;
use crate::http::request::{make_span, propagate_request_id_layer, set_request_id_layer};
use crate::http::transactions::{put_syncproxy_error, put_transaction};
use crate::http::websocket::sync_websocket;
use crate::lifecycle::shutdown::{drain_with_deadline, recv_shutdown};
use crate::registry::Registry;
use crate::syncproxy::SyncProxyClient;

/// Application state injected into handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub sync_proxy: Arc<SyncProxyClient>,
    pub http: HttpConfig,
}

/// Build the Axum router with all middleware layers.
pub fn build_router(state: AppState) -> Router {
    let request_timeout = Duration::from_secs(state.http.request_timeout_secs);

    let ingress = Router::new()
        .route("/transactions/{txn_id}", put(put_transaction))
        .route("/_matrix/app/v1/transactions/{txn_id}", put(put_transaction))
        .route(
            "/_matrix/app/unstable/fi.mau.syncproxy/error/{txn_id}",
            put(put_syncproxy_error),
        )
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_middleware_error))
                .layer(TimeoutLayer::new(request_timeout)),
        );

    Router::new()
        .merge(ingress)
        .route("/_matrix/client/unstable/fi.mau.as_sync", get(sync_websocket))
        .with_state(state)
        .layer(propagate_request_id_layer())
        .layer(TraceLayer::new_for_http().make_span_with(make_span))
        .layer(set_request_id_layer())
}

/// Turn a timed-out ingress request into a Matrix error body.
async fn handle_middleware_error(err: BoxError) -> IngressError {
    if err.is::<tower::timeout::error::Elapsed>() {
        tracing::warn!("Push timed out");
        IngressError::Timeout
    } else {
        tracing::error!(error = %err, "Unhandled middleware error");
        IngressError::Unhandled(err.to_string())
    }
}

/// Run the server until `shutdown` fires.
///
/// On shutdown every bound websocket gets the going-away close frame, then
/// in-flight requests get `shutdown_timeout_secs` to finish.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    let addr = listener.local_addr()?;
    tracing::info!(address = %addr, endpoints = state.registry.endpoints().len(), "HTTP server starting");

    let registry = state.registry.clone();
    let close_timeout = Duration::from_secs(state.http.close_timeout_secs);
    let drain_deadline = Duration::from_secs(state.http.shutdown_timeout_secs);
    let (triggered_tx, mut triggered_rx) = watch::channel(false);

    let signal = async move {
        recv_shutdown(shutdown).await;
        tracing::info!("Shutdown requested, closing websockets");
        registry.disconnect_all(close_timeout).await;
        let _ = triggered_tx.send(true);
    };
    let triggered = async move {
        let _ = triggered_rx.wait_for(|triggered| *triggered).await;
    };

    let server = axum::serve(listener, build_router(state)).with_graceful_shutdown(signal);
    match drain_with_deadline(std::future::IntoFuture::into_future(server), triggered, drain_deadline).await {
        Some(result) => result?,
        None => tracing::warn!("Abandoning requests still in flight"),
    }

    tracing::info!("HTTP server stopped");
    Ok(())
}
