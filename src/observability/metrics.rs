//! Metrics collection and exposition.
//!
//! # Responsibilities
//! - Define gateway metrics (transactions, commands, connections, delegation)
//! - Install the Prometheus recorder and serve `/metrics`
//!
//! # Metrics
//! - `wsproxy_transactions_total` (counter): inbound pushes by kind, outcome
//! - `wsproxy_commands_total` (counter): bridge commands by command, outcome
//! - `wsproxy_connected` (gauge): 1 while an endpoint has a bound websocket
//! - `wsproxy_delegation_requests_total` (counter): sync proxy calls by method, outcome
//! - `wsproxy_delegation_duration_seconds` (histogram): sync proxy latency by method
//!
//! # Design Decisions
//! - Record functions are plain calls into the `metrics` facade and do
//!   nothing until a recorder is installed
//! - The exporter listens on its own address so scrapes never share the
//!   gateway's request timeout or body limits

use std::net::SocketAddr;
use std::time::Instant;

use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use thiserror::Error;

/// Failure to start the metrics exporter.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("failed to install metrics recorder: {0}")]
    Install(#[from] BuildError),

    #[error("failed to bind metrics listener: {0}")]
    Bind(#[from] std::io::Error),
}

/// Install the global Prometheus recorder.
pub fn install_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

/// Install the recorder and serve it on `addr` in a background task.
pub async fn init_metrics(addr: SocketAddr) -> Result<(), MetricsError> {
    let handle = install_recorder()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    let app = axum::Router::new().route(
        "/metrics",
        axum::routing::get(move || async move { handle.render() }),
    );

    tracing::info!(address = %addr, "Serving Prometheus metrics");
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "Metrics server failed");
        }
    });
    Ok(())
}

/// Record an inbound transaction or error push.
pub fn record_transaction(kind: &'static str, outcome: &'static str) {
    counter!("wsproxy_transactions_total", "kind" => kind, "outcome" => outcome).increment(1);
}

/// Record a finished bridge command.
pub fn record_command(command: &'static str, outcome: &'static str) {
    counter!("wsproxy_commands_total", "command" => command, "outcome" => outcome).increment(1);
}

/// Update whether `endpoint` has a bound websocket.
pub fn set_connected(endpoint: &str, connected: bool) {
    gauge!("wsproxy_connected", "endpoint" => endpoint.to_string())
        .set(if connected { 1.0 } else { 0.0 });
}

/// Record one sync proxy request.
pub fn record_delegation(method: &str, outcome: &'static str, start_time: Instant) {
    let method = method.to_string();
    counter!(
        "wsproxy_delegation_requests_total",
        "method" => method.clone(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("wsproxy_delegation_duration_seconds", "method" => method)
        .record(start_time.elapsed().as_secs_f64());
}
