//! Transaction ingress.
//!
//! # Responsibilities
//! - Authenticate homeserver / sync proxy pushes by inbound token
//! - Decode the body and fold legacy transaction fields
//! - Hand the push to the endpoint's websocket and report the outcome
//!
//! # Design Decisions
//! - The token is checked before the body is read
//! - Any decode error rejects the whole push; nothing is partially applied
//! - Success is only reported after the websocket write completed; nothing
//!   is queued for a disconnected endpoint

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{HeaderMap, Uri},
    Json,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::http::auth::authenticate_inbound;
use crate::http::error::IngressError;
use crate::http::server::AppState;
use crate::observability::metrics;
use crate::protocol::{
    Notification, SyncProxyErrorForward, SyncProxyErrorReport, Transaction, TransactionDelivery,
};
use crate::registry::Endpoint;

const KIND_TRANSACTION: &str = "transaction";
const KIND_SYNCPROXY_ERROR: &str = "syncproxy_error";

/// `PUT /transactions/{txnID}` and `PUT /_matrix/app/v1/transactions/{txnID}`.
pub async fn put_transaction(
    State(state): State<AppState>,
    Path(txn_id): Path<String>,
    headers: HeaderMap,
    uri: Uri,
    body: Body,
) -> Result<Json<Value>, IngressError> {
    let result = async {
        let (endpoint, mut txn) = read_push::<Transaction>(&state, &headers, &uri, body).await?;
        txn.normalize();

        let summary = txn.summary();
        tracing::info!(
            endpoint = %endpoint.id(),
            txn_id = %txn_id,
            events = summary.events,
            ephemeral = summary.ephemeral,
            otk_counts = summary.otk_counts,
            device_list_changes = summary.device_list_changes,
            "Sending transaction"
        );
        forward(&endpoint, &txn_id, &TransactionDelivery::new(&txn_id, &txn)).await
    }
    .await;

    finish(KIND_TRANSACTION, &txn_id, result)
}

/// `PUT /_matrix/app/unstable/fi.mau.syncproxy/error/{txnID}`.
pub async fn put_syncproxy_error(
    State(state): State<AppState>,
    Path(txn_id): Path<String>,
    headers: HeaderMap,
    uri: Uri,
    body: Body,
) -> Result<Json<Value>, IngressError> {
    let result = async {
        let (endpoint, report) =
            read_push::<SyncProxyErrorReport>(&state, &headers, &uri, body).await?;

        tracing::info!(
            endpoint = %endpoint.id(),
            txn_id = %txn_id,
            errcode = %report.errcode,
            "Sending sync proxy error"
        );
        let notification = Notification {
            command: KIND_SYNCPROXY_ERROR,
            data: SyncProxyErrorForward {
                report: &report,
                txn_id: &txn_id,
            },
        };
        forward(&endpoint, &txn_id, &notification).await
    }
    .await;

    finish(KIND_SYNCPROXY_ERROR, &txn_id, result)
}

/// Authenticate, then read and decode the body.
async fn read_push<T: DeserializeOwned>(
    state: &AppState,
    headers: &HeaderMap,
    uri: &Uri,
    body: Body,
) -> Result<(Arc<Endpoint>, T), IngressError> {
    let endpoint = authenticate_inbound(&state.registry, headers, uri)?;

    let bytes = axum::body::to_bytes(body, state.http.max_body_bytes)
        .await
        .map_err(|e| IngressError::BadPayload(e.to_string()))?;
    let payload =
        serde_json::from_slice(&bytes).map_err(|e| IngressError::BadPayload(e.to_string()))?;
    Ok((endpoint, payload))
}

async fn forward<T: Serialize + ?Sized>(
    endpoint: &Endpoint,
    txn_id: &str,
    payload: &T,
) -> Result<(), IngressError> {
    match endpoint.deliver(payload).await {
        Ok(()) => {
            tracing::debug!(endpoint = %endpoint.id(), txn_id = %txn_id, "Sent to websocket");
            Ok(())
        }
        Err(e) => {
            tracing::warn!(
                endpoint = %endpoint.id(),
                txn_id = %txn_id,
                error = %e,
                "Rejecting push"
            );
            Err(e.into())
        }
    }
}

fn finish(
    kind: &'static str,
    txn_id: &str,
    result: Result<(), IngressError>,
) -> Result<Json<Value>, IngressError> {
    match result {
        Ok(()) => {
            metrics::record_transaction(kind, "ok");
            Ok(Json(json!({})))
        }
        Err(e) => {
            if let IngressError::Auth(_) | IngressError::BadPayload(_) = &e {
                tracing::warn!(kind, txn_id = %txn_id, error = ?e, "Rejected push");
            }
            metrics::record_transaction(kind, e.kind());
            Err(e)
        }
    }
}
