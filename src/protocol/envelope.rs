//! Websocket wire messages.
//!
//! Two logical protocols share one socket and are told apart by shape:
//! unsolicited pushes carry `status`/`txn_id` (deliveries) or a bare
//! `command` (notifications), while correlated replies carry `request_id`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::protocol::error::CommandError;
use crate::protocol::transaction::Transaction;

/// A command sent by the bridge.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CommandEnvelope {
    pub command: String,

    /// Correlation ID; 0 means no response is wanted.
    #[serde(default, alias = "id")]
    pub request_id: i64,

    #[serde(default)]
    pub data: Value,
}

impl CommandEnvelope {
    /// Whether the bridge expects a response envelope.
    pub fn expects_response(&self) -> bool {
        self.request_id != 0
    }
}

/// Kind of a response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Response,
    Error,
}

/// Reply to a [`CommandEnvelope`] with a nonzero request ID.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResponseEnvelope {
    pub request_id: i64,
    pub command: ResponseKind,
    pub data: Value,
}

impl ResponseEnvelope {
    /// Build the reply for a finished command.
    pub fn from_outcome(request_id: i64, outcome: &Result<Value, CommandError>) -> Self {
        match outcome {
            Ok(data) => Self {
                request_id,
                command: ResponseKind::Response,
                data: data.clone(),
            },
            Err(e) => Self {
                request_id,
                command: ResponseKind::Error,
                data: e.to_response_data(),
            },
        }
    }
}

/// A transaction pushed to the bridge.
#[derive(Debug, Serialize)]
pub struct TransactionDelivery<'a> {
    pub status: &'static str,
    pub txn_id: &'a str,
    #[serde(flatten)]
    pub transaction: &'a Transaction,
}

impl<'a> TransactionDelivery<'a> {
    pub fn new(txn_id: &'a str, transaction: &'a Transaction) -> Self {
        Self {
            status: "ok",
            txn_id,
            transaction,
        }
    }
}

/// A server-initiated command that expects no reply.
#[derive(Debug, Serialize)]
pub struct Notification<T> {
    pub command: &'static str,
    pub data: T,
}

/// Status message written right after a websocket is accepted.
#[derive(Debug, Serialize)]
pub struct ConnectedStatus {
    pub status: &'static str,
}

impl Default for ConnectedStatus {
    fn default() -> Self {
        Self { status: "connected" }
    }
}
