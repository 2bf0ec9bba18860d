//! Command failures reported back over the websocket.

use serde_json::{json, Value};
use thiserror::Error;

use crate::syncproxy::DelegationError;

/// Why a single command failed. Never terminates the read loop.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("unknown command {0}")]
    UnknownCommand(String),

    #[error("failed to parse request JSON: {0}")]
    InvalidData(String),

    #[error(transparent)]
    Delegation(#[from] DelegationError),

    /// The handler panicked.
    #[error("internal server error")]
    Internal,
}

impl CommandError {
    /// Body of the `error` response envelope.
    pub fn to_response_data(&self) -> Value {
        let mut data = json!({ "message": self.to_string() });
        if let CommandError::Delegation(e) = self {
            if let Some(errcode) = e.errcode() {
                data["errcode"] = Value::String(errcode.to_string());
            }
        }
        data
    }

    /// Short label for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandError::UnknownCommand(_) => "unknown_command",
            CommandError::InvalidData(_) => "invalid_data",
            CommandError::Delegation(_) => "delegation_error",
            CommandError::Internal => "internal_error",
        }
    }
}
