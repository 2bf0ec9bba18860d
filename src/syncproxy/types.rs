//! Sync proxy request bodies and error definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Payload of a `start_sync` command sent by the bridge.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StartSyncRequest {
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub user_id: String,
    #[serde(default)]
    pub device_id: String,
}

/// Body of `PUT /_matrix/client/unstable/fi.mau.syncproxy/{appservice_id}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SyncProxyStartBody {
    pub appservice_id: String,
    pub user_id: String,
    pub bot_access_token: String,
    pub device_id: String,
    pub hs_token: String,
    /// Where the sync proxy should push transactions back to.
    pub address: String,
    pub is_proxy: bool,
}

/// Matrix-style error body returned by the sync proxy.
#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct RemoteErrorBody {
    #[serde(default)]
    pub errcode: String,
    #[serde(default)]
    pub error: String,
}

/// Errors that can occur while delegating to the sync proxy.
#[derive(Debug, Error)]
pub enum DelegationError {
    /// The sync proxy answered with a non-2xx status and a JSON error body.
    #[error("{errcode}: {error}")]
    RemoteRejected {
        status: u16,
        errcode: String,
        error: String,
    },

    /// Network failure, timeout, or an unreadable error response.
    #[error("{0}")]
    Transport(String),

    /// Delegation cannot work with the current configuration.
    #[error("{0}")]
    Misconfigured(String),
}

impl DelegationError {
    /// The remote Matrix error code, when the sync proxy supplied one.
    pub fn errcode(&self) -> Option<&str> {
        match self {
            DelegationError::RemoteRejected { errcode, .. } => Some(errcode),
            _ => None,
        }
    }
}

/// Result type for sync proxy operations.
pub type DelegationResult<T> = Result<T, DelegationError>;
