//! Sync proxy delegation subsystem.
//!
//! # Data Flow
//! ```text
//! websocket `start_sync` command
//!     → client.rs (PUT {sync_proxy.url}/_matrix/client/unstable/fi.mau.syncproxy/{id})
//!     → 2xx: Ok / otherwise DelegationError back to the bridge
//!
//! websocket detached
//!     → client.rs (DELETE same URL)
//!     → failure logged and dropped
//! ```

pub mod client;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use client::{SyncProxyClient, SYNC_PROXY_TIMEOUT};
pub use types::{DelegationError, DelegationResult, StartSyncRequest, SyncProxyStartBody};
