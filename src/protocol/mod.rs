//! Websocket wire protocol.
//!
//! # Data Flow
//! ```text
//! HTTP transaction body
//!     → transaction.rs (decode, fold legacy MSC aliases)
//!     → envelope.rs (TransactionDelivery {status:"ok", txn_id, ...})
//!     → Endpoint::deliver
//!
//! websocket text frame
//!     → envelope.rs (CommandEnvelope)
//!     → dispatch.rs (own task, panic boundary)
//!     → ping / start_sync / unknown
//!     → envelope.rs (ResponseEnvelope, only when request_id != 0)
//! ```

pub mod dispatch;
pub mod envelope;
pub mod error;
pub mod transaction;

pub use dispatch::{Dispatcher, PingData};
pub use envelope::{
    CommandEnvelope, ConnectedStatus, Notification, ResponseEnvelope, ResponseKind,
    TransactionDelivery,
};
pub use error::CommandError;
pub use transaction::{DeviceLists, SyncProxyErrorForward, SyncProxyErrorReport, Transaction};
