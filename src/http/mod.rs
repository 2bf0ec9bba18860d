//! HTTP surface of the gateway.
//!
//! # Data Flow
//! ```text
//! homeserver / sync proxy PUT
//!     → server.rs (request ID, trace span, timeout)
//!     → auth.rs (inbound token)
//!     → transactions.rs (decode, normalize, deliver)
//!     → error.rs ({errcode, error} on failure, {} on success)
//!
//! bridge GET (upgrade)
//!     → auth.rs (outbound token)
//!     → websocket.rs (bind, read loop, dispatch, unbind)
//! ```

pub mod auth;
pub mod error;
pub mod request;
pub mod server;
pub mod transactions;
pub mod websocket;

pub use error::{AuthError, IngressError};
pub use request::X_REQUEST_ID;
pub use server::{build_router, serve, AppState};
