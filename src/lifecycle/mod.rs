//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → HTTP server stops accepting
//!             → every bound websocket gets close 1001
//!             → in-flight requests drain until the deadline
//! ```
//!
//! # Design Decisions
//! - Shutdown has a deadline: whatever is still running after it is dropped
//! - Sockets are unbound before they are closed, so no stop-sync call is
//!   made on shutdown; the bridge calls `start_sync` again after reconnecting

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_signal;
