//! Matrix appservice websocket gateway library.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod protocol;
pub mod registry;
pub mod syncproxy;

pub use config::GatewayConfig;
pub use http::{serve, AppState};
pub use lifecycle::Shutdown;
pub use registry::Registry;
pub use syncproxy::SyncProxyClient;
