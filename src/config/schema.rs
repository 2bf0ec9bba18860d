//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the gateway.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the websocket gateway.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct GatewayConfig {
    /// Bind address for the HTTP listener (e.g., "0.0.0.0:29331").
    pub listen_address: String,

    /// Registered appservices, one websocket slot each.
    pub appservices: Vec<AppServiceConfig>,

    /// Sync proxy delegation settings.
    pub sync_proxy: SyncProxyConfig,

    /// HTTP server limits and deadlines.
    pub http: HttpConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// A single appservice (bridge) allowed to connect.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct AppServiceConfig {
    /// Stable appservice identifier.
    #[serde(default)]
    pub id: String,

    /// Token the bridge presents when opening the websocket.
    #[serde(default, rename = "as", alias = "as_token")]
    pub outbound_token: String,

    /// Token the homeserver presents when pushing transactions.
    #[serde(default, rename = "hs", alias = "hs_token")]
    pub inbound_token: String,
}

/// Sync proxy (mautrix-syncproxy) settings.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SyncProxyConfig {
    /// Base URL of the sync proxy.
    pub url: String,

    /// Address of this gateway as reachable from the sync proxy.
    pub wsproxy_url: String,

    /// Shared secret sent as a bearer token to the sync proxy.
    pub shared_secret: String,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request deadline in seconds.
    pub request_timeout_secs: u64,

    /// Maximum accepted transaction body size in bytes.
    pub max_body_bytes: usize,

    /// Time given to in-flight requests after a shutdown signal.
    pub shutdown_timeout_secs: u64,

    /// Deadline for writing a close frame to a websocket.
    pub close_timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 60,
            max_body_bytes: 64 * 1024 * 1024, // 64MB
            shutdown_timeout_secs: 5,
            close_timeout_secs: 3,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
