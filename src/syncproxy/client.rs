//! HTTP client for the sync proxy.
//!
//! # Responsibilities
//! - Build the per-appservice sync proxy URL
//! - Authenticate with the shared secret
//! - Translate non-2xx responses into [`DelegationError`]
//!
//! # Design Decisions
//! - Every call is bounded by a fixed client timeout, independent of the
//!   HTTP deadline of whatever triggered it
//! - No retries: start failures go back to the bridge, stop failures are
//!   logged by the caller

use std::time::{Duration, Instant};

use reqwest::{Method, Response};
use url::Url;

use crate::config::SyncProxyConfig;
use crate::observability::metrics;
use crate::registry::Endpoint;
use crate::syncproxy::types::{
    DelegationError, DelegationResult, RemoteErrorBody, StartSyncRequest, SyncProxyStartBody,
};

/// Fixed timeout for every sync proxy request.
pub const SYNC_PROXY_TIMEOUT: Duration = Duration::from_secs(120);

/// Sync proxy responses should be fairly small, so limit error bodies to 1 MiB.
const MAX_ERROR_BODY: usize = 1024 * 1024;

const SYNC_PROXY_PATH: &str = "/_matrix/client/unstable/fi.mau.syncproxy";

/// Client that asks the sync proxy to start or stop syncing for an appservice.
#[derive(Debug, Clone)]
pub struct SyncProxyClient {
    http: reqwest::Client,
    config: SyncProxyConfig,
}

impl SyncProxyClient {
    /// Create a client with the fixed [`SYNC_PROXY_TIMEOUT`].
    pub fn new(config: SyncProxyConfig) -> DelegationResult<Self> {
        Self::with_timeout(config, SYNC_PROXY_TIMEOUT)
    }

    /// Create a client with a custom request timeout.
    pub fn with_timeout(config: SyncProxyConfig, timeout: Duration) -> DelegationResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DelegationError::Misconfigured(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { http, config })
    }

    /// Ask the sync proxy to start syncing on behalf of `endpoint`.
    pub async fn start(&self, endpoint: &Endpoint, req: &StartSyncRequest) -> DelegationResult<()> {
        tracing::info!(
            endpoint = %endpoint.id(),
            user_id = %req.user_id,
            device_id = %req.device_id,
            "Starting sync proxy"
        );
        let body = SyncProxyStartBody {
            appservice_id: endpoint.id().to_string(),
            user_id: req.user_id.clone(),
            bot_access_token: req.access_token.clone(),
            device_id: req.device_id.clone(),
            hs_token: endpoint.inbound_token().to_string(),
            address: self.config.wsproxy_url.clone(),
            is_proxy: true,
        };
        self.request(Method::PUT, endpoint.id(), Some(&body)).await
    }

    /// Ask the sync proxy to stop syncing for `endpoint`.
    pub async fn stop(&self, endpoint: &Endpoint) -> DelegationResult<()> {
        tracing::info!(endpoint = %endpoint.id(), "Stopping sync proxy");
        self.request(Method::DELETE, endpoint.id(), None).await
    }

    /// URL of the sync proxy resource for `appservice_id`.
    pub fn endpoint_url(&self, appservice_id: &str) -> DelegationResult<Url> {
        let mut url = Url::parse(&self.config.url).map_err(|e| {
            DelegationError::Misconfigured(format!("failed to parse sync proxy URL: {}", e))
        })?;
        url.set_path(&format!("{}/{}", SYNC_PROXY_PATH, appservice_id));
        Ok(url)
    }

    async fn request(
        &self,
        method: Method,
        appservice_id: &str,
        body: Option<&SyncProxyStartBody>,
    ) -> DelegationResult<()> {
        if self.config.shared_secret.is_empty() {
            return Err(DelegationError::Misconfigured(
                "sync proxy shared secret not configured".to_string(),
            ));
        }
        let url = self.endpoint_url(appservice_id)?;

        let mut builder = self
            .http
            .request(method.clone(), url)
            .bearer_auth(&self.config.shared_secret);
        if let Some(body) = body {
            builder = builder.json(body);
        }

        let start_time = Instant::now();
        let result = match builder.send().await {
            Ok(resp) => Self::check_response(resp).await,
            Err(e) => Err(DelegationError::Transport(format!(
                "failed to make sync proxy {} request: {}",
                method, e
            ))),
        };

        let outcome = match &result {
            Ok(()) => "ok",
            Err(DelegationError::RemoteRejected { .. }) => "rejected",
            Err(_) => "transport_error",
        };
        metrics::record_delegation(method.as_str(), outcome, start_time);
        result
    }

    async fn check_response(resp: Response) -> DelegationResult<()> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }

        let body = read_limited(resp, MAX_ERROR_BODY).await.map_err(|_| {
            DelegationError::Transport(format!("sync proxy returned HTTP {} and no body", status.as_u16()))
        })?;
        match serde_json::from_slice::<RemoteErrorBody>(&body) {
            Ok(remote) => Err(DelegationError::RemoteRejected {
                status: status.as_u16(),
                errcode: remote.errcode,
                error: remote.error,
            }),
            Err(e) => Err(DelegationError::Transport(format!(
                "sync proxy returned HTTP {} and non-JSON body ({}): {}",
                status.as_u16(),
                e,
                String::from_utf8_lossy(&body)
            ))),
        }
    }
}

/// Read at most `limit` bytes of a response body.
async fn read_limited(mut resp: Response, limit: usize) -> Result<Vec<u8>, reqwest::Error> {
    let mut buf = Vec::new();
    while let Some(chunk) = resp.chunk().await? {
        let remaining = limit - buf.len();
        buf.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
        if buf.len() >= limit {
            break;
        }
    }
    Ok(buf)
}
