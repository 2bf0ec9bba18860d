//! In-process mock sync proxy for unit tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::put,
    Router,
};

use crate::config::SyncProxyConfig;
use crate::syncproxy::SyncProxyClient;

/// One request seen by the mock.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: String,
    pub appservice_id: String,
    pub auth: Option<String>,
    pub body: Bytes,
}

#[derive(Clone)]
struct MockState {
    log: Arc<Mutex<Vec<Recorded>>>,
    status: StatusCode,
    body: &'static str,
    delay: Duration,
}

/// A running mock sync proxy.
pub struct MockSyncProxy {
    pub url: String,
    log: Arc<Mutex<Vec<Recorded>>>,
}

impl MockSyncProxy {
    /// Answer every request with `status` and `body` after `delay`.
    pub async fn spawn(status: u16, body: &'static str, delay: Duration) -> Self {
        let log = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            log: log.clone(),
            status: StatusCode::from_u16(status).unwrap(),
            body,
            delay,
        };
        let app = Router::new()
            .route(
                "/_matrix/client/unstable/fi.mau.syncproxy/{id}",
                put(record).delete(record),
            )
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            url: format!("http://{}", addr),
            log,
        }
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<Recorded> {
        self.log.lock().unwrap().clone()
    }

    /// A client pointed at this mock.
    pub fn client(&self, shared_secret: &str) -> SyncProxyClient {
        SyncProxyClient::new(SyncProxyConfig {
            url: self.url.clone(),
            wsproxy_url: "http://wsproxy:29331".into(),
            shared_secret: shared_secret.into(),
        })
        .unwrap()
    }
}

async fn record(
    State(state): State<MockState>,
    method: Method,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    state.log.lock().unwrap().push(Recorded {
        method: method.to_string(),
        appservice_id: id,
        auth: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });
    tokio::time::sleep(state.delay).await;
    (state.status, state.body).into_response()
}
