//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode},
    routing::put,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use wsproxy::config::{AppServiceConfig, GatewayConfig, SyncProxyConfig};
use wsproxy::http::{serve, AppState};
use wsproxy::lifecycle::Shutdown;
use wsproxy::registry::Registry;
use wsproxy::syncproxy::SyncProxyClient;

pub const WA_AS: &str = "as-whatsapp";
pub const WA_HS: &str = "hs-whatsapp";
pub const SIG_AS: &str = "as-signal";
pub const SIG_HS: &str = "hs-signal";
pub const SHARED_SECRET: &str = "syncproxy-secret";
pub const WSPROXY_URL: &str = "http://wsproxy.test:29331";

pub type Bridge = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// One request received by the mock sync proxy.
#[derive(Debug, Clone)]
pub struct SyncProxyCall {
    pub method: String,
    pub appservice_id: String,
    pub auth: Option<String>,
    pub body: Bytes,
}

#[derive(Clone)]
struct MockState {
    calls: Arc<Mutex<Vec<SyncProxyCall>>>,
    status: StatusCode,
    body: &'static str,
}

/// Mock sync proxy answering every call with a fixed status and body.
pub struct MockSyncProxy {
    pub url: String,
    calls: Arc<Mutex<Vec<SyncProxyCall>>>,
}

impl MockSyncProxy {
    pub async fn start(status: u16, body: &'static str) -> Self {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let state = MockState {
            calls: calls.clone(),
            status: StatusCode::from_u16(status).unwrap(),
            body,
        };
        let app = Router::new()
            .route(
                "/_matrix/client/unstable/fi.mau.syncproxy/{id}",
                put(record).delete(record),
            )
            .with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        Self {
            url: format!("http://{}", addr),
            calls,
        }
    }

    pub fn calls(&self) -> Vec<SyncProxyCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_with(&self, method: &str) -> usize {
        self.calls().iter().filter(|c| c.method == method).count()
    }
}

async fn record(
    State(state): State<MockState>,
    method: Method,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, &'static str) {
    state.calls.lock().unwrap().push(SyncProxyCall {
        method: method.to_string(),
        appservice_id: id,
        auth: headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body,
    });
    (state.status, state.body)
}

/// A gateway running on an ephemeral port.
pub struct Gateway {
    pub addr: SocketAddr,
    pub registry: Arc<Registry>,
    pub shutdown: Shutdown,
    pub handle: JoinHandle<std::io::Result<()>>,
}

impl Gateway {
    /// Start a gateway with the `whatsapp` and `signal` appservices.
    pub async fn start(sync_proxy_url: &str) -> Self {
        let mut config = GatewayConfig::default();
        config.listen_address = "127.0.0.1:0".into();
        config.appservices = vec![
            AppServiceConfig {
                id: "whatsapp".into(),
                outbound_token: WA_AS.into(),
                inbound_token: WA_HS.into(),
            },
            AppServiceConfig {
                id: "signal".into(),
                outbound_token: SIG_AS.into(),
                inbound_token: SIG_HS.into(),
            },
        ];
        config.sync_proxy = SyncProxyConfig {
            url: sync_proxy_url.to_string(),
            wsproxy_url: WSPROXY_URL.into(),
            shared_secret: SHARED_SECRET.into(),
        };
        config.http.shutdown_timeout_secs = 1;
        config.http.close_timeout_secs = 1;

        let registry = Arc::new(Registry::from_config(&config.appservices).unwrap());
        let state = AppState {
            registry: registry.clone(),
            sync_proxy: Arc::new(SyncProxyClient::new(config.sync_proxy.clone()).unwrap()),
            http: config.http.clone(),
        };

        let listener = TcpListener::bind(&config.listen_address).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let handle = tokio::spawn(serve(listener, state, shutdown.subscribe()));

        Self {
            addr,
            registry,
            shutdown,
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Open the bridge websocket with `token`, without any handshake checks.
    pub async fn open_websocket(
        &self,
        token: &str,
    ) -> Result<Bridge, tokio_tungstenite::tungstenite::Error> {
        let mut request = format!("ws://{}/_matrix/client/unstable/fi.mau.as_sync", self.addr)
            .into_client_request()
            .unwrap();
        request
            .headers_mut()
            .insert("authorization", format!("Bearer {}", token).parse().unwrap());
        let (ws, _) = tokio_tungstenite::connect_async(request).await?;
        Ok(ws)
    }

    /// Open the bridge websocket and wait until it is bound.
    ///
    /// A ping round trip proves the read loop is running, which only
    /// happens after the socket was attached to its endpoint.
    pub async fn connect_bridge(&self, token: &str) -> Bridge {
        let mut ws = self.open_websocket(token).await.unwrap();
        assert_eq!(next_json(&mut ws).await, json!({"status": "connected"}));
        send_json(&mut ws, json!({"command": "ping", "request_id": 999})).await;
        let pong = next_json(&mut ws).await;
        assert_eq!(pong["request_id"], 999);
        ws
    }

    /// PUT a JSON body with a bearer token; returns the status and JSON body.
    pub async fn put(&self, path: &str, token: Option<&str>, body: &str) -> (u16, Value) {
        let mut req = reqwest::Client::new()
            .put(self.url(path))
            .header("content-type", "application/json")
            .body(body.to_string());
        if let Some(token) = token {
            req = req.bearer_auth(token);
        }
        let resp = req.send().await.unwrap();
        let status = resp.status().as_u16();
        let body = resp.json::<Value>().await.unwrap_or(Value::Null);
        (status, body)
    }
}

pub async fn send_json(ws: &mut Bridge, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

/// Next text frame as JSON, failing the test after 5 seconds.
pub async fn next_json(ws: &mut Bridge) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for websocket frame")
            .expect("websocket ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

/// Read until a close frame arrives; returns its code and reason.
pub async fn next_close(ws: &mut Bridge) -> (u16, String) {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for close frame")
            .expect("websocket ended without close frame")
            .expect("websocket error");
        if let Message::Close(Some(frame)) = msg {
            return (u16::from(frame.code), frame.reason.as_str().to_string());
        }
    }
}

/// Poll `condition` until it holds, failing the test after 5 seconds.
pub async fn wait_for<F: Fn() -> bool>(condition: F) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
