//! Command dispatch for one websocket.
//!
//! # Responsibilities
//! - Run each decoded command on its own task so slow commands never block reads
//! - Contain handler panics as [`CommandError::Internal`]
//! - Write exactly one response envelope when the bridge asked for one
//!
//! # Design Decisions
//! - Responses go through the same per-connection write lock as transaction
//!   deliveries, so frames never interleave
//! - Responses are written in completion order, not request order; the
//!   bridge correlates them by `request_id`

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures_util::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::observability::metrics;
use crate::protocol::envelope::{CommandEnvelope, ResponseEnvelope};
use crate::protocol::error::CommandError;
use crate::registry::{Connection, Endpoint};
use crate::syncproxy::{StartSyncRequest, SyncProxyClient};

const COMMAND_PING: &str = "ping";
const COMMAND_START_SYNC: &str = "start_sync";
/// Panics inside the handler; only understood by test builds.
#[cfg(test)]
pub(crate) const COMMAND_PANIC: &str = "panic";

/// Payload of a `ping` command and its response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PingData {
    #[serde(default)]
    pub timestamp: i64,
}

/// Executes bridge commands on behalf of one endpoint.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    endpoint: Arc<Endpoint>,
    sync_proxy: Arc<SyncProxyClient>,
}

impl Dispatcher {
    pub fn new(endpoint: Arc<Endpoint>, sync_proxy: Arc<SyncProxyClient>) -> Self {
        Self {
            endpoint,
            sync_proxy,
        }
    }

    /// Handle `cmd` on a new task, replying on `conn`.
    pub fn spawn(&self, conn: Arc<Connection>, cmd: CommandEnvelope) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move { dispatcher.handle(&conn, cmd).await })
    }

    /// Execute `cmd` and write its response, if one was requested.
    pub async fn handle(&self, conn: &Connection, cmd: CommandEnvelope) {
        let outcome = contain(&cmd, self.execute(&cmd)).await;

        let label = match &outcome {
            Ok(_) => "ok",
            Err(e) => e.kind(),
        };
        metrics::record_command(command_label(&cmd.command), label);

        if let Err(e) = &outcome {
            tracing::warn!(
                endpoint = %self.endpoint.id(),
                command = %cmd.command,
                request_id = cmd.request_id,
                error = %e,
                "Command failed"
            );
        }

        if !cmd.expects_response() {
            return;
        }

        let response = ResponseEnvelope::from_outcome(cmd.request_id, &outcome);
        tracing::debug!(
            endpoint = %self.endpoint.id(),
            request_id = cmd.request_id,
            kind = ?response.command,
            "Sending command response"
        );
        if let Err(e) = conn.send_json(&response).await {
            tracing::warn!(
                endpoint = %self.endpoint.id(),
                connection_id = %conn.id(),
                request_id = cmd.request_id,
                error = %e,
                "Failed to send command response"
            );
        }
    }

    async fn execute(&self, cmd: &CommandEnvelope) -> Result<Value, CommandError> {
        match cmd.command.as_str() {
            COMMAND_PING => Ok(self.ping(&cmd.data)),
            COMMAND_START_SYNC => {
                let req: StartSyncRequest = serde_json::from_value(cmd.data.clone())
                    .map_err(|e| CommandError::InvalidData(e.to_string()))?;
                self.sync_proxy.start(&self.endpoint, &req).await?;
                Ok(Value::Null)
            }
            #[cfg(test)]
            COMMAND_PANIC => panic!("command handler panicked"),
            other => {
                tracing::warn!(
                    endpoint = %self.endpoint.id(),
                    command = %other,
                    request_id = cmd.request_id,
                    data = %cmd.data,
                    "Unknown command from websocket"
                );
                Err(CommandError::UnknownCommand(other.to_string()))
            }
        }
    }

    fn ping(&self, data: &Value) -> Value {
        let now = now_millis();
        match serde_json::from_value::<PingData>(data.clone()) {
            Ok(PingData { timestamp }) if timestamp > 0 => {
                let latency = Duration::from_millis(now.saturating_sub(timestamp).max(0) as u64);
                tracing::info!(
                    endpoint = %self.endpoint.id(),
                    latency_ms = latency.as_millis() as u64,
                    "Received ping"
                );
            }
            _ => {
                tracing::info!(endpoint = %self.endpoint.id(), "Received ping with no timestamp");
            }
        }
        serde_json::json!({ "timestamp": now })
    }
}

/// Run a command future, turning a panic into [`CommandError::Internal`].
pub async fn contain<F>(cmd: &CommandEnvelope, fut: F) -> Result<Value, CommandError>
where
    F: Future<Output = Result<Value, CommandError>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(
                command = %cmd.command,
                request_id = cmd.request_id,
                panic = %message,
                "Panic while handling command"
            );
            Err(CommandError::Internal)
        }
    }
}

/// Bounded metric label for a bridge-supplied command name.
fn command_label(command: &str) -> &'static str {
    match command {
        COMMAND_PING => COMMAND_PING,
        COMMAND_START_SYNC => COMMAND_START_SYNC,
        _ => "unknown",
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::connection::testing::{channel_connection, next_json};
    use crate::syncproxy::testing::MockSyncProxy;
    use serde_json::json;

    fn command(name: &str, request_id: i64, data: Value) -> CommandEnvelope {
        CommandEnvelope {
            command: name.to_string(),
            request_id,
            data,
        }
    }

    fn dispatcher_for(mock: &MockSyncProxy) -> Dispatcher {
        Dispatcher::new(
            Arc::new(Endpoint::new("whatsapp", "hs-token", "as-token")),
            Arc::new(mock.client("secret")),
        )
    }

    #[tokio::test]
    async fn ping_returns_current_timestamp() {
        let mock = MockSyncProxy::spawn(200, "{}", Duration::ZERO).await;
        let dispatcher = dispatcher_for(&mock);
        let (conn, mut rx) = channel_connection();

        let before = now_millis();
        dispatcher
            .handle(&conn, command("ping", 5, json!({"timestamp": 1_700_000_000_000i64})))
            .await;

        let resp = next_json(&mut rx).unwrap();
        assert_eq!(resp["request_id"], 5);
        assert_eq!(resp["command"], "response");
        assert!(resp["data"]["timestamp"].as_i64().unwrap() >= before);
    }

    #[tokio::test]
    async fn ping_tolerates_bad_timestamp() {
        let mock = MockSyncProxy::spawn(200, "{}", Duration::ZERO).await;
        let dispatcher = dispatcher_for(&mock);
        let (conn, mut rx) = channel_connection();

        dispatcher
            .handle(&conn, command("ping", 1, json!({"timestamp": "yesterday"})))
            .await;

        let resp = next_json(&mut rx).unwrap();
        assert_eq!(resp["command"], "response");
        assert!(resp["data"]["timestamp"].is_i64());
    }

    #[tokio::test]
    async fn zero_request_id_gets_no_response() {
        let mock = MockSyncProxy::spawn(200, "{}", Duration::ZERO).await;
        let dispatcher = dispatcher_for(&mock);
        let (conn, mut rx) = channel_connection();

        dispatcher.handle(&conn, command("ping", 0, Value::Null)).await;
        dispatcher.handle(&conn, command("bogus", 0, Value::Null)).await;

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn unknown_command_is_reported() {
        let mock = MockSyncProxy::spawn(200, "{}", Duration::ZERO).await;
        let dispatcher = dispatcher_for(&mock);
        let (conn, mut rx) = channel_connection();

        dispatcher.handle(&conn, command("bogus", 9, Value::Null)).await;

        let resp = next_json(&mut rx).unwrap();
        assert_eq!(
            resp,
            json!({"request_id": 9, "command": "error", "data": {"message": "unknown command bogus"}})
        );
    }

    #[tokio::test]
    async fn start_sync_delegates_to_sync_proxy() {
        let mock = MockSyncProxy::spawn(200, "{}", Duration::ZERO).await;
        let dispatcher = dispatcher_for(&mock);
        let (conn, mut rx) = channel_connection();

        dispatcher
            .handle(
                &conn,
                command(
                    "start_sync",
                    3,
                    json!({"access_token": "bot", "user_id": "@bot:x", "device_id": "DEV"}),
                ),
            )
            .await;

        let resp = next_json(&mut rx).unwrap();
        assert_eq!(resp, json!({"request_id": 3, "command": "response", "data": null}));
        let log = mock.requests();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].method, "PUT");
        assert_eq!(log[0].appservice_id, "whatsapp");
    }

    #[tokio::test]
    async fn start_sync_rejection_surfaces_remote_error() {
        let mock = MockSyncProxy::spawn(
            400,
            r#"{"errcode": "M_BAD_JSON", "error": "Missing device"}"#,
            Duration::ZERO,
        )
        .await;
        let dispatcher = dispatcher_for(&mock);
        let (conn, mut rx) = channel_connection();

        dispatcher
            .handle(&conn, command("start_sync", 4, json!({"user_id": "@bot:x"})))
            .await;

        let resp = next_json(&mut rx).unwrap();
        assert_eq!(resp["command"], "error");
        assert_eq!(resp["data"]["errcode"], "M_BAD_JSON");
        assert_eq!(resp["data"]["message"], "M_BAD_JSON: Missing device");
    }

    #[tokio::test]
    async fn start_sync_with_malformed_data_is_invalid() {
        let mock = MockSyncProxy::spawn(200, "{}", Duration::ZERO).await;
        let dispatcher = dispatcher_for(&mock);
        let (conn, mut rx) = channel_connection();

        dispatcher
            .handle(&conn, command("start_sync", 2, json!({"user_id": 12})))
            .await;

        let resp = next_json(&mut rx).unwrap();
        assert_eq!(resp["command"], "error");
        assert!(resp["data"]["message"]
            .as_str()
            .unwrap()
            .starts_with("failed to parse request JSON"));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn slow_command_does_not_block_later_ones() {
        let mock = MockSyncProxy::spawn(200, "{}", Duration::from_millis(300)).await;
        let dispatcher = dispatcher_for(&mock);
        let (conn, mut rx) = channel_connection();

        let slow = dispatcher.spawn(conn.clone(), command("start_sync", 1, json!({})));
        let fast = dispatcher.spawn(conn.clone(), command("ping", 2, Value::Null));
        fast.await.unwrap();
        slow.await.unwrap();

        let first = next_json(&mut rx).unwrap();
        let second = next_json(&mut rx).unwrap();
        assert_eq!(first["request_id"], 2);
        assert_eq!(second["request_id"], 1);
    }

    #[tokio::test]
    async fn panic_is_contained() {
        let cmd = command("ping", 1, Value::Null);
        let outcome = contain(&cmd, async {
            if cmd.request_id > 0 {
                panic!("handler exploded");
            }
            Ok(Value::Null)
        })
        .await;
        assert!(matches!(outcome, Err(CommandError::Internal)));

        let response = ResponseEnvelope::from_outcome(1, &outcome);
        assert_eq!(
            serde_json::to_value(response).unwrap(),
            json!({"request_id": 1, "command": "error", "data": {"message": "internal server error"}})
        );
    }

    #[tokio::test]
    async fn panicking_command_still_gets_a_response() {
        let mock = MockSyncProxy::spawn(200, "{}", Duration::ZERO).await;
        let dispatcher = dispatcher_for(&mock);
        let (conn, mut rx) = channel_connection();

        dispatcher
            .spawn(conn.clone(), command(COMMAND_PANIC, 6, Value::Null))
            .await
            .unwrap();
        dispatcher
            .spawn(conn.clone(), command("ping", 7, Value::Null))
            .await
            .unwrap();

        assert_eq!(
            next_json(&mut rx).unwrap(),
            json!({"request_id": 6, "command": "error", "data": {"message": "internal server error"}})
        );
        assert_eq!(next_json(&mut rx).unwrap()["request_id"], 7);
    }

    #[test]
    fn unknown_commands_share_one_metric_label() {
        assert_eq!(command_label("ping"), "ping");
        assert_eq!(command_label("start_sync"), "start_sync");
        assert_eq!(command_label("anything else"), "unknown");
    }
}
