//! Shutdown coordination for the gateway.

use std::future::Future;
use std::time::Duration;

use tokio::sync::broadcast;

/// Coordinator for graceful shutdown.
///
/// Provides a broadcast channel that all long-running tasks can subscribe to.
#[derive(Debug, Clone)]
pub struct Shutdown {
    /// Broadcast channel sender.
    tx: broadcast::Sender<()>,
}

impl Shutdown {
    /// Create a new shutdown coordinator.
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(1);
        Self { tx }
    }

    /// Subscribe to the shutdown signal.
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Trigger the shutdown signal.
    pub fn trigger(&self) {
        let _ = self.tx.send(());
    }

    /// Get the number of active subscribers (tasks still running).
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve when `rx` fires or its sender is dropped.
pub async fn recv_shutdown(mut rx: broadcast::Receiver<()>) {
    let _ = rx.recv().await;
}

/// Drive `fut` to completion, giving up `deadline` after `triggered` resolves.
///
/// Returns `None` if the deadline cut the future short.
pub async fn drain_with_deadline<F, T>(fut: F, triggered: T, deadline: Duration) -> Option<F::Output>
where
    F: Future,
    T: Future,
{
    tokio::pin!(fut);
    tokio::select! {
        out = &mut fut => return Some(out),
        _ = triggered => {}
    }
    match tokio::time::timeout(deadline, fut).await {
        Ok(out) => Some(out),
        Err(_) => {
            tracing::warn!(
                deadline_secs = deadline.as_secs(),
                "Shutdown deadline reached, dropping remaining work"
            );
            None
        }
    }
}
