//! Exclusive, replaceable websocket binding.
//!
//! # State Transitions
//! ```text
//! empty ──accept(new)──→ bound(new)
//! bound(old) ──accept(new)──→ bound(new)   (old handed back for closing)
//! bound(cur) ──detach(cur)──→ empty        (detach of a stale socket is a no-op)
//! any        ──seal()──────→ sealed         (bound socket handed back for closing)
//! sealed     ──accept(new)──→ sealed        (new handed back, never bound)
//! ```
//!
//! # Design Decisions
//! - Transitions run under one async mutex per slot; the mutex also guards
//!   the sealed flag, so an accept queued behind a detach cannot bind after
//!   shutdown emptied the slot
//! - The bound socket is published through `ArcSwapOption`, so readers
//!   take a lock-free snapshot and never observe two bound sockets
//! - Detach compares connection IDs, never just "is something bound"

use std::future::Future;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;

use crate::registry::connection::Connection;

/// The single websocket currently bound to an endpoint, if any.
#[derive(Default)]
pub struct ConnectionSlot {
    bound: ArcSwapOption<Connection>,
    /// `true` once the slot was sealed for shutdown.
    transition: Mutex<bool>,
}

/// Outcome of [`ConnectionSlot::accept`].
#[derive(Debug)]
pub enum Accepted {
    /// The connection is bound; `replaced` was bound before it.
    Bound { replaced: Option<Arc<Connection>> },
    /// The slot is sealed; the connection was not bound.
    Sealed(Arc<Connection>),
}

impl ConnectionSlot {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `conn`, handing back whatever the caller must close outside the
    /// transition lock.
    pub async fn accept(&self, conn: Arc<Connection>) -> Accepted {
        let sealed = self.transition.lock().await;
        if *sealed {
            return Accepted::Sealed(conn);
        }
        Accepted::Bound {
            replaced: self.bound.swap(Some(conn)),
        }
    }

    /// Unbind `conn` if it is still the bound connection.
    ///
    /// `on_detached` runs only when the slot actually transitioned to empty,
    /// and it runs before the transition lock is released, so no new
    /// connection can be bound until it completes. Returns whether the slot
    /// was emptied.
    pub async fn detach<F, Fut>(&self, conn: &Arc<Connection>, on_detached: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ()>,
    {
        let _guard = self.transition.lock().await;
        let is_current = self
            .bound
            .load_full()
            .is_some_and(|current| current.id() == conn.id());
        if !is_current {
            return false;
        }
        self.bound.store(None);
        on_detached().await;
        true
    }

    /// Snapshot of the bound connection. May be stale as soon as it returns.
    pub fn current(&self) -> Option<Arc<Connection>> {
        self.bound.load_full()
    }

    /// Empty the slot and refuse every later accept, returning what was
    /// bound. Waits for an in-progress transition to finish.
    pub async fn seal(&self) -> Option<Arc<Connection>> {
        let mut sealed = self.transition.lock().await;
        *sealed = true;
        self.bound.swap(None)
    }
}
