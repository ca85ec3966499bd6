//! Availability handshake: tells the host that embedded content has found
//! its RTE adapter.
//!
//! Content discovers the adapter by calling it, so the first call of any
//! kind on an installed adapter marks the frame ready. A reload resets the
//! signal for the new session.

use std::sync::Arc;

use rte_core::events::{LifecycleEvent, LifecycleObserver};
use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct Readiness {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for Readiness {
    fn default() -> Self {
        Self::new()
    }
}

impl Readiness {
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn mark_ready(&self) {
        self.tx.send_if_modified(|ready| {
            if *ready {
                false
            } else {
                log::debug!("content discovered its adapter");
                *ready = true;
                true
            }
        });
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        *self.tx.borrow()
    }

    /// Back to "not discovered", e.g. when the frame reloads.
    pub fn reset(&self) {
        self.tx.send_replace(false);
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Resolve once the content has called into the adapter.
    ///
    /// There is no built-in timeout; wrap in `tokio::time::timeout` to bound
    /// the wait.
    pub async fn wait_ready(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|ready| *ready).await;
    }
}

impl LifecycleObserver for Readiness {
    fn on_lifecycle(&self, event: &LifecycleEvent) {
        if matches!(event, LifecycleEvent::Invoked { .. }) {
            self.mark_ready();
        }
    }
}
