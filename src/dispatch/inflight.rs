//! In-flight dispatch tracking
//!
//! Counts dispatches (and spawned detached emits) that have not settled yet.
//! Shutdown and quiescence waits observe the count through a watch channel.

use std::sync::Arc;
use tokio::sync::watch;

/// Shared in-flight counter
#[derive(Clone)]
pub struct InFlightTracker {
    count: Arc<watch::Sender<usize>>,
}

impl InFlightTracker {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { count: Arc::new(tx) }
    }

    /// Register one unit of work; it ends when the guard drops
    pub fn begin(&self) -> InFlightGuard {
        self.count.send_modify(|count| *count += 1);
        InFlightGuard { count: Arc::clone(&self.count) }
    }

    pub fn current(&self) -> usize {
        *self.count.borrow()
    }

    /// Resolve once nothing is in flight
    pub async fn wait_idle(&self) {
        let mut rx = self.count.subscribe();
        // The sender lives in `self`, so the channel cannot close while waiting
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for InFlightTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the tracker on drop, including on panic or cancellation
pub struct InFlightGuard {
    count: Arc<watch::Sender<usize>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.count.send_modify(|count| *count = count.saturating_sub(1));
    }
}
