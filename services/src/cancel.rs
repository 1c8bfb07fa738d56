//! Cooperative cancellation tokens.
//!
//! Shutdown propagates a [`CancelToken`] down through the daemon and
//! orchestrator loops. Long-running loops check it between files and
//! batches; pending sleeps and channel waits race against
//! [`CancelToken::cancelled`].

use tokio::sync::watch;

/// Clonable cancellation token. All clones observe the same cancel signal.
#[derive(Debug, Clone)]
pub struct CancelToken {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl CancelToken {
    /// Creates a fresh, un-cancelled token.
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// Signals cancellation to every clone.
    pub fn cancel(&self) {
        // Send only fails when every receiver is gone, which is fine.
        let _ = self.tx.send(true);
    }

    /// Non-blocking check, used at safe points.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled. Suitable for `tokio::select!`
    /// against sleeps and channel operations.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        // Already cancelled: return immediately.
        if *rx.borrow_and_update() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
        // Sender dropped without cancelling: treat as cancelled to unwind.
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}
