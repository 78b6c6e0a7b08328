//! Cooperative cancellation for in-flight extractions.
//!
//! A [`CancellationSignal`] is cheap to clone; every clone observes the same
//! flag. The orchestrator races each pipeline phase against
//! [`CancellationSignal::cancelled`], so a raised signal aborts the remote call
//! at its next suspension point while temp-file cleanup still runs.

use std::sync::Arc;
use tokio::sync::watch;

/// Shared, clonable cancellation flag.
#[derive(Debug, Clone)]
pub struct CancellationSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancellationSignal {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationSignal {
    /// Create a signal that has not been raised.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Raise the signal. Idempotent.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has been raised.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the signal is raised; resolves immediately if it already was.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives as long as `self`, so `wait_for` can only fail
        // after the signal is gone; park forever in that case.
        if rx.wait_for(|raised| *raised).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn starts_lowered() {
        assert!(!CancellationSignal::new().is_cancelled());
    }

    #[tokio::test]
    async fn clones_share_the_flag() {
        let signal = CancellationSignal::new();
        let other = signal.clone();
        other.cancel();
        assert!(signal.is_cancelled());
        // Already raised: must not block.
        tokio::time::timeout(Duration::from_millis(100), signal.cancelled())
            .await
            .expect("cancelled() should resolve immediately");
    }

    #[tokio::test]
    async fn cancelled_wakes_waiter() {
        let signal = CancellationSignal::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });
        tokio::time::timeout(Duration::from_secs(2), signal.cancelled())
            .await
            .expect("waiter should wake after cancel()");
    }
}
