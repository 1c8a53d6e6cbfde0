//! Per-participant cancellation.
//!
//! Each participant task receives a [`CancelSignal`]; the roster keeps the
//! matching [`CancelHandle`]. Cancelling is out-of-band: the signal is
//! observed at whatever suspension point the task is parked on, whether that
//! is a full/empty pool or the pause between batches.
//!
//! Dropping the handle without calling [`CancelHandle::cancel`] also counts as
//! cancellation, so a task can never outlive its roster entry.

use tokio::sync::watch;

/// Create a linked handle/signal pair.
#[must_use]
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle(tx), CancelSignal(rx))
}

/// Owner side: requests cancellation.
#[derive(Debug)]
pub struct CancelHandle(watch::Sender<bool>);

impl CancelHandle {
    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }

    /// Whether [`cancel`](Self::cancel) has been called
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}

/// Task side: observes cancellation.
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    /// Whether cancellation was requested or the handle was dropped
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow() || self.0.has_changed().is_err()
    }

    /// Completes once cancellation is requested or the handle is dropped.
    ///
    /// Cancel-safe: can be used as a `tokio::select!` branch repeatedly.
    pub async fn cancelled(&mut self) {
        // Err means the handle was dropped, which is treated the same way.
        let _ = self.0.wait_for(|cancelled| *cancelled).await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_waiter() {
        let (handle, mut signal) = cancel_pair();
        assert!(!signal.is_cancelled());

        let waiter = tokio::spawn(async move {
            signal.cancelled().await;
            signal.is_cancelled()
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.cancel();

        let observed = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(observed);
        assert!(handle.is_cancelled());
    }

    #[tokio::test]
    async fn dropped_handle_counts_as_cancelled() {
        let (handle, mut signal) = cancel_pair();
        drop(handle);

        assert!(signal.is_cancelled());
        tokio::time::timeout(Duration::from_secs(1), signal.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let (handle, mut signal) = cancel_pair();
        handle.cancel();
        handle.cancel();
        signal.cancelled().await;
        signal.cancelled().await;
        assert!(signal.is_cancelled());
    }
}
