//! Caller cancellation
//!
//! A `Cancellation` flows from the top-level fetch call down to the
//! process-stop call. It is a thin wrapper over a `watch` channel so that
//! any number of waiters can observe the same signal.

use tokio::sync::watch;

/// Create a linked handle/token pair
pub fn cancellation() -> (CancelHandle, Cancellation) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, Cancellation { rx })
}

/// Owner side: fires the signal
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Signal cancellation to every linked token
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observer side, cheap to clone
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    /// A token that never fires
    pub fn never() -> Self {
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolve once cancellation is signalled
    ///
    /// Pends forever if the handle is dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let fired = rx.wait_for(|cancelled| *cancelled).await.map(|_| ());
        if fired.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn cancel_wakes_waiters() {
        let (handle, token) = cancellation();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };

        assert!(!token.is_cancelled());
        handle.cancel();
        waiter.await.unwrap();
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn already_cancelled_resolves_immediately() {
        let (handle, token) = cancellation();
        handle.cancel();
        tokio::time::timeout(Duration::from_secs(1), token.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn never_does_not_fire() {
        let token = Cancellation::never();
        let fired = tokio::time::timeout(Duration::from_secs(60), token.cancelled()).await;
        assert!(fired.is_err());
        assert!(!token.is_cancelled());
    }
}
