//! Cancellation tokens
//!
//! A watch-channel pair: the session machine holds the [`CancelSource`] and
//! signals it on hangup or fatal signaling errors; the turn executor clones
//! [`CancelToken`]s and observes them between steps.

use tokio::sync::watch;

/// Signals cancellation to every token cloned from it
#[derive(Debug)]
pub struct CancelSource {
    tx: watch::Sender<bool>,
}

/// Observer half; cheap to clone
#[derive(Debug, Clone)]
pub struct CancelToken {
    rx: watch::Receiver<bool>,
}

impl CancelSource {
    /// Create a source and its first token
    pub fn new() -> (Self, CancelToken) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, CancelToken { rx })
    }

    /// Fire the token. Idempotent.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }

    /// Get another observer
    pub fn token(&self) -> CancelToken {
        CancelToken {
            rx: self.tx.subscribe(),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

impl CancelToken {
    /// Non-blocking check
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Wait until cancelled. A dropped source counts as cancelled.
    pub async fn cancelled(&mut self) {
        let _ = self.rx.wait_for(|fired| *fired).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_fires_tokens() {
        let (source, token) = CancelSource::new();
        let second = source.token();
        assert!(!token.is_cancelled());
        assert!(!second.is_cancelled());

        source.cancel();
        assert!(token.is_cancelled());
        assert!(second.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiter() {
        let (source, mut token) = CancelSource::new();
        let waiter = tokio::spawn(async move {
            token.cancelled().await;
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        source.cancel();
        tokio::time::timeout(Duration::from_millis(100), waiter)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn test_dropped_source_counts_as_cancelled() {
        let (source, mut token) = CancelSource::new();
        drop(source);
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("dropped source should resolve waiters");
    }
}
