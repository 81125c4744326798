use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Inner {
    cancelled: RwLock<bool>,
    reason: RwLock<Option<String>>,
    notify: Notify,
}

/// Cancellation signal shared by every task of a test case
///
/// Clones observe the same state. The first reason wins.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<Inner>,
}

impl CancellationToken {
    /// Create a new cancellation token
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if cancelled
    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.read()
    }

    /// Cancel with reason. Returns false if the token was already cancelled.
    pub fn cancel(&self, reason: impl Into<String>) -> bool {
        let reason = reason.into();
        {
            let mut cancelled = self.inner.cancelled.write();
            if *cancelled {
                debug!("Token already cancelled, ignoring reason: {}", reason);
                return false;
            }
            *cancelled = true;
            *self.inner.reason.write() = Some(reason.clone());
        }
        self.inner.notify.notify_waiters();
        info!("Cancellation requested: {}", reason);
        true
    }

    /// Get cancellation reason
    pub fn reason(&self) -> Option<String> {
        self.inner.reason.read().clone()
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        loop {
            // Register before checking so a concurrent cancel is not missed.
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, timeout, Duration};

    #[test]
    fn test_cancellation_token_new() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
        assert!(token.reason().is_none());
    }

    #[test]
    fn test_cancellation_token_cancel() {
        let token = CancellationToken::new();

        assert!(token.cancel("assertion failed in sibling"));

        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("assertion failed in sibling"));
    }

    #[test]
    fn test_first_reason_is_preserved() {
        let token = CancellationToken::new();

        assert!(token.cancel("First reason"));
        assert!(!token.cancel("Second reason"));

        assert_eq!(token.reason().as_deref(), Some("First reason"));
    }

    #[test]
    fn test_cancellation_token_clone() {
        let token1 = CancellationToken::new();
        let token2 = token1.clone();

        token1.cancel("Cancelled via token1");

        assert!(token2.is_cancelled());
        assert_eq!(token1.reason(), token2.reason());
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel("done");

        timeout(Duration::from_millis(50), token.cancelled())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_wakes_waiters() {
        let token = CancellationToken::new();
        let mut handles = vec![];

        for _ in 0..5 {
            let waiter = token.clone();
            handles.push(tokio::spawn(async move { waiter.cancelled().await }));
        }

        sleep(Duration::from_millis(10)).await;
        token.cancel("suite aborted");

        for handle in handles {
            timeout(Duration::from_secs(1), handle)
                .await
                .unwrap()
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_concurrent_cancel_only_one_wins() {
        let token = CancellationToken::new();
        let mut handles = vec![];

        for i in 0..5 {
            let token = token.clone();
            handles.push(tokio::spawn(async move { token.cancel(format!("Reason {}", i)) }));
        }

        let wins = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(wins, 1);
        assert!(token.is_cancelled());
    }
}
