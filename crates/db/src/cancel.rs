//! Caller-owned cancellation.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

use crate::error::RepositoryError;

/// A cancellation signal shared between a caller and the operation it runs.
///
/// Clones observe the same signal. Once cancelled it stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    sender: Arc<watch::Sender<bool>>,
    receiver: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Create a signal that has not fired.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = watch::channel(false);
        Self {
            sender: Arc::new(sender),
            receiver,
        }
    }

    /// A signal for callers that never cancel.
    #[must_use]
    pub fn never() -> Self {
        Self::new()
    }

    /// Fire the signal.
    pub fn cancel(&self) {
        self.sender.send_replace(true);
    }

    /// Whether the signal has fired.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Fail fast if the signal has fired.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Cancelled`] once cancelled.
    pub fn check(&self) -> Result<(), RepositoryError> {
        if self.is_cancelled() {
            Err(RepositoryError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves when the signal fires.
    pub async fn cancelled(&self) {
        let mut receiver = self.receiver.clone();
        if receiver.wait_for(|fired| *fired).await.is_err() {
            // The sender lives as long as `self`, so this cannot close early.
            std::future::pending::<()>().await;
        }
    }

    /// Run `operation` unless the signal fires first.
    ///
    /// The operation is dropped (not polled further) on cancellation.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::Cancelled`] if the signal fires before the
    /// operation completes, or the operation's own error.
    pub async fn guard<T, F>(&self, operation: F) -> Result<T, RepositoryError>
    where
        F: Future<Output = Result<T, RepositoryError>>,
    {
        self.check()?;
        tokio::select! {
            biased;
            () = self.cancelled() => Err(RepositoryError::Cancelled),
            result = operation => result,
        }
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn test_clones_share_state() {
        let signal = CancelSignal::new();
        let clone = signal.clone();
        assert!(clone.check().is_ok());
        signal.cancel();
        assert!(clone.is_cancelled());
        assert!(matches!(clone.check(), Err(RepositoryError::Cancelled)));
    }

    #[tokio::test]
    async fn test_guard_passes_result_through() {
        let signal = CancelSignal::never();
        let value = signal.guard(async { Ok::<_, RepositoryError>(7) }).await.unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn test_guard_aborts_pending_operation() {
        let signal = CancelSignal::new();
        let trigger = signal.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let result = signal
            .guard(async {
                std::future::pending::<()>().await;
                Ok::<_, RepositoryError>(())
            })
            .await;
        assert!(matches!(result, Err(RepositoryError::Cancelled)));
    }

    #[tokio::test]
    async fn test_guard_refuses_after_cancel() {
        let signal = CancelSignal::new();
        signal.cancel();
        let result = signal.guard(async { Ok::<_, RepositoryError>(()) }).await;
        assert!(result.unwrap_err().is_cancelled());
    }
}
