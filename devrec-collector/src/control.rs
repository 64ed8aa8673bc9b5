//! Flow control shared by every pipeline component
//!
//! A `FlowControl` couples a cooperative `CancellationToken` with a
//! single-slot stop signal. The stop signal is raised from failure paths
//! (the error monitor) and observed by the pipeline supervisor, which then
//! cancels the token. Keeping the two apart lets the supervisor tell
//! "stopped by request" from "stopped due to too many errors".

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{CollectorError, CollectorResult};
use crate::monitor::ErrorCategory;

/// Cancellation token plus the "too many errors" stop signal
#[derive(Clone)]
pub struct FlowControl {
    token: CancellationToken,
    stop_tx: mpsc::Sender<()>,
    tripped: Arc<AtomicBool>,
}

/// Receiving half of the stop signal, owned by the supervisor
pub struct StopReceiver {
    rx: mpsc::Receiver<()>,
}

impl StopReceiver {
    /// Wait until the stop signal is delivered
    ///
    /// Returns `false` if every `FlowControl` clone was dropped first.
    pub async fn recv(&mut self) -> bool {
        self.rx.recv().await.is_some()
    }
}

impl FlowControl {
    pub fn new() -> (Self, StopReceiver) {
        let (stop_tx, rx) = mpsc::channel(1);
        let control = Self {
            token: CancellationToken::new(),
            stop_tx,
            tripped: Arc::new(AtomicBool::new(false)),
        };
        (control, StopReceiver { rx })
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Fail with `Cancelled` if the context was cancelled
    pub fn check(&self, operation: &str) -> CollectorResult<()> {
        if self.token.is_cancelled() {
            debug!(operation, "Stopping: flow control cancelled");
            return Err(CollectorError::Cancelled);
        }
        Ok(())
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Future that completes once the context is cancelled
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    /// Deliver the stop signal; never blocks
    ///
    /// Only the first delivery is buffered; later ones are dropped.
    pub fn trip(&self) {
        self.tripped.store(true, Ordering::SeqCst);
        // Full means a signal is already pending
        let _ = self.stop_tx.try_send(());
    }

    /// Whether the error threshold stop signal was ever delivered
    pub fn is_tripped(&self) -> bool {
        self.tripped.load(Ordering::SeqCst)
    }

    /// Sleep for `duration` unless cancelled first
    pub async fn sleep(&self, duration: Duration) -> CollectorResult<()> {
        tokio::select! {
            _ = self.token.cancelled() => Err(CollectorError::Cancelled),
            _ = tokio::time::sleep(duration) => Ok(()),
        }
    }

    /// Run `fut` after a cancellation check, bounded by `limit`
    ///
    /// A call that times out is reported as `Timeout` in `category`.
    pub async fn bounded<F, T>(
        &self,
        operation: &str,
        limit: Duration,
        category: ErrorCategory,
        fut: F,
    ) -> CollectorResult<T>
    where
        F: Future<Output = CollectorResult<T>>,
    {
        self.check(operation)?;
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result,
            Err(_) => Err(CollectorError::Timeout {
                operation: operation.to_string(),
                category,
            }),
        }
    }
}
