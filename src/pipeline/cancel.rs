//! Cancellation for one pipeline call: explicit cancel, deadline, or both.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Trigger side. Dropping it without calling `cancel` never cancels.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Observed by the pipeline. Cheap to clone.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
    deadline: Option<Instant>,
}

/// A connected handle/signal pair.
pub fn cancel_pair() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx, deadline: None })
}

impl CancelSignal {
    /// A signal that only a deadline (if added) can trip.
    pub fn never() -> Self {
        let (_, signal) = cancel_pair();
        signal
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
        self
    }

    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Resolves once cancelled or past the deadline.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        let explicit = async move {
            loop {
                if *rx.borrow_and_update() {
                    return;
                }
                if rx.changed().await.is_err() {
                    // Handle dropped: only the deadline remains.
                    std::future::pending::<()>().await;
                }
            }
        };

        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = explicit => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => explicit.await,
        }
    }
}
