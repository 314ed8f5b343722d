//! Cooperative cancellation for ingestion runs.

use tokio::sync::watch;

use crate::error::{IngestError, Result};

/// Receiving side, cloned into every dataset task of a run.
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

/// Sending side, held by whoever may stop the run.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl Cancellation {
    pub fn new() -> (CancelHandle, Cancellation) {
        let (tx, rx) = watch::channel(false);
        (CancelHandle { tx }, Cancellation { rx })
    }

    /// A token that is never cancelled, for one-shot callers.
    pub fn never() -> Self {
        let (tx, rx) = watch::channel(false);
        // Keeps the last value once the sender is gone.
        drop(tx);
        Cancellation { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Fails with [`IngestError::Cancelled`] once cancellation was requested.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(IngestError::Cancelled);
        }
        Ok(())
    }

    /// Resolves when cancellation is requested. Never resolves for
    /// [`Cancellation::never`].
    pub async fn cancelled(&mut self) {
        if self.rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }
}
