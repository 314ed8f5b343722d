//! Ingestion runs started from `/refresh`, joined at shutdown.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinSet;
use tracing::error;

#[derive(Clone, Default)]
pub struct RefreshRuns {
    inner: Arc<Mutex<JoinSet<()>>>,
}

impl RefreshRuns {
    /// Spawns `run`, reaping runs that already finished.
    pub fn spawn<F>(&self, run: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let mut runs = self.lock();
        while let Some(finished) = runs.try_join_next() {
            if let Err(e) = finished {
                error!(error = %e, "refresh run panicked");
            }
        }
        runs.spawn(run);
    }

    /// Runs spawned and not yet reaped.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Waits for every outstanding run and returns how many were joined.
    pub async fn drain(&self) -> usize {
        let mut runs = std::mem::take(&mut *self.lock());
        let mut joined = 0;
        while let Some(finished) = runs.join_next().await {
            joined += 1;
            if let Err(e) = finished {
                error!(error = %e, "refresh run panicked");
            }
        }
        joined
    }

    fn lock(&self) -> MutexGuard<'_, JoinSet<()>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
