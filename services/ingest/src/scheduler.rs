//! Periodic ingestion runs.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use crate::cancel::{CancelHandle, Cancellation};
use crate::service::Ingestor;

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Starts [`Ingestor::populate_everything`] immediately and then once per
/// interval. A tick never waits for the previous run to finish.
pub struct PeriodicIngest {
    ingestor: Arc<Ingestor>,
    period: Duration,
}

/// Owner of a running [`PeriodicIngest`].
pub struct SchedulerHandle {
    cancel: CancelHandle,
    task: tokio::task::JoinHandle<()>,
}

impl PeriodicIngest {
    pub fn new(ingestor: Arc<Ingestor>, period: Duration) -> Self {
        Self { ingestor, period }
    }

    pub fn spawn(self) -> SchedulerHandle {
        let (cancel, token) = Cancellation::new();
        let task = tokio::spawn(self.run(token));
        SchedulerHandle { cancel, task }
    }

    async fn run(self, mut token: Cancellation) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut runs = JoinSet::new();
        let mut run_id: u64 = 0;

        info!(period_secs = self.period.as_secs(), "periodic ingestion started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    run_id += 1;
                    let ingestor = self.ingestor.clone();
                    let cancel = token.clone();
                    runs.spawn(async move {
                        info!(run_id, "scheduled ingestion run");
                        match ingestor.populate_everything(&cancel).await {
                            Ok(summary) => info!(run_id, records = summary.total(), "scheduled run finished"),
                            Err(e) => error!(run_id, error = %e, "scheduled run failed"),
                        }
                    });
                }
                Some(joined) = runs.join_next() => {
                    if let Err(e) = joined {
                        error!(error = %e, "scheduled run panicked");
                    }
                }
                _ = token.cancelled() => break,
            }
        }

        info!(in_flight = runs.len(), "periodic ingestion stopping");
        while let Some(joined) = runs.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "scheduled run panicked");
            }
        }
        info!("periodic ingestion stopped");
    }
}

impl SchedulerHandle {
    /// Stops ticking, cancels in-flight runs at their next record and waits
    /// for them.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            error!(error = %e, "scheduler task failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    use chrono::NaiveDate;

    use crate::model::DatesFilter;
    use crate::reference::MunicipalityReference;
    use crate::source::{SourceLocation, SourceReader, Sources};
    use crate::store::{MemoryStore, Store};

    fn fixture(name: &str) -> SourceLocation {
        SourceLocation::Path(
            PathBuf::from(env!("CARGO_MANIFEST_DIR"))
                .join("tests/fixtures")
                .join(name),
        )
    }

    #[tokio::test]
    async fn test_first_run_starts_immediately_and_shutdown_joins() {
        let reference = MunicipalityReference::load(
            PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/municipalities.csv"),
        )
        .await
        .unwrap();
        let store = Arc::new(MemoryStore::new(reference));
        let ingestor = Arc::new(Ingestor::new(
            store.clone(),
            Sources {
                cases: fixture("cases.csv"),
                timeline: fixture("timeline.csv"),
                deaths: fixture("deaths.csv"),
                demographics: fixture("demographics.csv"),
                waste: fixture("waste.csv"),
            },
            SourceReader::new(Duration::ZERO).unwrap(),
            NaiveDate::from_ymd_opt(2022, 7, 12).unwrap(),
        ));

        let handle = PeriodicIngest::new(ingestor, DEFAULT_INTERVAL).spawn();

        let mut populated = false;
        for _ in 0..200 {
            if store.timeline(&DatesFilter::default()).await.unwrap().len() == 3 {
                populated = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(populated, "first run did not populate the timeline");

        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_without_runs_in_flight() {
        let ingestor = Arc::new(Ingestor::new(
            Arc::new(MemoryStore::default()),
            Sources {
                cases: fixture("missing.csv"),
                timeline: fixture("missing.csv"),
                deaths: fixture("missing.csv"),
                demographics: fixture("missing.csv"),
                waste: fixture("missing.csv"),
            },
            SourceReader::new(Duration::ZERO).unwrap(),
            NaiveDate::from_ymd_opt(2022, 7, 12).unwrap(),
        ));
        let handle = PeriodicIngest::new(ingestor, Duration::from_millis(5)).spawn();
        tokio::time::sleep(Duration::from_millis(30)).await;
        tokio::time::timeout(Duration::from_secs(5), handle.shutdown())
            .await
            .unwrap();
    }
}
