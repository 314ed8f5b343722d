//! The transformation orchestrator: reads each source, normalizes it and
//! writes the records through the [`Store`].

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::cancel::Cancellation;
use crate::error::{IngestError, JobFailure, Result};
use crate::normalize::{self, TimelineAccumulator, WeeklyCadence};
use crate::source::{SourceReader, Sources};
use crate::store::Store;
use crate::tabular::Table;

/// A dataset that can be populated on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Dataset {
    All,
    RegionalUnits,
    Cases,
    Timeline,
    Deaths,
    Demographics,
}

/// Records written per dataset by one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub regional_units: usize,
    pub cases: usize,
    pub timeline: usize,
    pub yearly_deaths: usize,
    pub demographics: usize,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.regional_units + self.cases + self.timeline + self.yearly_deaths + self.demographics
    }
}

pub struct Ingestor {
    store: Arc<dyn Store>,
    sources: Sources,
    reader: SourceReader,
    cutover: NaiveDate,
}

impl Ingestor {
    pub fn new(
        store: Arc<dyn Store>,
        sources: Sources,
        reader: SourceReader,
        cutover: NaiveDate,
    ) -> Self {
        Self {
            store,
            sources,
            reader,
            cutover,
        }
    }

    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    // ========================================================================
    // Per-dataset operations
    // ========================================================================

    #[instrument(skip_all)]
    pub async fn populate_regional_units(&self, cancel: &Cancellation) -> Result<usize> {
        let table = self.reader.read_table(&self.sources.cases).await?;
        self.write_regional_units(&table, cancel).await
    }

    #[instrument(skip_all)]
    pub async fn populate_cases(&self, cancel: &Cancellation) -> Result<usize> {
        let table = self.reader.read_table(&self.sources.cases).await?;
        self.write_cases(&table, cancel).await
    }

    /// Timeline records with the wastewater signal merged in.
    #[instrument(skip_all)]
    pub async fn populate_timeline(&self, cancel: &Cancellation) -> Result<usize> {
        let timeline = self.reader.read_table(&self.sources.timeline).await?;
        let waste = self.reader.read_table(&self.sources.waste).await?;

        let mut acc = TimelineAccumulator::from_table(&timeline)?;
        let signals = normalize::waste_signals(&waste)?;
        acc.merge_waste(&signals);

        let records = acc.into_records();
        let (first, last) = (
            records.first().map(|r| r.date),
            records.last().map(|r| r.date),
        );
        for record in &records {
            cancel.check()?;
            self.store
                .upsert_daily_timeline(record)
                .await
                .map_err(IngestError::storage("upsert_daily_timeline", record.date.to_string()))?;
        }

        info!(
            dates = records.len(),
            waste_dates = signals.len(),
            from = ?first,
            until = ?last,
            "timeline populated"
        );
        Ok(records.len())
    }

    #[instrument(skip_all)]
    pub async fn populate_deaths(&self, cancel: &Cancellation) -> Result<usize> {
        let table = self.reader.read_table(&self.sources.deaths).await?;
        let rows = normalize::yearly_deaths(&table)?;

        let mut written = 0;
        for row in &rows {
            cancel.check()?;
            let id = self
                .store
                .resolve_or_create_municipality(&row.municipality)
                .await
                .map_err(IngestError::storage(
                    "resolve_or_create_municipality",
                    row.municipality.as_str(),
                ))?;
            for (year, deaths) in &row.yearly {
                cancel.check()?;
                self.store
                    .upsert_yearly_deaths(id, *year, *deaths)
                    .await
                    .map_err(IngestError::storage(
                        "upsert_yearly_deaths",
                        format!("{}@{year}", row.municipality),
                    ))?;
                written += 1;
            }
        }

        info!(
            municipalities = rows.len(),
            yearly_records = written,
            "yearly deaths populated"
        );
        Ok(written)
    }

    /// The whole file is validated before the first write.
    #[instrument(skip_all)]
    pub async fn populate_demographics(&self, cancel: &Cancellation) -> Result<usize> {
        let table = self.reader.read_table(&self.sources.demographics).await?;
        let records = normalize::demographics(&table)?;

        for record in &records {
            cancel.check()?;
            self.store
                .upsert_demographic(record)
                .await
                .map_err(IngestError::storage(
                    "upsert_demographic",
                    format!("{}@{}", record.category, record.date),
                ))?;
        }

        info!(entries = records.len(), "demographics populated");
        Ok(records.len())
    }

    // ========================================================================
    // Combined runs
    // ========================================================================

    /// Runs the four independent dataset groups concurrently and waits for
    /// all of them. Writes of groups that succeeded are kept when another
    /// group fails.
    #[instrument(skip_all)]
    pub async fn populate_everything(&self, cancel: &Cancellation) -> Result<RunSummary> {
        cancel.check()?;
        info!("ingestion run started");

        let (units_and_cases, timeline, deaths, demographics) = tokio::join!(
            self.regional_units_and_cases(cancel),
            self.populate_timeline(cancel),
            self.populate_deaths(cancel),
            self.populate_demographics(cancel),
        );

        let mut summary = RunSummary::default();
        let mut failures = Vec::new();

        match units_and_cases {
            Ok((units, cases)) => {
                summary.regional_units = units;
                summary.cases = cases;
            }
            Err(error) => failures.push(JobFailure {
                job: "regional_units_and_cases",
                error,
            }),
        }
        collect(timeline, "timeline", &mut summary.timeline, &mut failures);
        collect(deaths, "deaths", &mut summary.yearly_deaths, &mut failures);
        collect(
            demographics,
            "demographics",
            &mut summary.demographics,
            &mut failures,
        );

        if failures.is_empty() {
            info!(records = summary.total(), "ingestion run finished");
            Ok(summary)
        } else {
            for failure in &failures {
                warn!(job = failure.job, error = %failure.error, "ingestion job failed");
            }
            Err(IngestError::Jobs(failures))
        }
    }

    /// Runs the selected datasets one after another. `All` anywhere in the
    /// selection means [`populate_everything`](Self::populate_everything).
    pub async fn populate(&self, datasets: &[Dataset], cancel: &Cancellation) -> Result<RunSummary> {
        if datasets.is_empty() || datasets.contains(&Dataset::All) {
            return self.populate_everything(cancel).await;
        }

        let mut summary = RunSummary::default();
        for dataset in datasets {
            match dataset {
                Dataset::All => {}
                Dataset::RegionalUnits => {
                    summary.regional_units = self.populate_regional_units(cancel).await?
                }
                Dataset::Cases => summary.cases = self.populate_cases(cancel).await?,
                Dataset::Timeline => summary.timeline = self.populate_timeline(cancel).await?,
                Dataset::Deaths => summary.yearly_deaths = self.populate_deaths(cancel).await?,
                Dataset::Demographics => {
                    summary.demographics = self.populate_demographics(cancel).await?
                }
            }
        }
        Ok(summary)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    /// Units must be stored before their cases, so the cases source is read
    /// once and written in that order.
    async fn regional_units_and_cases(&self, cancel: &Cancellation) -> Result<(usize, usize)> {
        let table = self.reader.read_table(&self.sources.cases).await?;
        let units = self.write_regional_units(&table, cancel).await?;
        let cases = self.write_cases(&table, cancel).await?;
        Ok((units, cases))
    }

    async fn write_regional_units(&self, table: &Table, cancel: &Cancellation) -> Result<usize> {
        let units = normalize::regional_units(table);
        for unit in &units {
            cancel.check()?;
            self.store
                .upsert_regional_unit(unit)
                .await
                .map_err(IngestError::storage("upsert_regional_unit", unit.slug.as_str()))?;
        }
        info!(regional_units = units.len(), "regional units populated");
        Ok(units.len())
    }

    async fn write_cases(&self, table: &Table, cancel: &Cancellation) -> Result<usize> {
        // The weekly cadence is open-ended, so "today" is re-read every run.
        let cadence = WeeklyCadence::new(self.cutover, Utc::now().date_naive());
        let observations = normalize::cases(table, &cadence)?;
        for obs in &observations {
            cancel.check()?;
            self.store
                .upsert_case(&obs.regional_unit_slug, obs.date, obs.cases)
                .await
                .map_err(IngestError::storage(
                    "upsert_case",
                    format!("{}@{}", obs.regional_unit_slug, obs.date),
                ))?;
        }
        info!(
            cases = observations.len(),
            cutover = %self.cutover,
            "cases populated"
        );
        Ok(observations.len())
    }
}

fn collect(
    result: Result<usize>,
    job: &'static str,
    slot: &mut usize,
    failures: &mut Vec<JobFailure>,
) {
    match result {
        Ok(count) => *slot = count,
        Err(error) => failures.push(JobFailure { job, error }),
    }
}
