//! Ingest - populates the store from the Greek COVID-19 CSV sources.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use ingest::reference::MunicipalityReference;
use ingest::source::SourceReader;
use ingest::{Cancellation, Dataset, IngestConfig, Ingestor, MemoryStore, PgStore, Store};

#[derive(Parser, Debug)]
#[command(name = "ingest", about = "Populates the database from the COVID-19 CSV sources")]
struct Args {
    /// Dataset to populate; repeat for several
    #[arg(long = "dataset", value_enum, default_value = "all")]
    datasets: Vec<Dataset>,

    /// Dry run - use an in-memory store and only print counts
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    ingest::telemetry::init_tracing();
    let args = Args::parse();
    let config = IngestConfig::from_env()?;

    let reference = MunicipalityReference::load(&config.municipalities_ref_csv)
        .await
        .context("Failed to load municipality reference data")?;

    let store: Arc<dyn Store> = if args.dry_run {
        info!("dry run - writing to an in-memory store");
        Arc::new(MemoryStore::new(reference))
    } else {
        Arc::new(
            PgStore::connect(config.require_db_url()?, config.db_max_connections, reference)
                .await
                .context("Failed to connect to database")?,
        )
    };

    let reader = SourceReader::new(config.rate_limit)?;
    let ingestor = Ingestor::new(store, config.sources.clone(), reader, config.cadence_cutover);

    let (cancel_handle, cancel) = Cancellation::new();
    let run = ingestor.populate(&args.datasets, &cancel);
    tokio::pin!(run);

    let summary = tokio::select! {
        result = &mut run => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted - letting in-flight writes finish");
            cancel_handle.cancel();
            run.await?
        }
    };

    info!(
        regional_units = summary.regional_units,
        cases = summary.cases,
        timeline = summary.timeline,
        yearly_deaths = summary.yearly_deaths,
        demographics = summary.demographics,
        dry_run = args.dry_run,
        "ingestion complete"
    );
    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
