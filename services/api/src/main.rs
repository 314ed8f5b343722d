//! API Service - read-only access to the Greek COVID-19 data
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /regional_units, /municipalities, /cases, /deaths_per_municipality
//! - GET /timeline, /timeline_fields, /{field} - National timeline
//! - GET /demographics - Per age group
//! - GET /check_auth, /refresh - Admin, bearer token required

mod auth;
mod cache;
mod config;
mod error;
mod params;
mod rate_limit;
mod routes;
mod runs;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use ingest::reference::MunicipalityReference;
use ingest::scheduler::PeriodicIngest;
use ingest::source::SourceReader;
use ingest::{Cancellation, IngestConfig, Ingestor, PgStore};

use crate::cache::ResponseCache;
use crate::config::ApiConfig;
use crate::rate_limit::IpRateLimit;
use crate::routes::{router, AppState};
use crate::runs::RefreshRuns;

#[derive(Parser, Debug)]
#[command(name = "api", about = "Serves the COVID-19 database over HTTP")]
struct Args {
    /// Do not populate the database on startup or on a schedule
    #[arg(long, default_value = "false")]
    skip_population: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    ingest::telemetry::init_tracing();
    let args = Args::parse();
    let api_config = ApiConfig::from_env()?;
    let ingest_config = IngestConfig::from_env()?;

    let reference = MunicipalityReference::load(&ingest_config.municipalities_ref_csv)
        .await
        .context("Failed to load municipality reference data")?;
    let store = PgStore::connect(
        ingest_config.require_db_url()?,
        ingest_config.db_max_connections,
        reference,
    )
    .await
    .context("Failed to connect to database")?;

    let ingestor = Arc::new(Ingestor::new(
        Arc::new(store),
        ingest_config.sources.clone(),
        SourceReader::new(ingest_config.rate_limit)?,
        ingest_config.cadence_cutover,
    ));

    let scheduler = if args.skip_population {
        info!("population skipped");
        None
    } else {
        Some(PeriodicIngest::new(ingestor.clone(), api_config.refresh_interval).spawn())
    };

    let (shutdown_handle, shutdown) = Cancellation::new();
    let refreshes = RefreshRuns::default();
    let state = AppState {
        ingestor,
        cache: ResponseCache::new(api_config.cache_ttl),
        auth_secret: api_config.auth_secret.as_deref().map(Arc::from),
        shutdown,
        refreshes: refreshes.clone(),
        rate_limit: api_config.rate_limit_per_minute.map(IpRateLimit::per_minute),
    };

    let listener = tokio::net::TcpListener::bind(&api_config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", api_config.bind))?;
    info!(bind = %api_config.bind, "API listening");

    let app = router(state).into_make_service_with_connect_info::<SocketAddr>();
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "cannot listen for ctrl-c");
            }
            info!("shutting down");
        })
        .await?;

    shutdown_handle.cancel();
    let joined = refreshes.drain().await;
    info!(joined, "refresh runs finished");
    if let Some(scheduler) = scheduler {
        scheduler.shutdown().await;
    }
    info!("API stopped");

    Ok(())
}
