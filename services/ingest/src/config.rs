//! Environment configuration for the ingestion pipeline.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use crate::source::{SourceLocation, Sources};

pub const DEFAULT_CASES_CSV_URL: &str =
    "https://raw.githubusercontent.com/iMEdD-Lab/open-data/master/COVID-19/greece_cases_v2.csv";
pub const DEFAULT_TIMELINE_CSV_URL: &str =
    "https://raw.githubusercontent.com/iMEdD-Lab/open-data/master/COVID-19/greeceTimeline.csv";

/// Upstream switched from daily to weekly case reports after this date.
pub const DEFAULT_CADENCE_CUTOVER: &str = "2022-07-12";

#[derive(Debug, Clone)]
pub struct IngestConfig {
    /// Absent is fine for runs that never touch the database.
    pub db_url: Option<String>,
    pub db_max_connections: u32,
    pub sources: Sources,
    pub cadence_cutover: NaiveDate,
    pub municipalities_ref_csv: PathBuf,
    pub rate_limit: Duration,
}

impl IngestConfig {
    /// Reads the process environment, after loading `.env` if present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn require_db_url(&self) -> Result<&str> {
        self.db_url.as_deref().context("DB_URL env var missing")
    }

    /// Builds the configuration from any key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| lookup(key).with_context(|| format!("{key} env var missing"));
        let or_default =
            |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let cadence_cutover = or_default("CADENCE_CUTOVER", DEFAULT_CADENCE_CUTOVER);
        let cadence_cutover = NaiveDate::parse_from_str(&cadence_cutover, "%Y-%m-%d")
            .with_context(|| format!("CADENCE_CUTOVER '{cadence_cutover}' is not a YYYY-MM-DD date"))?;

        let db_max_connections = or_default("DB_MAX_CONNECTIONS", "5");
        let db_max_connections: u32 = db_max_connections
            .parse()
            .with_context(|| format!("DB_MAX_CONNECTIONS '{db_max_connections}' is not a number"))?;

        let rate_limit_ms = or_default("RATE_LIMIT_MS", "1000");
        let rate_limit_ms: u64 = rate_limit_ms
            .parse()
            .with_context(|| format!("RATE_LIMIT_MS '{rate_limit_ms}' is not a number"))?;

        Ok(Self {
            db_url: lookup("DB_URL").filter(|url| !url.is_empty()),
            db_max_connections,
            sources: Sources {
                cases: SourceLocation::parse(&or_default("CASES_CSV_URL", DEFAULT_CASES_CSV_URL)),
                timeline: SourceLocation::parse(&or_default(
                    "TIMELINE_CSV_URL",
                    DEFAULT_TIMELINE_CSV_URL,
                )),
                deaths: SourceLocation::parse(&required("DEATHS_CSV_URL")?),
                demographics: SourceLocation::parse(&required("DEMOGRAPHICS_CSV_URL")?),
                waste: SourceLocation::parse(&required("WASTE_CSV_URL")?),
            },
            cadence_cutover,
            municipalities_ref_csv: PathBuf::from(or_default(
                "MUNICIPALITIES_REF_CSV",
                "data/municipalities_ypes.csv",
            )),
            rate_limit: Duration::from_millis(rate_limit_ms),
        })
    }
}
