//! Storage port: every write the pipeline makes and every read the API
//! serves.
//!
//! All writes are upserts keyed by natural identity, so runs may overlap and
//! repeat without coordination.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::model::{
    Case, CasesFilter, DailyTimeline, DatesFilter, DeathsFilter, DemographicFilter,
    DemographicInfo, Municipality, RegionalUnit, YearlyDeaths,
};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("municipality '{name}' (slug '{slug}') not found in reference data")]
    UnknownMunicipality { name: String, slug: String },

    #[error("no regional unit with slug '{0}'")]
    UnknownRegionalUnit(String),

    #[error("reference data: {0}")]
    Reference(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait Store: Send + Sync {
    /// Insert-or-ignore. A unit whose normalized name or slug is already
    /// stored is skipped.
    async fn upsert_regional_unit(&self, unit: &RegionalUnit) -> StoreResult<()>;

    /// Insert-or-update keyed by (regional unit, date). The slug is resolved
    /// to the unit id here.
    async fn upsert_case(&self, slug: &str, date: NaiveDate, cases: i32) -> StoreResult<()>;

    /// Insert-or-update keyed by date; every field is overwritten.
    async fn upsert_daily_timeline(&self, record: &DailyTimeline) -> StoreResult<()>;

    /// Id of the municipality whose slug matches `name`, creating it from the
    /// reference data on first sight.
    async fn resolve_or_create_municipality(&self, name: &str) -> StoreResult<i32>;

    async fn upsert_yearly_deaths(
        &self,
        municipality_id: i32,
        year: i32,
        deaths: i32,
    ) -> StoreResult<()>;

    /// Insert-or-update keyed by (date, category).
    async fn upsert_demographic(&self, record: &DemographicInfo) -> StoreResult<()>;

    async fn regional_units(&self) -> StoreResult<Vec<RegionalUnit>>;

    async fn municipalities(&self) -> StoreResult<Vec<Municipality>>;

    async fn cases(&self, filter: &CasesFilter) -> StoreResult<Vec<Case>>;

    async fn timeline(&self, filter: &DatesFilter) -> StoreResult<Vec<DailyTimeline>>;

    async fn yearly_deaths(&self, filter: &DeathsFilter) -> StoreResult<Vec<YearlyDeaths>>;

    async fn demographics(&self, filter: &DemographicFilter) -> StoreResult<Vec<DemographicInfo>>;
}
