use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use super::{Store, StoreError, StoreResult};
use crate::cancel::CancelHandle;
use crate::model::{
    Case, CasesFilter, DailyTimeline, DatesFilter, DeathsFilter, DemographicFilter,
    DemographicInfo, Municipality, RegionalUnit, YearlyDeaths,
};
use crate::reference::MunicipalityReference;
use crate::slug::slugify;

#[derive(Default)]
struct Tables {
    // keyed by normalized name
    regional_units: BTreeMap<String, RegionalUnit>,
    cases: BTreeMap<(i32, NaiveDate), i32>,
    timeline: BTreeMap<NaiveDate, DailyTimeline>,
    // keyed by slug
    municipalities: BTreeMap<String, Municipality>,
    deaths: BTreeMap<(i32, i32), i32>,
    demographics: BTreeMap<(NaiveDate, String), DemographicInfo>,
    next_unit_id: i32,
    next_municipality_id: i32,
    writes: usize,
    failing: HashSet<&'static str>,
    cancel_at: Option<(usize, CancelHandle)>,
}

impl Tables {
    fn check(&self, op: &'static str) -> StoreResult<()> {
        if self.failing.contains(op) {
            return Err(StoreError::Unavailable(format!("{op} disabled")));
        }
        Ok(())
    }

    fn record_write(&mut self) {
        self.writes += 1;
        if let Some((at, handle)) = &self.cancel_at {
            if self.writes >= *at {
                handle.cancel();
            }
        }
    }
}

/// In-process store with the same upsert semantics as [`PgStore`].
///
/// Backs `--dry-run` and the test suites. Individual operations can be made
/// to fail with [`fail_on`](Self::fail_on).
///
/// [`PgStore`]: super::PgStore
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    reference: MunicipalityReference,
}

impl MemoryStore {
    pub fn new(reference: MunicipalityReference) -> Self {
        Self {
            tables: RwLock::default(),
            reference,
        }
    }

    /// Makes every later call of the named operation fail.
    pub async fn fail_on(&self, op: &'static str) {
        self.tables.write().await.failing.insert(op);
    }

    /// Cancels through `handle` once `writes` write operations have
    /// succeeded.
    pub async fn cancel_after(&self, writes: usize, handle: CancelHandle) {
        self.tables.write().await.cancel_at = Some((writes, handle));
    }

    /// Number of successful write operations so far.
    pub async fn write_count(&self) -> usize {
        self.tables.read().await.writes
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_regional_unit(&self, unit: &RegionalUnit) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.check("upsert_regional_unit")?;
        let exists = t.regional_units.contains_key(&unit.regional_unit_normalized)
            || t.regional_units.values().any(|u| u.slug == unit.slug);
        if !exists {
            t.next_unit_id += 1;
            let stored = RegionalUnit {
                id: t.next_unit_id,
                ..unit.clone()
            };
            t.regional_units
                .insert(unit.regional_unit_normalized.clone(), stored);
        }
        t.record_write();
        Ok(())
    }

    async fn upsert_case(&self, slug: &str, date: NaiveDate, cases: i32) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.check("upsert_case")?;
        let id = t
            .regional_units
            .values()
            .find(|u| u.slug == slug)
            .map(|u| u.id)
            .ok_or_else(|| StoreError::UnknownRegionalUnit(slug.to_string()))?;
        t.cases.insert((id, date), cases);
        t.record_write();
        Ok(())
    }

    async fn upsert_daily_timeline(&self, record: &DailyTimeline) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.check("upsert_daily_timeline")?;
        t.timeline.insert(record.date, record.clone());
        t.record_write();
        Ok(())
    }

    async fn resolve_or_create_municipality(&self, name: &str) -> StoreResult<i32> {
        let mut t = self.tables.write().await;
        t.check("resolve_or_create_municipality")?;
        let slug = slugify(name);
        if let Some(existing) = t.municipalities.get(&slug) {
            return Ok(existing.id);
        }
        let reference = self
            .reference
            .get(&slug)
            .ok_or_else(|| StoreError::UnknownMunicipality {
                name: name.to_string(),
                slug: slug.clone(),
            })?;
        t.next_municipality_id += 1;
        let id = t.next_municipality_id;
        t.municipalities.insert(
            slug.clone(),
            Municipality {
                id,
                name: name.to_string(),
                slug,
                code: reference.code.clone(),
                pop_11: reference.pop_11,
                pop_21: reference.pop_21,
            },
        );
        t.record_write();
        Ok(id)
    }

    async fn upsert_yearly_deaths(
        &self,
        municipality_id: i32,
        year: i32,
        deaths: i32,
    ) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.check("upsert_yearly_deaths")?;
        t.deaths.insert((year, municipality_id), deaths);
        t.record_write();
        Ok(())
    }

    async fn upsert_demographic(&self, record: &DemographicInfo) -> StoreResult<()> {
        let mut t = self.tables.write().await;
        t.check("upsert_demographic")?;
        t.demographics
            .insert((record.date, record.category.clone()), record.clone());
        t.record_write();
        Ok(())
    }

    async fn regional_units(&self) -> StoreResult<Vec<RegionalUnit>> {
        let t = self.tables.read().await;
        t.check("regional_units")?;
        let mut units: Vec<_> = t.regional_units.values().cloned().collect();
        units.sort_by_key(|u| u.id);
        Ok(units)
    }

    async fn municipalities(&self) -> StoreResult<Vec<Municipality>> {
        let t = self.tables.read().await;
        t.check("municipalities")?;
        let mut municipalities: Vec<_> = t.municipalities.values().cloned().collect();
        municipalities.sort_by_key(|m| m.id);
        Ok(municipalities)
    }

    async fn cases(&self, filter: &CasesFilter) -> StoreResult<Vec<Case>> {
        let t = self.tables.read().await;
        t.check("cases")?;
        let mut cases: Vec<_> = t
            .cases
            .iter()
            .filter(|((id, date), _)| {
                filter.regional_unit_id.map_or(true, |wanted| wanted == *id)
                    && filter.dates.contains(*date)
            })
            .map(|((id, date), cases)| Case {
                regional_unit_id: *id,
                date: *date,
                cases: *cases,
            })
            .collect();
        cases.sort_by_key(|c| (c.date, c.regional_unit_id));
        Ok(cases)
    }

    async fn timeline(&self, filter: &DatesFilter) -> StoreResult<Vec<DailyTimeline>> {
        let t = self.tables.read().await;
        t.check("timeline")?;
        Ok(t
            .timeline
            .values()
            .filter(|r| filter.contains(r.date))
            .cloned()
            .collect())
    }

    async fn yearly_deaths(&self, filter: &DeathsFilter) -> StoreResult<Vec<YearlyDeaths>> {
        let t = self.tables.read().await;
        t.check("yearly_deaths")?;
        Ok(t
            .deaths
            .iter()
            .filter(|((year, id), _)| {
                filter.municipality_id.map_or(true, |wanted| wanted == *id)
                    && filter.year.map_or(true, |wanted| wanted == *year)
            })
            .map(|((year, id), deaths)| YearlyDeaths {
                municipality_id: *id,
                deaths: *deaths,
                year: *year,
            })
            .collect())
    }

    async fn demographics(&self, filter: &DemographicFilter) -> StoreResult<Vec<DemographicInfo>> {
        let t = self.tables.read().await;
        t.check("demographics")?;
        Ok(t
            .demographics
            .values()
            .filter(|r| {
                filter.dates.contains(r.date)
                    && filter.category.as_deref().map_or(true, |c| c == r.category)
            })
            .cloned()
            .collect())
    }
}
