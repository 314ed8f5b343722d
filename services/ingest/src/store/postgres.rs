use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::info;

use super::{Store, StoreError, StoreResult};
use crate::model::{
    Case, CasesFilter, DailyTimeline, DatesFilter, DeathsFilter, DemographicFilter,
    DemographicInfo, Municipality, RegionalUnit, YearlyDeaths,
};
use crate::reference::MunicipalityReference;
use crate::slug::slugify;

/// Postgres-backed store. Each operation checks a connection out of the
/// pool, so one `PgStore` is shared by every concurrent ingestion task.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    reference: MunicipalityReference,
}

impl PgStore {
    /// Connects, applies pending migrations, and keeps `reference` for
    /// municipality creation.
    pub async fn connect(
        db_url: &str,
        max_connections: u32,
        reference: MunicipalityReference,
    ) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(db_url)
            .await?;
        info!(max_connections, "database connected");

        sqlx::migrate!("../../migrations").run(&pool).await?;
        info!("database migrations applied");

        Ok(Self::with_pool(pool, reference))
    }

    fn with_pool(pool: PgPool, reference: MunicipalityReference) -> Self {
        Self { pool, reference }
    }
}

fn push_dates(query: &mut QueryBuilder<'_, Postgres>, dates: &DatesFilter) {
    if let Some(start) = dates.start_date {
        query.push(" AND date >= ").push_bind(start);
    }
    if let Some(end) = dates.end_date {
        query.push(" AND date <= ").push_bind(end);
    }
}

#[async_trait]
impl Store for PgStore {
    async fn upsert_regional_unit(&self, unit: &RegionalUnit) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO regional_units
                (slug, department, prefecture, regional_unit_normalized, regional_unit, pop_11)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&unit.slug)
        .bind(&unit.department)
        .bind(&unit.prefecture)
        .bind(&unit.regional_unit_normalized)
        .bind(&unit.regional_unit)
        .bind(unit.pop_11)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_case(&self, slug: &str, date: NaiveDate, cases: i32) -> StoreResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO cases_per_regional_unit (regional_unit_id, date, cases)
            SELECT id, $2, $3 FROM regional_units WHERE slug = $1
            ON CONFLICT (regional_unit_id, date) DO UPDATE SET cases = EXCLUDED.cases
            "#,
        )
        .bind(slug)
        .bind(date)
        .bind(cases)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::UnknownRegionalUnit(slug.to_string()));
        }
        Ok(())
    }

    async fn upsert_daily_timeline(&self, r: &DailyTimeline) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO greece_timeline
                (date, cases, total_reinfections, deaths, deaths_cum, recovered,
                 hospital_admissions, hospital_discharges, intubated, intubated_vac,
                 intubated_unvac, icu_occupancy, beds_occupancy, estimated_new_rtpcr_tests,
                 estimated_new_rapid_tests, estimated_new_total_tests, cases_cum,
                 waste_highest_place, waste_highest_place_en, waste_highest_percent)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10,
                    $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)
            ON CONFLICT (date) DO UPDATE SET
                cases = EXCLUDED.cases,
                total_reinfections = EXCLUDED.total_reinfections,
                deaths = EXCLUDED.deaths,
                deaths_cum = EXCLUDED.deaths_cum,
                recovered = EXCLUDED.recovered,
                hospital_admissions = EXCLUDED.hospital_admissions,
                hospital_discharges = EXCLUDED.hospital_discharges,
                intubated = EXCLUDED.intubated,
                intubated_vac = EXCLUDED.intubated_vac,
                intubated_unvac = EXCLUDED.intubated_unvac,
                icu_occupancy = EXCLUDED.icu_occupancy,
                beds_occupancy = EXCLUDED.beds_occupancy,
                estimated_new_rtpcr_tests = EXCLUDED.estimated_new_rtpcr_tests,
                estimated_new_rapid_tests = EXCLUDED.estimated_new_rapid_tests,
                estimated_new_total_tests = EXCLUDED.estimated_new_total_tests,
                cases_cum = EXCLUDED.cases_cum,
                waste_highest_place = EXCLUDED.waste_highest_place,
                waste_highest_place_en = EXCLUDED.waste_highest_place_en,
                waste_highest_percent = EXCLUDED.waste_highest_percent
            "#,
        )
        .bind(r.date)
        .bind(r.cases)
        .bind(r.total_reinfections)
        .bind(r.deaths)
        .bind(r.deaths_cum)
        .bind(r.recovered)
        .bind(r.hospital_admissions)
        .bind(r.hospital_discharges)
        .bind(r.intubated)
        .bind(r.intubated_vac)
        .bind(r.intubated_unvac)
        .bind(r.icu_occupancy)
        .bind(r.beds_occupancy)
        .bind(r.estimated_new_rtpcr_tests)
        .bind(r.estimated_new_rapid_tests)
        .bind(r.estimated_new_total_tests)
        .bind(r.cases_cum)
        .bind(&r.waste_highest_place)
        .bind(&r.waste_highest_place_en)
        .bind(r.waste_highest_percent)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn resolve_or_create_municipality(&self, name: &str) -> StoreResult<i32> {
        let slug = slugify(name);

        let existing: Option<(i32,)> = sqlx::query_as("SELECT id FROM municipalities WHERE slug = $1")
            .bind(&slug)
            .fetch_optional(&self.pool)
            .await?;
        if let Some((id,)) = existing {
            return Ok(id);
        }

        let Some(reference) = self.reference.get(&slug) else {
            return Err(StoreError::UnknownMunicipality {
                name: name.to_string(),
                slug,
            });
        };

        // A concurrent run may have inserted the same slug in between.
        let (id,): (i32,) = sqlx::query_as(
            r#"
            INSERT INTO municipalities (name, slug, code, pop_11, pop_21)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (slug) DO UPDATE SET slug = EXCLUDED.slug
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(&slug)
        .bind(&reference.code)
        .bind(reference.pop_11)
        .bind(reference.pop_21)
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn upsert_yearly_deaths(
        &self,
        municipality_id: i32,
        year: i32,
        deaths: i32,
    ) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO deaths_per_municipality_cum (year, municipality_id, deaths_cum)
            VALUES ($1, $2, $3)
            ON CONFLICT (year, municipality_id) DO UPDATE SET deaths_cum = EXCLUDED.deaths_cum
            "#,
        )
        .bind(year)
        .bind(municipality_id)
        .bind(deaths)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn upsert_demographic(&self, r: &DemographicInfo) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO demography_per_age
                (date, category, cases, deaths, intensive, discharged, hospitalized,
                 hospitalized_in_icu, passed_away, recovered, treated_at_home)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (date, category) DO UPDATE SET
                cases = EXCLUDED.cases,
                deaths = EXCLUDED.deaths,
                intensive = EXCLUDED.intensive,
                discharged = EXCLUDED.discharged,
                hospitalized = EXCLUDED.hospitalized,
                hospitalized_in_icu = EXCLUDED.hospitalized_in_icu,
                passed_away = EXCLUDED.passed_away,
                recovered = EXCLUDED.recovered,
                treated_at_home = EXCLUDED.treated_at_home
            "#,
        )
        .bind(r.date)
        .bind(&r.category)
        .bind(r.cases)
        .bind(r.deaths)
        .bind(r.intensive)
        .bind(r.discharged)
        .bind(r.hospitalized)
        .bind(r.hospitalized_in_icu)
        .bind(r.passed_away)
        .bind(r.recovered)
        .bind(r.treated_at_home)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn regional_units(&self) -> StoreResult<Vec<RegionalUnit>> {
        let rows = sqlx::query_as::<_, RegionalUnit>(
            r#"
            SELECT id, slug, department, prefecture, regional_unit_normalized, regional_unit, pop_11
            FROM regional_units
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn municipalities(&self) -> StoreResult<Vec<Municipality>> {
        let rows = sqlx::query_as::<_, Municipality>(
            "SELECT id, name, slug, code, pop_11, pop_21 FROM municipalities ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn cases(&self, filter: &CasesFilter) -> StoreResult<Vec<Case>> {
        let mut query = QueryBuilder::<Postgres>::new(
            "SELECT regional_unit_id, date, cases FROM cases_per_regional_unit WHERE 1=1",
        );
        if let Some(id) = filter.regional_unit_id {
            query.push(" AND regional_unit_id = ").push_bind(id);
        }
        push_dates(&mut query, &filter.dates);
        query.push(" ORDER BY date ASC, regional_unit_id ASC");

        Ok(query.build_query_as::<Case>().fetch_all(&self.pool).await?)
    }

    async fn timeline(&self, filter: &DatesFilter) -> StoreResult<Vec<DailyTimeline>> {
        let mut query = QueryBuilder::<Postgres>::new(
            r#"
            SELECT date, cases, total_reinfections, deaths, deaths_cum, recovered,
                   hospital_admissions, hospital_discharges, intubated, intubated_vac,
                   intubated_unvac, icu_occupancy, beds_occupancy, estimated_new_rtpcr_tests,
                   estimated_new_rapid_tests, estimated_new_total_tests, cases_cum,
                   waste_highest_place, waste_highest_place_en, waste_highest_percent
            FROM greece_timeline WHERE 1=1
            "#,
        );
        push_dates(&mut query, filter);
        query.push(" ORDER BY date ASC");

        Ok(query
            .build_query_as::<DailyTimeline>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn yearly_deaths(&self, filter: &DeathsFilter) -> StoreResult<Vec<YearlyDeaths>> {
        let mut query = QueryBuilder::<Postgres>::new(
            r#"
            SELECT municipality_id, deaths_cum AS deaths, year
            FROM deaths_per_municipality_cum WHERE 1=1
            "#,
        );
        if let Some(id) = filter.municipality_id {
            query.push(" AND municipality_id = ").push_bind(id);
        }
        if let Some(year) = filter.year {
            query.push(" AND year = ").push_bind(year);
        }
        query.push(" ORDER BY year ASC, municipality_id ASC");

        Ok(query
            .build_query_as::<YearlyDeaths>()
            .fetch_all(&self.pool)
            .await?)
    }

    async fn demographics(&self, filter: &DemographicFilter) -> StoreResult<Vec<DemographicInfo>> {
        let mut query = QueryBuilder::<Postgres>::new(
            r#"
            SELECT date, category, cases, deaths, intensive, discharged, hospitalized,
                   hospitalized_in_icu, passed_away, recovered, treated_at_home
            FROM demography_per_age WHERE 1=1
            "#,
        );
        if let Some(category) = &filter.category {
            query.push(" AND category = ").push_bind(category.clone());
        }
        push_dates(&mut query, &filter.dates);
        query.push(" ORDER BY date ASC, category ASC");

        Ok(query
            .build_query_as::<DemographicInfo>()
            .fetch_all(&self.pool)
            .await?)
    }
}
