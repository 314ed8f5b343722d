//! Domain records produced by the normalizers and served by the store.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A Greek regional unit (περιφερειακή ενότητα).
///
/// `id` is 0 until the record has been stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RegionalUnit {
    pub id: i32,
    pub slug: String,
    pub department: String,
    pub prefecture: String,
    pub regional_unit_normalized: String,
    pub regional_unit: String,
    pub pop_11: i32,
}

/// A case count as read from the source, before the unit slug is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseObservation {
    pub regional_unit_slug: String,
    pub date: NaiveDate,
    pub cases: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Case {
    pub regional_unit_id: i32,
    pub date: NaiveDate,
    pub cases: i32,
}

/// National aggregate for one calendar date.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailyTimeline {
    pub date: NaiveDate,
    pub cases: i32,
    pub total_reinfections: i32,
    pub deaths: i32,
    pub deaths_cum: i32,
    pub recovered: i32,
    pub hospital_admissions: i32,
    pub hospital_discharges: i32,
    pub intubated: i32,
    pub intubated_vac: i32,
    pub intubated_unvac: i32,
    pub icu_occupancy: f64,
    pub beds_occupancy: f64,
    pub estimated_new_rtpcr_tests: i32,
    pub estimated_new_rapid_tests: i32,
    pub estimated_new_total_tests: i32,
    pub cases_cum: i32,
    pub waste_highest_place: String,
    pub waste_highest_place_en: String,
    pub waste_highest_percent: f64,
}

impl DailyTimeline {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            ..Default::default()
        }
    }

    /// Value of a public timeline field, by the name listed in
    /// [`TIMELINE_FIELDS`].
    pub fn field(&self, name: &str) -> Option<Value> {
        let value = match name {
            "daily_cases" => Value::from(self.cases),
            "total_reinfections" => Value::from(self.total_reinfections),
            "deaths" => Value::from(self.deaths),
            "deaths_cum" => Value::from(self.deaths_cum),
            "recovered" => Value::from(self.recovered),
            "beds_occupancy" => Value::from(self.beds_occupancy),
            "icu_occupancy" => Value::from(self.icu_occupancy),
            "intubated" => Value::from(self.intubated),
            "intubated_vac" => Value::from(self.intubated_vac),
            "intubated_unvac" => Value::from(self.intubated_unvac),
            "hospital_admissions" => Value::from(self.hospital_admissions),
            "hospital_discharges" => Value::from(self.hospital_discharges),
            "estimated_new_rtpcr_tests" => Value::from(self.estimated_new_rtpcr_tests),
            "estimated_new_rapid_tests" => Value::from(self.estimated_new_rapid_tests),
            "estimated_new_total_tests" => Value::from(self.estimated_new_total_tests),
            "cases_cum" => Value::from(self.cases_cum),
            "waste_highest_place" => Value::from(self.waste_highest_place.clone()),
            "waste_highest_place_en" => Value::from(self.waste_highest_place_en.clone()),
            "waste_highest_percent" => Value::from(self.waste_highest_percent),
            _ => return None,
        };
        Some(value)
    }
}

/// Public names of the projectable timeline fields.
pub const TIMELINE_FIELDS: &[&str] = &[
    "daily_cases",
    "total_reinfections",
    "deaths",
    "deaths_cum",
    "recovered",
    "beds_occupancy",
    "icu_occupancy",
    "intubated",
    "intubated_vac",
    "intubated_unvac",
    "hospital_admissions",
    "hospital_discharges",
    "estimated_new_rtpcr_tests",
    "estimated_new_rapid_tests",
    "estimated_new_total_tests",
    "cases_cum",
    "waste_highest_place",
    "waste_highest_place_en",
    "waste_highest_percent",
];

/// Highest wastewater signal for one date. Never persisted on its own.
#[derive(Debug, Clone, PartialEq)]
pub struct WasteSignal {
    pub place: String,
    pub place_en: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Municipality {
    pub id: i32,
    pub name: String,
    pub slug: String,
    pub code: String,
    pub pop_11: i32,
    pub pop_21: i32,
}

/// Official municipality data (code and census populations) keyed by slug.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceMunicipality {
    pub name: String,
    pub slug: String,
    pub code: String,
    pub pop_11: i32,
    pub pop_21: i32,
}

/// One row of the deaths feed: a municipality and its `(year, deaths)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MunicipalityDeaths {
    pub municipality: String,
    pub yearly: Vec<(i32, i32)>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct YearlyDeaths {
    pub municipality_id: i32,
    pub deaths: i32,
    pub year: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct DemographicInfo {
    pub date: NaiveDate,
    pub category: String,
    pub cases: i32,
    pub deaths: i32,
    pub intensive: i32,
    pub discharged: i32,
    pub hospitalized: i32,
    pub hospitalized_in_icu: i32,
    pub passed_away: i32,
    pub recovered: i32,
    pub treated_at_home: i32,
}

// ============================================================================
// Query filters
// ============================================================================

/// Inclusive date range; an absent bound is open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DatesFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl DatesFilter {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date.map_or(true, |start| date >= start)
            && self.end_date.map_or(true, |end| date <= end)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CasesFilter {
    pub dates: DatesFilter,
    pub regional_unit_id: Option<i32>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeathsFilter {
    pub municipality_id: Option<i32>,
    pub year: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DemographicFilter {
    pub dates: DatesFilter,
    pub category: Option<String>,
}
