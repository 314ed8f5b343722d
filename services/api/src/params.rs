//! Query-string parameters shared by the list endpoints.
//!
//! Parsing is lenient: a malformed or non-positive value is treated as if it
//! were absent.

use chrono::NaiveDate;
use serde::Deserialize;

use ingest::model::{CasesFilter, DatesFilter, DeathsFilter, DemographicFilter};

pub const PER_PAGE_DEFAULT: usize = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub regional_unit_id: Option<String>,
    pub municipality_id: Option<String>,
    pub year: Option<String>,
    pub category: Option<String>,
    pub fields: Option<String>,
    pub page: Option<String>,
    pub per_page: Option<String>,
}

fn date(value: &Option<String>) -> Option<NaiveDate> {
    value
        .as_deref()
        .and_then(|v| NaiveDate::parse_from_str(v.trim(), "%Y-%m-%d").ok())
}

fn positive<T>(value: &Option<String>) -> Option<T>
where
    T: std::str::FromStr + PartialOrd + Default,
{
    value
        .as_deref()
        .and_then(|v| v.trim().parse::<T>().ok())
        .filter(|v| *v > T::default())
}

impl ListParams {
    pub fn dates(&self) -> DatesFilter {
        DatesFilter {
            start_date: date(&self.start_date),
            end_date: date(&self.end_date),
        }
    }

    pub fn cases(&self) -> CasesFilter {
        CasesFilter {
            dates: self.dates(),
            regional_unit_id: positive(&self.regional_unit_id),
        }
    }

    pub fn deaths(&self) -> DeathsFilter {
        DeathsFilter {
            municipality_id: positive(&self.municipality_id),
            year: positive(&self.year),
        }
    }

    pub fn demographics(&self) -> DemographicFilter {
        DemographicFilter {
            dates: self.dates(),
            category: self.category.clone().filter(|c| !c.is_empty()),
        }
    }

    /// Requested timeline fields, in request order.
    pub fn fields(&self) -> Vec<&str> {
        self.fields
            .as_deref()
            .map(|f| f.split(',').map(str::trim).filter(|f| !f.is_empty()).collect())
            .unwrap_or_default()
    }

    pub fn pagination(&self) -> Pagination {
        Pagination {
            page: positive(&self.page).unwrap_or(1),
            per_page: positive(&self.per_page).unwrap_or(PER_PAGE_DEFAULT),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: usize,
    pub per_page: usize,
}

impl Pagination {
    /// The requested page of `items`; empty when the page starts past the
    /// end.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let start = (self.page - 1).saturating_mul(self.per_page);
        if start >= items.len() {
            return Vec::new();
        }
        items
            .into_iter()
            .skip(start)
            .take(self.per_page)
            .collect()
    }
}
