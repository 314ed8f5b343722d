use chrono::NaiveDate;

use crate::error::Result;
use crate::header_date::decode_header_row;
use crate::model::CaseObservation;
use crate::slug::slugify;
use crate::tabular::Table;
use crate::values::lenient_int;

const NORMALIZED_NAME: usize = 2;
const FIRST_DATE_COLUMN: usize = 5;

/// Which report dates of the cases feed carry real observations.
///
/// Up to and including `cutover` the feed is daily. After it, upstream only
/// reports once a week, so only `cutover + 7k` dates up to `today` count;
/// the days between are placeholders, not zero-case days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeeklyCadence {
    cutover: NaiveDate,
    today: NaiveDate,
}

impl WeeklyCadence {
    pub fn new(cutover: NaiveDate, today: NaiveDate) -> Self {
        Self { cutover, today }
    }

    pub fn admits(&self, date: NaiveDate) -> bool {
        if date <= self.cutover {
            return true;
        }
        date <= self.today && (date - self.cutover).num_days() % 7 == 0
    }
}

/// Case counts per (regional unit slug, date) that pass the cadence filter.
///
/// The header is decoded in full before any row is read; a single bad date
/// header fails the whole table.
pub fn cases(table: &Table, cadence: &WeeklyCadence) -> Result<Vec<CaseObservation>> {
    let Some(header) = table.first() else {
        return Ok(Vec::new());
    };
    let dates = decode_header_row(header, FIRST_DATE_COLUMN)?;

    let mut observations = Vec::new();
    for row in table.iter().skip(1) {
        let Some(name) = row.get(NORMALIZED_NAME) else {
            continue;
        };
        let slug = slugify(name);
        for (offset, date) in dates.iter().enumerate() {
            if !cadence.admits(*date) {
                continue;
            }
            let cell = row
                .get(FIRST_DATE_COLUMN + offset)
                .map(String::as_str)
                .unwrap_or_default();
            observations.push(CaseObservation {
                regional_unit_slug: slug.clone(),
                date: *date,
                cases: lenient_int(cell),
            });
        }
    }
    Ok(observations)
}
