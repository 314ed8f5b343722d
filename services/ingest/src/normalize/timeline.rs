use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::Result;
use crate::header_date::decode_header_row;
use crate::model::{DailyTimeline, WasteSignal};
use crate::tabular::Table;
use crate::values::{lenient_float, lenient_int};

const FIRST_DATE_COLUMN: usize = 3;

type Setter = fn(&mut DailyTimeline, &str);

/// Source row index of each metric in the timeline feed. Rows not listed
/// are ignored.
const ROW_FIELDS: &[(usize, Setter)] = &[
    (1, |t, c| t.cases = lenient_int(c)),
    (3, |t, c| t.total_reinfections = lenient_int(c)),
    (4, |t, c| t.deaths = lenient_int(c)),
    (5, |t, c| t.deaths_cum = lenient_int(c)),
    (6, |t, c| t.recovered = lenient_int(c)),
    (8, |t, c| t.hospital_admissions = lenient_int(c)),
    (9, |t, c| t.hospital_discharges = lenient_int(c)),
    (12, |t, c| t.intubated = lenient_int(c)),
    (13, |t, c| t.intubated_unvac = lenient_int(c)),
    (14, |t, c| t.intubated_vac = lenient_int(c)),
    (15, |t, c| t.icu_occupancy = lenient_float(c)),
    (16, |t, c| t.beds_occupancy = lenient_float(c)),
    (18, |t, c| t.estimated_new_rtpcr_tests = lenient_int(c)),
    (20, |t, c| t.estimated_new_rapid_tests = lenient_int(c)),
    (21, |t, c| t.estimated_new_total_tests = lenient_int(c)),
    (22, |t, c| t.cases_cum = lenient_int(c)),
];

fn setter_for(row_index: usize) -> Option<Setter> {
    ROW_FIELDS
        .iter()
        .find(|(row, _)| *row == row_index)
        .map(|(_, set)| *set)
}

/// One [`DailyTimeline`] per header date of a timeline table, filled in row
/// by row. Scoped to a single normalization run.
#[derive(Debug, Default)]
pub struct TimelineAccumulator {
    records: BTreeMap<NaiveDate, DailyTimeline>,
}

impl TimelineAccumulator {
    pub fn from_table(table: &Table) -> Result<Self> {
        let mut acc = Self::default();
        let Some(header) = table.first() else {
            return Ok(acc);
        };
        let dates = decode_header_row(header, FIRST_DATE_COLUMN)?;
        for date in &dates {
            acc.records
                .entry(*date)
                .or_insert_with(|| DailyTimeline::new(*date));
        }

        for (row_index, row) in table.iter().enumerate().skip(1) {
            let Some(set) = setter_for(row_index) else {
                continue;
            };
            for (offset, date) in dates.iter().enumerate() {
                let Some(cell) = row.get(FIRST_DATE_COLUMN + offset) else {
                    continue;
                };
                if let Some(record) = acc.records.get_mut(date) {
                    set(record, cell);
                }
            }
        }
        Ok(acc)
    }

    /// Copies the day's highest wastewater signal onto each matching date.
    /// Dates without a signal keep zeroed waste fields.
    pub fn merge_waste(&mut self, signals: &BTreeMap<NaiveDate, WasteSignal>) {
        for (date, record) in self.records.iter_mut() {
            if let Some(signal) = signals.get(date) {
                record.waste_highest_place = signal.place.clone();
                record.waste_highest_place_en = signal.place_en.clone();
                record.waste_highest_percent = signal.percentage;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in ascending date order.
    pub fn into_records(self) -> Vec<DailyTimeline> {
        self.records.into_values().collect()
    }
}
