use std::collections::BTreeMap;

use chrono::NaiveDate;

use crate::error::{IngestError, Result};
use crate::iso_week::{parse_week_key, week_dates};
use crate::model::WasteSignal;
use crate::slug::slugify;
use crate::tabular::Table;
use crate::values::lenient_float;

/// Highest wastewater signal per date.
///
/// Each row `[year-week, site, pct%]` covers the seven dates of its ISO
/// week. A later row for the same (date, site) replaces the earlier one.
/// Per date the strictly greatest percentage wins; on a tie the site that
/// sorts first keeps it. Dates no row covers are absent.
pub fn waste_signals(table: &Table) -> Result<BTreeMap<NaiveDate, WasteSignal>> {
    let mut by_date: BTreeMap<NaiveDate, BTreeMap<&str, f64>> = BTreeMap::new();

    for (index, row) in table.iter().enumerate().skip(1) {
        let line = super::line_of(index);
        let [key, site, percentage, ..] = row.as_slice() else {
            return Err(IngestError::MalformedInput {
                line: line as u64,
                reason: format!("expected 3 columns, found {}", row.len()),
            });
        };
        let (year, week) = parse_week_key(key, line)?;
        let dates = week_dates(year, week, line, key)?;
        let percentage = lenient_float(percentage.trim().trim_end_matches('%'));

        for date in dates {
            by_date
                .entry(date)
                .or_default()
                .insert(site.as_str(), percentage);
        }
    }

    Ok(by_date
        .into_iter()
        .filter_map(|(date, sites)| highest(&sites).map(|signal| (date, signal)))
        .collect())
}

fn highest(sites: &BTreeMap<&str, f64>) -> Option<WasteSignal> {
    let mut best: Option<(&str, f64)> = None;
    for (site, percentage) in sites {
        match best {
            Some((_, top)) if *percentage <= top => {}
            _ => best = Some((site, *percentage)),
        }
    }
    best.map(|(place, percentage)| WasteSignal {
        place: place.to_string(),
        place_en: slugify(place),
        percentage,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::test_support::table;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_week_expands_to_seven_dates() {
        let t = table(&[
            &["year_week", "place", "percentage"],
            &["2022-4", "Κουκουβάουνες", "0.69%"],
        ]);
        let signals = waste_signals(&t).unwrap();
        assert_eq!(signals.len(), 7);
        assert_eq!(signals.keys().next(), Some(&ymd(2022, 1, 24)));
        assert_eq!(signals.keys().last(), Some(&ymd(2022, 1, 30)));
        let s = &signals[&ymd(2022, 1, 26)];
        assert_eq!(s.place, "Κουκουβάουνες");
        assert_eq!(s.place_en, "koukouvaounes");
        assert_eq!(s.percentage, 0.69);
    }

    #[test]
    fn test_highest_site_wins_every_date() {
        let t = table(&[
            &["year_week", "place", "percentage"],
            &["2022-9", "Αθήνα", "12%"],
            &["2022-9", "Θεσσαλονίκη", "45%"],
        ]);
        let signals = waste_signals(&t).unwrap();
        assert_eq!(signals.len(), 7);
        for day in 0..7 {
            let date = ymd(2022, 2, 28) + chrono::Days::new(day);
            let s = &signals[&date];
            assert_eq!(s.place, "Θεσσαλονίκη");
            assert_eq!(s.percentage, 45.0);
        }
    }

    #[test]
    fn test_later_row_overwrites_same_site() {
        let t = table(&[
            &["year_week", "place", "percentage"],
            &["2022-9", "Αθήνα", "50%"],
            &["2022-9", "Πάτρα", "20%"],
            &["2022-9", "Αθήνα", "10%"],
        ]);
        let signals = waste_signals(&t).unwrap();
        assert_eq!(signals[&ymd(2022, 3, 1)].place, "Πάτρα");
        assert_eq!(signals[&ymd(2022, 3, 1)].percentage, 20.0);
    }

    #[test]
    fn test_tie_goes_to_first_site_by_name() {
        let t = table(&[
            &["year_week", "place", "percentage"],
            &["2022-9", "Zeta", "30%"],
            &["2022-9", "Alpha", "30%"],
        ]);
        let signals = waste_signals(&t).unwrap();
        assert_eq!(signals[&ymd(2022, 3, 1)].place, "Alpha");
    }

    #[test]
    fn test_overlapping_weeks() {
        let t = table(&[
            &["year_week", "place", "percentage"],
            &["2022-8", "Αθήνα", "5%"],
            &["2022-9", "Πάτρα", "7%"],
        ]);
        let signals = waste_signals(&t).unwrap();
        assert_eq!(signals.len(), 14);
        assert_eq!(signals[&ymd(2022, 2, 27)].place, "Αθήνα");
        assert_eq!(signals[&ymd(2022, 2, 28)].place, "Πάτρα");
    }

    #[test]
    fn test_bad_week_key() {
        let t = table(&[
            &["year_week", "place", "percentage"],
            &["2022-9", "Αθήνα", "5%"],
            &["2022", "Πάτρα", "7%"],
        ]);
        match waste_signals(&t).unwrap_err() {
            IngestError::InvalidWeekKey { line, key } => {
                assert_eq!(line, 3);
                assert_eq!(key, "2022");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_nonexistent_week() {
        let t = table(&[
            &["year_week", "place", "percentage"],
            &["2021-53", "Αθήνα", "5%"],
        ]);
        assert!(matches!(
            waste_signals(&t).unwrap_err(),
            IngestError::InvalidWeekKey { line: 2, .. }
        ));
    }

    #[test]
    fn test_short_row_is_malformed() {
        let t = table(&[&["year_week", "place", "percentage"], &["2022-9", "Αθήνα"]]);
        assert!(matches!(
            waste_signals(&t).unwrap_err(),
            IngestError::MalformedInput { line: 2, .. }
        ));
    }

    #[test]
    fn test_header_only() {
        let t = table(&[&["year_week", "place", "percentage"]]);
        assert!(waste_signals(&t).unwrap().is_empty());
    }
}
