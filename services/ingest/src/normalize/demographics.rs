use chrono::NaiveDate;

use crate::error::{IngestError, Result};
use crate::model::DemographicInfo;
use crate::tabular::Table;
use crate::values::strict_int;

const COLUMNS: usize = 12;

/// Strictly parsed demographic breakdowns.
///
/// Layout: `[_, date, category, cases, deaths, intensive, discharged,
/// hospitalized, hospitalized_in_icu, passed_away, recovered,
/// treated_at_home]`. Any bad cell fails the whole table with its line.
pub fn demographics(table: &Table) -> Result<Vec<DemographicInfo>> {
    table
        .iter()
        .enumerate()
        .skip(1)
        .map(|(index, row)| parse_row(super::line_of(index), row))
        .collect()
}

fn parse_row(line: usize, row: &[String]) -> Result<DemographicInfo> {
    if row.len() < COLUMNS {
        return Err(IngestError::MalformedInput {
            line: line as u64,
            reason: format!("expected {COLUMNS} columns, found {}", row.len()),
        });
    }
    let date = NaiveDate::parse_from_str(row[1].trim(), "%Y-%m-%d").map_err(|_| {
        IngestError::BadNumericField {
            line,
            column: "date".to_string(),
            value: row[1].clone(),
        }
    })?;
    let int = |column: usize, name: &str| strict_int(&row[column], line, name);

    Ok(DemographicInfo {
        date,
        category: row[2].clone(),
        cases: int(3, "cases")?,
        deaths: int(4, "deaths")?,
        intensive: int(5, "intensive")?,
        discharged: int(6, "discharged")?,
        hospitalized: int(7, "hospitalized")?,
        hospitalized_in_icu: int(8, "hospitalized_in_icu")?,
        passed_away: int(9, "passed_away")?,
        recovered: int(10, "recovered")?,
        treated_at_home: int(11, "treated_at_home")?,
    })
}
