//! Decodes `month/day/year` column headers into calendar dates.
//!
//! Upstream headers drop zero padding (`2/5/22`), so each component is
//! padded to two digits before parsing with a fixed `%m/%d/%y` pattern.

use chrono::NaiveDate;

use crate::error::{IngestError, Result};

const HEADER_DATE_FORMAT: &str = "%m/%d/%y";

/// Decode a single header cell.
///
/// `column` is only used for error context.
pub fn decode_header_date(column: usize, cell: &str) -> Result<NaiveDate> {
    let padded = cell
        .trim()
        .split('/')
        .map(|part| {
            if part.len() == 1 {
                format!("0{}", part)
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("/");

    NaiveDate::parse_from_str(&padded, HEADER_DATE_FORMAT).map_err(|_| {
        IngestError::InvalidDateHeader {
            column,
            value: cell.to_string(),
        }
    })
}

/// Decode every header cell from `offset` onwards.
///
/// A partial mapping would shift every later column, so the first bad cell
/// fails the whole row.
pub fn decode_header_row(header: &[String], offset: usize) -> Result<Vec<NaiveDate>> {
    header
        .iter()
        .enumerate()
        .skip(offset)
        .map(|(column, cell)| decode_header_date(column, cell))
        .collect()
}
