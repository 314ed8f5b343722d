//! Cell value parsing.
//!
//! The wide-format legacy feeds (cases, timeline, deaths) default anything
//! unparseable to zero. The demographics feed is parsed strictly.

use crate::error::{IngestError, Result};

pub fn lenient_float(cell: &str) -> f64 {
    cell.trim().parse::<f64>().unwrap_or(0.0)
}

/// Parses as a decimal and truncates toward zero, so `"12.0"` is `12`.
pub fn lenient_int(cell: &str) -> i32 {
    let value = lenient_float(cell);
    if value.is_finite() {
        value.trunc() as i32
    } else {
        0
    }
}

pub fn strict_int(cell: &str, line: usize, column: &str) -> Result<i32> {
    cell.trim()
        .parse::<i32>()
        .map_err(|_| IngestError::BadNumericField {
            line,
            column: column.to_string(),
            value: cell.to_string(),
        })
}
