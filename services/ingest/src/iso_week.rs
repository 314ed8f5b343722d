//! ISO-8601 week expansion for the wastewater feed.
//!
//! Weeks start on Monday and week 1 is the week holding the year's first
//! Thursday, so week 1 may begin in December and week 52/53 may end in
//! January of the next calendar year.

use chrono::{Days, NaiveDate, Weekday};

use crate::error::{IngestError, Result};

/// The seven dates (Monday through Sunday) of ISO week `week` of `year`.
///
/// Weeks that do not exist in that ISO year (0, 54, or 53 in a 52-week
/// year) are rejected. `line` and `key` only feed the error.
pub fn week_dates(year: i32, week: u32, line: usize, key: &str) -> Result<[NaiveDate; 7]> {
    let invalid = || IngestError::InvalidWeekKey {
        line,
        key: key.to_string(),
    };

    let monday = NaiveDate::from_isoywd_opt(year, week, Weekday::Mon).ok_or_else(invalid)?;

    let mut dates = [monday; 7];
    for (offset, date) in dates.iter_mut().enumerate().skip(1) {
        *date = monday
            .checked_add_days(Days::new(offset as u64))
            .ok_or_else(invalid)?;
    }
    Ok(dates)
}

/// Split a `year-week` key such as `2022-04` into its two integers.
pub fn parse_week_key(key: &str, line: usize) -> Result<(i32, u32)> {
    let invalid = || IngestError::InvalidWeekKey {
        line,
        key: key.to_string(),
    };

    let parts: Vec<&str> = key.trim().split('-').collect();
    if parts.len() != 2 {
        return Err(invalid());
    }
    let year = parts[0].trim().parse::<i32>().map_err(|_| invalid())?;
    let week = parts[1].trim().parse::<u32>().map_err(|_| invalid())?;
    Ok((year, week))
}
