//! Record normalizers: parsed tables in, domain records out.
//!
//! Everything here is pure. Each normalizer reads one whole table and either
//! returns every record it describes or fails, so callers never write a
//! partial file.

mod cases;
mod deaths;
mod demographics;
mod regional_units;
mod timeline;
mod wastewater;

pub use cases::{cases, WeeklyCadence};
pub use deaths::yearly_deaths;
pub use demographics::demographics;
pub use regional_units::regional_units;
pub use timeline::TimelineAccumulator;
pub use wastewater::waste_signals;

/// 1-based source line of a table row, counting the header as line 1.
pub(crate) fn line_of(row_index: usize) -> usize {
    row_index + 1
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::tabular::Table;

    /// Builds a table from string literals.
    pub fn table(rows: &[&[&str]]) -> Table {
        rows.iter()
            .map(|row| row.iter().map(|cell| cell.to_string()).collect())
            .collect()
    }
}
