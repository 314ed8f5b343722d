use tracing::warn;

use crate::model::RegionalUnit;
use crate::slug::slugify;
use crate::tabular::Table;
use crate::values::lenient_int;

const DEPARTMENT: usize = 0;
const PREFECTURE: usize = 1;
const NORMALIZED_NAME: usize = 2;
const DISPLAY_NAME: usize = 3;
const POPULATION_2011: usize = 4;

/// One regional unit per data row of the cases table.
///
/// Only the five leading columns are read; the date columns are left to
/// [`cases`](super::cases).
pub fn regional_units(table: &Table) -> Vec<RegionalUnit> {
    table
        .iter()
        .enumerate()
        .skip(1)
        .filter_map(|(index, row)| {
            if row.len() <= POPULATION_2011 {
                warn!(line = super::line_of(index), "skipping short regional unit row");
                return None;
            }
            Some(RegionalUnit {
                id: 0,
                slug: slugify(&row[NORMALIZED_NAME]),
                department: row[DEPARTMENT].clone(),
                prefecture: row[PREFECTURE].clone(),
                regional_unit_normalized: row[NORMALIZED_NAME].clone(),
                regional_unit: row[DISPLAY_NAME].clone(),
                pop_11: lenient_int(&row[POPULATION_2011]),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::test_support::table;

    #[test]
    fn test_one_unit_per_data_row() {
        let t = table(&[
            &["department", "prefecture", "county_normalized", "county", "pop_11", "2/26/20"],
            &["Department_1", "Prefecture_1", "County_1", "county_one", "10000", "1"],
            &["Department_2", "Prefecture_2", "ΑΙΤΩΛΟΑΚΑΡΝΑΝΙΑΣ", "Αιτωλοακαρνανίας", "210802", "2"],
        ]);
        let units = regional_units(&t);
        assert_eq!(units.len(), 2);
        assert_eq!(
            units[0],
            RegionalUnit {
                id: 0,
                slug: "county_1".to_string(),
                department: "Department_1".to_string(),
                prefecture: "Prefecture_1".to_string(),
                regional_unit_normalized: "County_1".to_string(),
                regional_unit: "county_one".to_string(),
                pop_11: 10000,
            }
        );
        assert_eq!(units[1].slug, "aitoloakarnanias");
        assert_eq!(units[1].regional_unit_normalized, "ΑΙΤΩΛΟΑΚΑΡΝΑΝΙΑΣ");
    }

    #[test]
    fn test_unparseable_population_is_zero() {
        let t = table(&[
            &["d", "p", "n", "r", "pop", "2/26/20"],
            &["D", "P", "Name", "name", "-", "0"],
        ]);
        assert_eq!(regional_units(&t)[0].pop_11, 0);
    }

    #[test]
    fn test_header_only_table() {
        let t = table(&[&["d", "p", "n", "r", "pop"]]);
        assert!(regional_units(&t).is_empty());
        assert!(regional_units(&Vec::new()).is_empty());
    }
}
