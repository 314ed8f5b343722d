use crate::error::{IngestError, Result};
use crate::model::MunicipalityDeaths;
use crate::tabular::Table;
use crate::values::lenient_int;

/// Yearly deaths per municipality from a `[name, deaths_covid_<year>, ...]`
/// table. Municipality ids are resolved later, at write time.
pub fn yearly_deaths(table: &Table) -> Result<Vec<MunicipalityDeaths>> {
    let Some(header) = table.first() else {
        return Ok(Vec::new());
    };
    let years = header
        .iter()
        .skip(1)
        .map(|cell| header_year(cell))
        .collect::<Result<Vec<_>>>()?;

    Ok(table
        .iter()
        .skip(1)
        .filter_map(|row| {
            let (name, counts) = row.split_first()?;
            let yearly = years
                .iter()
                .zip(counts)
                .map(|(year, count)| (*year, lenient_int(count)))
                .collect();
            Some(MunicipalityDeaths {
                municipality: name.clone(),
                yearly,
            })
        })
        .collect())
}

fn header_year(cell: &str) -> Result<i32> {
    let segment = cell.rsplit('_').next().unwrap_or(cell).trim();
    segment
        .parse::<i32>()
        .map_err(|_| IngestError::BadNumericField {
            line: 1,
            column: cell.to_string(),
            value: segment.to_string(),
        })
}
