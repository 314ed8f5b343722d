//! Official municipality reference data (administrative code and census
//! populations), keyed by slug.

use std::collections::HashMap;
use std::path::Path;

use tracing::info;

use crate::model::ReferenceMunicipality;
use crate::store::StoreError;

/// Loaded once at start-up and consulted whenever a municipality is first
/// seen in the deaths feed.
#[derive(Debug, Clone, Default)]
pub struct MunicipalityReference {
    by_slug: HashMap<String, ReferenceMunicipality>,
}

impl MunicipalityReference {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Reference(format!("cannot read {}: {e}", path.display())))?;
        let reference = Self::parse(&content)?;
        info!(
            path = %path.display(),
            municipalities = reference.len(),
            "municipality reference data loaded"
        );
        Ok(reference)
    }

    /// Parses `[_, name, slug, code, pop_11, pop_21]` rows after a header.
    pub fn parse(content: &str) -> Result<Self, StoreError> {
        let content = content.strip_prefix('\u{feff}').unwrap_or(content);
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(content.as_bytes());

        let mut by_slug = HashMap::new();
        for (index, record) in reader.records().enumerate() {
            // header is line 1
            let line = index + 2;
            let record = record.map_err(|e| StoreError::Reference(format!("line {line}: {e}")))?;
            if record.len() < 6 {
                return Err(StoreError::Reference(format!(
                    "line {line}: expected 6 columns, found {}",
                    record.len()
                )));
            }
            let population = |column: usize| {
                record[column].trim().parse::<i32>().map_err(|_| {
                    StoreError::Reference(format!(
                        "line {line}: cannot convert '{}' to an integer",
                        &record[column]
                    ))
                })
            };
            let municipality = ReferenceMunicipality {
                name: record[1].to_string(),
                slug: record[2].to_string(),
                code: record[3].to_string(),
                pop_11: population(4)?,
                pop_21: population(5)?,
            };
            by_slug.insert(municipality.slug.clone(), municipality);
        }
        Ok(Self { by_slug })
    }

    pub fn get(&self, slug: &str) -> Option<&ReferenceMunicipality> {
        self.by_slug.get(slug)
    }

    pub fn len(&self) -> usize {
        self.by_slug.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slug.is_empty()
    }
}

impl FromIterator<ReferenceMunicipality> for MunicipalityReference {
    fn from_iter<I: IntoIterator<Item = ReferenceMunicipality>>(iter: I) -> Self {
        Self {
            by_slug: iter.into_iter().map(|m| (m.slug.clone(), m)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
id,name,slug,code,pop_11,pop_21
1,Λιλιπούπολης,lilipoupolis,9001,1200,1100
2,Κουκουβάουνες,koukouvaounes,9002,800,750
";

    #[test]
    fn test_parse_keys_by_slug() {
        let reference = MunicipalityReference::parse(CSV).unwrap();
        assert_eq!(reference.len(), 2);
        let m = reference.get("koukouvaounes").unwrap();
        assert_eq!(m.name, "Κουκουβάουνες");
        assert_eq!(m.code, "9002");
        assert_eq!(m.pop_11, 800);
        assert_eq!(m.pop_21, 750);
        assert!(reference.get("athina").is_none());
    }

    #[test]
    fn test_rejects_non_integer_population() {
        let csv = "id,name,slug,code,pop_11,pop_21\n1,A,a,1,1200,many\n";
        let err = MunicipalityReference::parse(csv).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("line 2"), "{msg}");
        assert!(msg.contains("many"), "{msg}");
    }

    #[test]
    fn test_rejects_short_rows() {
        let csv = "id,name,slug,code,pop_11,pop_21\n1,A,a\n";
        assert!(matches!(
            MunicipalityReference::parse(csv),
            Err(StoreError::Reference(_))
        ));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let err = MunicipalityReference::load("does/not/exist.csv")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does/not/exist.csv"));
    }
}
