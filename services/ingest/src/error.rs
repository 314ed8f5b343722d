//! Error taxonomy for the transformation pipeline.

use crate::store::StoreError;

pub type Result<T, E = IngestError> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("malformed input at line {line}: {reason}")]
    MalformedInput { line: u64, reason: String },

    #[error("invalid date header '{value}' in column {column}")]
    InvalidDateHeader { column: usize, value: String },

    #[error("invalid year-week key '{key}' at line {line}")]
    InvalidWeekKey { line: usize, key: String },

    #[error("bad numeric value '{value}' for column '{column}' at line {line}")]
    BadNumericField {
        line: usize,
        column: String,
        value: String,
    },

    #[error("municipality '{name}' (slug '{slug}') not found in reference data")]
    UnknownMunicipality { name: String, slug: String },

    #[error("storage operation {op} failed for {key}")]
    Storage {
        op: &'static str,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("cannot read source {location}: {reason}")]
    Source { location: String, reason: String },

    #[error("ingestion cancelled")]
    Cancelled,

    #[error("{} ingestion job(s) failed: {}", .0.len(), describe_failures(.0))]
    Jobs(Vec<JobFailure>),
}

/// One failed dataset group of a combined run.
#[derive(Debug)]
pub struct JobFailure {
    pub job: &'static str,
    pub error: IngestError,
}

fn describe_failures(failures: &[JobFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("[{}] {}", f.job, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl IngestError {
    /// Wraps a storage failure with the operation and key that failed.
    ///
    /// A reference-data miss surfaces as `UnknownMunicipality` rather than a
    /// generic storage failure.
    pub fn storage(op: &'static str, key: impl Into<String>) -> impl FnOnce(StoreError) -> Self {
        let key = key.into();
        move |source| match source {
            StoreError::UnknownMunicipality { name, slug } => {
                IngestError::UnknownMunicipality { name, slug }
            }
            source => IngestError::Storage { op, key, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_maps_unknown_municipality() {
        let err = IngestError::storage("resolve_or_create_municipality", "Άγνωστο")(
            StoreError::UnknownMunicipality {
                name: "Άγνωστο".to_string(),
                slug: "agnosto".to_string(),
            },
        );
        assert!(matches!(err, IngestError::UnknownMunicipality { ref slug, .. } if slug == "agnosto"));
    }

    #[test]
    fn test_storage_wraps_other_errors() {
        let err = IngestError::storage("upsert_case", "county_1@2020-02-26")(
            StoreError::UnknownRegionalUnit("county_1".to_string()),
        );
        let msg = err.to_string();
        assert!(msg.contains("upsert_case"));
        assert!(msg.contains("county_1@2020-02-26"));
    }

    #[test]
    fn test_jobs_lists_every_failure() {
        let err = IngestError::Jobs(vec![
            JobFailure {
                job: "timeline",
                error: IngestError::InvalidWeekKey {
                    line: 3,
                    key: "2022".to_string(),
                },
            },
            JobFailure {
                job: "demographics",
                error: IngestError::Cancelled,
            },
        ]);
        let msg = err.to_string();
        assert!(msg.starts_with("2 ingestion job(s) failed"));
        assert!(msg.contains("[timeline] invalid year-week key '2022' at line 3"));
        assert!(msg.contains("[demographics] ingestion cancelled"));
    }
}
