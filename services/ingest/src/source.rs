//! Source feeds: the five CSV documents the pipeline reads, by URL or path.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::error::{IngestError, Result};
use crate::tabular::{parse_table, Table};

const USER_AGENT: &str = "covid19-greece-ingest/0.1 (+https://github.com/iMEdD-Lab/open-data)";
const FETCH_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    Path(PathBuf),
    Url(String),
}

impl SourceLocation {
    /// `http://` and `https://` locations are fetched; anything else is a
    /// local path.
    pub fn parse(location: &str) -> Self {
        let location = location.trim();
        if location.starts_with("http://") || location.starts_with("https://") {
            SourceLocation::Url(location.to_string())
        } else {
            SourceLocation::Path(PathBuf::from(location))
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceLocation::Path(path) => write!(f, "{}", path.display()),
            SourceLocation::Url(url) => f.write_str(url),
        }
    }
}

/// Where each dataset is read from.
#[derive(Debug, Clone)]
pub struct Sources {
    pub cases: SourceLocation,
    pub timeline: SourceLocation,
    pub deaths: SourceLocation,
    pub demographics: SourceLocation,
    pub waste: SourceLocation,
}

/// Reads source documents over HTTP or from disk.
#[derive(Debug, Clone)]
pub struct SourceReader {
    client: reqwest::Client,
    rate_limit: Duration,
}

impl SourceReader {
    /// `rate_limit` is waited before every HTTP request.
    pub fn new(rate_limit: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| IngestError::Source {
                location: "http client".to_string(),
                reason: e.to_string(),
            })?;
        Ok(Self { client, rate_limit })
    }

    pub async fn read(&self, location: &SourceLocation) -> Result<String> {
        let source_err = |reason: String| IngestError::Source {
            location: location.to_string(),
            reason,
        };

        let bytes = match location {
            SourceLocation::Path(path) => tokio::fs::read(path)
                .await
                .map_err(|e| source_err(e.to_string()))?,
            SourceLocation::Url(url) => {
                if !self.rate_limit.is_zero() {
                    debug!(wait_ms = self.rate_limit.as_millis() as u64, "rate limit");
                    sleep(self.rate_limit).await;
                }
                self.client
                    .get(url)
                    .send()
                    .await
                    .and_then(|resp| resp.error_for_status())
                    .map_err(|e| source_err(e.to_string()))?
                    .bytes()
                    .await
                    .map_err(|e| source_err(e.to_string()))?
                    .to_vec()
            }
        };

        info!(
            source = %location,
            size_bytes = bytes.len(),
            content_hash = %content_hash(&bytes),
            "source fetched"
        );

        String::from_utf8(bytes).map_err(|e| source_err(format!("not valid UTF-8: {e}")))
    }

    /// Reads and parses a source into a [`Table`].
    pub async fn read_table(&self, location: &SourceLocation) -> Result<Table> {
        let content = self.read(location).await?;
        parse_table(&content)
    }
}

/// `sha256:<hex>` digest recorded for each fetched document.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_parse() {
        assert_eq!(
            SourceLocation::parse("https://example.org/a.csv"),
            SourceLocation::Url("https://example.org/a.csv".to_string())
        );
        assert_eq!(
            SourceLocation::parse("data/cases.csv"),
            SourceLocation::Path(PathBuf::from("data/cases.csv"))
        );
        assert_eq!(
            SourceLocation::parse("ftp://example.org/a.csv"),
            SourceLocation::Path(PathBuf::from("ftp://example.org/a.csv"))
        );
    }

    #[test]
    fn test_content_hash() {
        assert_eq!(
            content_hash(b"abc"),
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[tokio::test]
    async fn test_read_table_from_file() {
        let reader = SourceReader::new(Duration::ZERO).unwrap();
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/demographics.csv");
        let table = reader
            .read_table(&SourceLocation::parse(path))
            .await
            .unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table[1][2], "0-17");
    }

    #[tokio::test]
    async fn test_missing_file_is_source_error() {
        let reader = SourceReader::new(Duration::ZERO).unwrap();
        let err = reader
            .read(&SourceLocation::parse("no/such/file.csv"))
            .await
            .unwrap_err();
        match err {
            IngestError::Source { location, .. } => assert_eq!(location, "no/such/file.csv"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
