//! External opportunity sources and the bundled local catalog.

use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use ohub_core::Opportunity;
use ohub_storage::FetchError;
use thiserror::Error;
use tracing::info;

pub mod raw;
pub mod search;

pub use raw::{external_id, ingest_raw_records, parse_date, RawRecord, DEFAULT_APPLICATION_DAYS};
pub use search::{SearchExtractConfig, SearchExtractSource, SearchHit};

pub const CRATE_NAME: &str = "ohub-adapters";

const LOCAL_CATALOG_JSON: &str = include_str!("../../../fixtures/local_catalog.json");

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("{0}")]
    Message(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

/// A supplier of loosely-typed records merged into the local catalog.
#[async_trait]
pub trait ExternalSource: Send + Sync {
    fn source_id(&self) -> &'static str;

    async fn fetch_raw_records(&self) -> Result<Vec<RawRecord>, AdapterError>;
}

/// Source used when no external supplier is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoExternalSource;

#[async_trait]
impl ExternalSource for NoExternalSource {
    fn source_id(&self) -> &'static str {
        "none"
    }

    async fn fetch_raw_records(&self) -> Result<Vec<RawRecord>, AdapterError> {
        Ok(Vec::new())
    }
}

/// Reads a JSON array of raw records from disk on every fetch.
#[derive(Debug, Clone)]
pub struct FixtureSource {
    path: PathBuf,
}

impl FixtureSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ExternalSource for FixtureSource {
    fn source_id(&self) -> &'static str {
        "fixture"
    }

    async fn fetch_raw_records(&self) -> Result<Vec<RawRecord>, AdapterError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("reading external fixture {}", self.path.display()))?;
        let records: Vec<RawRecord> = serde_json::from_slice(&bytes)
            .with_context(|| format!("parsing external fixture {}", self.path.display()))?;
        info!(path = %self.path.display(), records = records.len(), "loaded external fixture");
        Ok(records)
    }
}

/// The curated catalog compiled into the binary.
pub fn local_catalog() -> anyhow::Result<Vec<Opportunity>> {
    serde_json::from_str(LOCAL_CATALOG_JSON).context("parsing bundled local catalog")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_catalog_parses() {
        let catalog = local_catalog().expect("catalog");
        assert_eq!(catalog.len(), 8);
        assert_eq!(catalog[0].id, "gsoc-2025");
    }

    #[tokio::test]
    async fn no_external_source_is_empty() {
        assert!(NoExternalSource.fetch_raw_records().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fixture_source_reads_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("external.json");
        std::fs::write(
            &path,
            r#"[{"name":"Hack","officialLink":"https://hack.example.org"},{"name":""}]"#,
        )
        .unwrap();

        let records = FixtureSource::new(&path).fetch_raw_records().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].name.as_deref(), Some("Hack"));
        assert_eq!(records[1].name, None);
    }

    #[tokio::test]
    async fn missing_fixture_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = FixtureSource::new(dir.path().join("absent.json"))
            .fetch_raw_records()
            .await
            .unwrap_err();
        assert!(err.to_string().contains("reading external fixture"));
    }
}
