//! Built-in snapshot sources used by the daemon binary.
//!
//! - [`JsonFileSource`] re-reads a JSON array of records from disk on each
//!   fetch, so an external job can refresh the file independently.
//! - [`StaticSource`] always returns the same snapshot.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use rigpig_core::{AlgoStat, CurrencyRate, DomainResult};

use crate::producer::{SnapshotSource, SourceError};

/// A record that can be loaded from a snapshot file.
pub trait Record: DeserializeOwned + Clone + Send + Sync + 'static {
    fn validate(&self) -> DomainResult<()>;
}

impl Record for AlgoStat {
    fn validate(&self) -> DomainResult<()> {
        AlgoStat::validate(self)
    }
}

impl Record for CurrencyRate {
    fn validate(&self) -> DomainResult<()> {
        CurrencyRate::validate(self)
    }
}

/// Reads a JSON array of records from a file.
pub struct JsonFileSource<T> {
    path: PathBuf,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> JsonFileSource<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _record: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl<T: Record> SnapshotSource<T> for JsonFileSource<T> {
    async fn fetch(&self) -> Result<Vec<T>, SourceError> {
        let display = self.path.display().to_string();

        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|source| SourceError::Read {
                path: display.clone(),
                source,
            })?;

        let records: Vec<T> =
            serde_json::from_slice(&bytes).map_err(|source| SourceError::Parse {
                path: display,
                source,
            })?;

        for (index, record) in records.iter().enumerate() {
            record
                .validate()
                .map_err(|source| SourceError::Invalid { index, source })?;
        }

        Ok(records)
    }
}

/// Returns a fixed snapshot on every fetch.
pub struct StaticSource<T> {
    snapshot: Vec<T>,
}

impl<T> StaticSource<T> {
    pub fn new(snapshot: Vec<T>) -> Self {
        Self { snapshot }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> SnapshotSource<T> for StaticSource<T> {
    async fn fetch(&self) -> Result<Vec<T>, SourceError> {
        Ok(self.snapshot.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[tokio::test]
    async fn test_reads_currency_rates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rates.json");
        fs::write(&path, r#"[{"code":"usd","rate":1.0},{"code":"EUR","rate":0.92}]"#).unwrap();

        let source: JsonFileSource<CurrencyRate> = JsonFileSource::new(&path);
        let rates = source.fetch().await.unwrap();

        assert_eq!(
            rates,
            vec![CurrencyRate::new("USD", 1.0), CurrencyRate::new("EUR", 0.92)]
        );
    }

    #[tokio::test]
    async fn test_rereads_file_each_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("algos.json");
        fs::write(&path, r#"[{"algorithm":"ethash","coin":"ETC","profitability":1.0}]"#).unwrap();

        let source: JsonFileSource<AlgoStat> = JsonFileSource::new(&path);
        assert_eq!(source.fetch().await.unwrap().len(), 1);

        fs::write(&path, "[]").unwrap();
        assert!(source.fetch().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_read_error() {
        let dir = tempfile::tempdir().unwrap();
        let source: JsonFileSource<AlgoStat> = JsonFileSource::new(dir.path().join("nope.json"));
        assert!(matches!(source.fetch().await, Err(SourceError::Read { .. })));
    }

    #[tokio::test]
    async fn test_malformed_json_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rates.json");
        fs::write(&path, "{not json").unwrap();

        let source: JsonFileSource<CurrencyRate> = JsonFileSource::new(&path);
        assert!(matches!(source.fetch().await, Err(SourceError::Parse { .. })));
    }

    #[tokio::test]
    async fn test_invalid_record_reports_index() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rates.json");
        fs::write(&path, r#"[{"code":"USD","rate":1.0},{"code":"EUR","rate":-3.0}]"#).unwrap();

        let source: JsonFileSource<CurrencyRate> = JsonFileSource::new(&path);
        match source.fetch().await {
            Err(SourceError::Invalid { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected invalid record error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_blank_currency_code_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rates.json");
        fs::write(&path, r#"[{"code":"   ","rate":1.0}]"#).unwrap();

        let source: JsonFileSource<CurrencyRate> = JsonFileSource::new(&path);
        match source.fetch().await {
            Err(SourceError::Invalid { index, .. }) => assert_eq!(index, 0),
            other => panic!("expected invalid record error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_static_source() {
        let source = StaticSource::new(vec![CurrencyRate::new("USD", 1.0)]);
        assert_eq!(source.fetch().await.unwrap(), vec![CurrencyRate::new("USD", 1.0)]);
        assert_eq!(source.fetch().await.unwrap().len(), 1);
    }
}
