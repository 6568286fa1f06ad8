//! Shared fixtures for pipeline tests

#![allow(dead_code)]

use async_trait::async_trait;
use gho_ingest::config::PipelineConfig;
use gho_ingest::{db, FetchError, PageFetcher, PageSource, Pipeline, RawRecord};
use reqwest::StatusCode;
use serde_json::{json, Value};
use sqlx::{Row, SqliteConnection};
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// In-memory page server with failure and cancellation hooks
#[derive(Default)]
pub struct FakeFetcher {
    records: Vec<Value>,
    fail_at: Option<u64>,
    cancel_at: Option<(u64, CancellationToken)>,
    calls: Mutex<Vec<u64>>,
}

impl FakeFetcher {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self::from_values(
            records
                .iter()
                .map(|r| serde_json::to_value(r).unwrap())
                .collect(),
        )
    }

    /// Serve page elements exactly as given, well-formed or not
    pub fn from_values(records: Vec<Value>) -> Self {
        Self {
            records,
            ..Self::default()
        }
    }

    /// Fail the request for the page starting at `offset` with HTTP 503
    pub fn fail_at(mut self, offset: u64) -> Self {
        self.fail_at = Some(offset);
        self
    }

    /// Cancel `token` while serving the page starting at `offset`
    pub fn cancel_at(mut self, offset: u64, token: CancellationToken) -> Self {
        self.cancel_at = Some((offset, token));
        self
    }

    pub fn calls(&self) -> Vec<u64> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageFetcher for FakeFetcher {
    async fn fetch_page(&self, offset: u64, limit: u64) -> Result<Vec<Value>, FetchError> {
        self.calls.lock().unwrap().push(offset);

        if self.fail_at == Some(offset) {
            return Err(FetchError::Status {
                offset,
                status: StatusCode::SERVICE_UNAVAILABLE,
            });
        }

        if let Some((at, token)) = &self.cancel_at {
            if *at == offset {
                token.cancel();
            }
        }

        let start = (offset as usize).min(self.records.len());
        let end = (start + limit as usize).min(self.records.len());
        Ok(self.records[start..end].to_vec())
    }
}

/// Three-letter country code unique per index
pub fn country(i: usize) -> String {
    let letter = |n: usize| char::from(b'A' + (n % 26) as u8);
    [letter(i / 676), letter(i / 26), letter(i)].iter().collect()
}

pub fn valid_record(i: usize) -> RawRecord {
    serde_json::from_value(json!({
        "IndicatorCode": "WHOSIS_000001",
        "SpatialDim": country(i),
        "ParentLocation": "Africa",
        "TimeDim": 2020,
        "Dim1": "SEX_BTSX",
        "NumericValue": 50.0 + (i % 40) as f64,
        "Date": "2023-01-15T00:00:00Z"
    }))
    .unwrap()
}

pub fn invalid_record(i: usize) -> RawRecord {
    RawRecord {
        spatial_dim: Some(format!("X{}", i)),
        ..valid_record(i)
    }
}

pub fn valid_records(n: usize) -> Vec<RawRecord> {
    (0..n).map(valid_record).collect()
}

pub fn pipeline_config(checkpoint: &Path, batch_size: usize) -> PipelineConfig {
    PipelineConfig {
        batch_size,
        checkpoint_path: checkpoint.to_path_buf(),
        max_rows: None,
        resume: true,
    }
}

pub fn pipeline(
    fetcher: FakeFetcher,
    page_size: u64,
    config: PipelineConfig,
) -> Pipeline<FakeFetcher> {
    Pipeline::new(
        PageSource::with_paging(fetcher, page_size, Duration::ZERO),
        config,
    )
}

pub async fn memory_db() -> SqliteConnection {
    db::connect("sqlite::memory:").await.unwrap()
}

pub async fn stored_rows(conn: &mut SqliteConnection) -> Vec<(String, i64, String, Option<f64>)> {
    sqlx::query(
        "SELECT country_code, year, sex, value FROM life_expectancy \
         ORDER BY country_code, year, sex",
    )
    .fetch_all(conn)
    .await
    .unwrap()
    .iter()
    .map(|row| {
        (
            row.get("country_code"),
            row.get("year"),
            row.get("sex"),
            row.get("value"),
        )
    })
    .collect()
}
