//! Idempotent batch writer for observations
//!
//! Rows are keyed by `(country_code, year, sex)`. Re-sending an identical
//! observation is a no-op: the existing row, including its `loaded_at`, is
//! left untouched. A row is only rewritten when `date_modified` or `value`
//! differs from what is stored.

use crate::error::Result;
use crate::model::Observation;
use chrono::Utc;
use sqlx::{Connection, SqliteConnection};
use tracing::debug;

const UPSERT_SQL: &str = r#"
    INSERT INTO life_expectancy
        (indicator_code, country_code, continent, year, sex,
         value, low_value, high_value, date_modified, loaded_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
    ON CONFLICT (country_code, year, sex) DO UPDATE SET
        value = excluded.value,
        low_value = excluded.low_value,
        high_value = excluded.high_value,
        date_modified = excluded.date_modified,
        loaded_at = excluded.loaded_at
    WHERE life_expectancy.date_modified IS NOT excluded.date_modified
       OR life_expectancy.value IS NOT excluded.value
"#;

/// Result of committing one batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Observations in the batch
    pub rows: u64,
    /// Rows actually inserted or rewritten
    pub changed: u64,
}

/// Writes batches of observations in single transactions
#[derive(Debug, Clone, Copy, Default)]
pub struct UpsertSink;

impl UpsertSink {
    pub fn new() -> Self {
        Self
    }

    /// Upsert `batch` atomically
    ///
    /// Either every observation in the batch is applied or, on error, none
    /// is. An empty batch does not touch the database.
    pub async fn commit(
        &self,
        conn: &mut SqliteConnection,
        batch: &[Observation],
    ) -> Result<CommitSummary> {
        if batch.is_empty() {
            return Ok(CommitSummary::default());
        }

        let loaded_at = Utc::now();
        let mut tx = conn.begin().await?;
        let mut changed = 0;

        for obs in batch {
            let result = sqlx::query(UPSERT_SQL)
                .bind(obs.indicator_code())
                .bind(obs.country_code())
                .bind(obs.continent())
                .bind(obs.year())
                .bind(obs.sex().map(|s| s.code()).unwrap_or(""))
                .bind(obs.value())
                .bind(obs.low())
                .bind(obs.high())
                .bind(obs.date_modified())
                .bind(loaded_at)
                .execute(&mut *tx)
                .await?;
            changed += result.rows_affected();
        }

        tx.commit().await?;

        let summary = CommitSummary {
            rows: batch.len() as u64,
            changed,
        };
        debug!(rows = summary.rows, changed = summary.changed, "Batch committed");
        Ok(summary)
    }
}
