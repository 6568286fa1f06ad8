//! Run ledger
//!
//! Every run gets a row in `etl_runs`, inserted when the run starts and
//! finished exactly once with its counters and outcome.

use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqliteConnection;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};
use uuid::Uuid;

/// Outcome of a finished run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Success,
    Interrupted,
    Error(String),
}

impl RunStatus {
    pub fn error(message: impl Into<String>) -> Self {
        RunStatus::Error(message.into())
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => f.write_str("success"),
            RunStatus::Interrupted => f.write_str("interrupted"),
            RunStatus::Error(message) => write!(f, "error: {}", message),
        }
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "success" => Ok(RunStatus::Success),
            "interrupted" => Ok(RunStatus::Interrupted),
            other => other
                .strip_prefix("error:")
                .map(|message| RunStatus::Error(message.trim_start().to_string()))
                .ok_or_else(|| format!("unknown run status '{}'", other)),
        }
    }
}

/// One row of `etl_runs`
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct RunRecord {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub rows_loaded: i64,
    pub rows_skipped: i64,
    pub status: Option<String>,
}

impl RunRecord {
    /// Parsed status; `None` while the run is still open
    pub fn run_status(&self) -> Option<RunStatus> {
        self.status.as_deref().and_then(|s| s.parse().ok())
    }
}

/// Records run lifecycles in the database
#[derive(Debug, Clone, Copy, Default)]
pub struct RunLedger;

impl RunLedger {
    pub fn new() -> Self {
        Self
    }

    /// Insert an open row for a new run and return its id
    pub async fn start(&self, conn: &mut SqliteConnection) -> Result<Uuid> {
        let id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO etl_runs (id, started_at, rows_loaded, rows_skipped)
            VALUES (?1, ?2, 0, 0)
            "#,
        )
        .bind(id.to_string())
        .bind(Utc::now())
        .execute(conn)
        .await?;

        debug!(run_id = %id, "Run started");
        Ok(id)
    }

    /// Close the run row
    ///
    /// Returns `false` when the run was unknown or already finished; its
    /// recorded outcome is never overwritten.
    pub async fn finish(
        &self,
        conn: &mut SqliteConnection,
        id: Uuid,
        rows_loaded: u64,
        rows_skipped: u64,
        status: &RunStatus,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE etl_runs
            SET finished_at = ?2, rows_loaded = ?3, rows_skipped = ?4, status = ?5
            WHERE id = ?1 AND finished_at IS NULL
            "#,
        )
        .bind(id.to_string())
        .bind(Utc::now())
        .bind(rows_loaded as i64)
        .bind(rows_skipped as i64)
        .bind(status.to_string())
        .execute(conn)
        .await?;

        let finished = result.rows_affected() > 0;
        if finished {
            debug!(run_id = %id, %status, rows_loaded, rows_skipped, "Run finished");
        } else {
            warn!(run_id = %id, "Run already finished or unknown, ledger left unchanged");
        }
        Ok(finished)
    }

    /// Look up a single run
    pub async fn get(&self, conn: &mut SqliteConnection, id: Uuid) -> Result<Option<RunRecord>> {
        let record = sqlx::query_as::<_, RunRecord>(
            r#"
            SELECT id, started_at, finished_at, rows_loaded, rows_skipped, status
            FROM etl_runs WHERE id = ?1
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(conn)
        .await?;

        Ok(record)
    }

    /// Most recent runs first
    pub async fn recent(&self, conn: &mut SqliteConnection, limit: u32) -> Result<Vec<RunRecord>> {
        let records = sqlx::query_as::<_, RunRecord>(
            r#"
            SELECT id, started_at, finished_at, rows_loaded, rows_skipped, status
            FROM etl_runs
            ORDER BY started_at DESC, rowid DESC
            LIMIT ?1
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(conn)
        .await?;

        Ok(records)
    }
}
