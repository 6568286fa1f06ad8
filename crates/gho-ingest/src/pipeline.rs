//! Pipeline driver
//!
//! Runs one extraction: `INIT -> RUNNING -> {SUCCESS, INTERRUPTED, FAILED}`.
//!
//! The checkpoint on disk only ever points at data that is already
//! committed. Valid observations are buffered and committed in batches of
//! `batch_size`; after each commit the checkpoint offset advances by the
//! batch length plus the invalid records seen since the previous checkpoint.
//! Whatever happens afterwards, restarting from the saved offset reproduces
//! the same end state.

use crate::checkpoint::{Checkpoint, CheckpointStore};
use crate::config::PipelineConfig;
use crate::db;
use crate::error::{IngestError, Result};
use crate::ledger::{RunLedger, RunStatus};
use crate::model::Observation;
use crate::sink::UpsertSink;
use crate::source::{PageFetcher, PageSource};
use crate::transform::{transform_value, Transformed};
use futures::StreamExt;
use serde::Serialize;
use sqlx::{Connection, SqliteConnection};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Summary of a finished run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Observations committed during this run
    pub rows_loaded: u64,
    /// Invalid records covered by this run's checkpoints
    pub rows_skipped: u64,
    /// Checkpoint left on disk
    pub checkpoint: Checkpoint,
}

/// Mutable bookkeeping for one run
#[derive(Debug)]
struct RunState {
    checkpoint: Checkpoint,
    buffer: Vec<Observation>,
    skipped_since_checkpoint: u64,
    rows_loaded: u64,
    rows_skipped: u64,
    accepted: u64,
}

impl RunState {
    fn new(checkpoint: Checkpoint, batch_size: usize) -> Self {
        Self {
            checkpoint,
            buffer: Vec::with_capacity(batch_size),
            skipped_since_checkpoint: 0,
            rows_loaded: 0,
            rows_skipped: 0,
            accepted: 0,
        }
    }

    fn ceiling_reached(&self, max_rows: Option<u64>) -> bool {
        max_rows.is_some_and(|max| self.accepted >= max)
    }

    fn has_pending(&self) -> bool {
        !self.buffer.is_empty() || self.skipped_since_checkpoint > 0
    }
}

/// Incremental extraction driver
pub struct Pipeline<F> {
    source: PageSource<F>,
    checkpoints: CheckpointStore,
    sink: UpsertSink,
    ledger: RunLedger,
    config: PipelineConfig,
}

impl<F: PageFetcher> Pipeline<F> {
    pub fn new(source: PageSource<F>, config: PipelineConfig) -> Self {
        Self {
            source,
            checkpoints: CheckpointStore::new(config.checkpoint_path.clone()),
            sink: UpsertSink::new(),
            ledger: RunLedger::new(),
            config,
        }
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn source(&self) -> &PageSource<F> {
        &self.source
    }

    /// Connect to `database_url`, run once and close the connection
    ///
    /// The connection is closed on every exit path, including failures.
    pub async fn execute(&self, database_url: &str, cancel: CancellationToken) -> Result<RunReport> {
        let mut conn = db::connect(database_url).await?;

        let result = self.run(&mut conn, cancel).await;

        if let Err(e) = conn.close().await {
            warn!(error = %e, "Failed to close database connection");
        }

        result
    }

    /// Run once on an already migrated connection
    ///
    /// Cancellation is not an error: the report carries
    /// [`RunStatus::Interrupted`]. Any other failure is returned after the
    /// checkpoint and ledger entry have been written.
    pub async fn run(
        &self,
        conn: &mut SqliteConnection,
        cancel: CancellationToken,
    ) -> Result<RunReport> {
        if !self.config.resume {
            info!(path = %self.checkpoints.path().display(), "Fresh start requested, clearing checkpoint");
            self.checkpoints.clear()?;
        }

        let checkpoint = self.checkpoints.load()?;
        self.checkpoints.save(&checkpoint)?;
        let run_id = self.ledger.start(conn).await?;

        info!(
            %run_id,
            offset = checkpoint.offset,
            loaded_rows = checkpoint.committed_count,
            batch_size = self.config.batch_size,
            max_rows = ?self.config.max_rows,
            "Run started"
        );

        let mut state = RunState::new(checkpoint, self.config.batch_size);
        let outcome = match self.drive(conn, &mut state, &cancel).await {
            Ok(status) => self
                .checkpoints
                .save(&state.checkpoint)
                .map(|_| status)
                .map_err(IngestError::from),
            Err(err) => {
                if let Err(save_err) = self.checkpoints.save(&state.checkpoint) {
                    warn!(error = %save_err, "Failed to save checkpoint after run failure");
                }
                Err(err)
            },
        };

        match outcome {
            Ok(status) => {
                self.ledger
                    .finish(conn, run_id, state.rows_loaded, state.rows_skipped, &status)
                    .await?;

                info!(
                    %run_id,
                    %status,
                    rows_loaded = state.rows_loaded,
                    rows_skipped = state.rows_skipped,
                    offset = state.checkpoint.offset,
                    "Run finished"
                );

                Ok(RunReport {
                    run_id,
                    status,
                    rows_loaded: state.rows_loaded,
                    rows_skipped: state.rows_skipped,
                    checkpoint: state.checkpoint,
                })
            },
            Err(err) => {
                let status = RunStatus::error(err.to_string());
                if let Err(ledger_err) = self
                    .ledger
                    .finish(conn, run_id, state.rows_loaded, state.rows_skipped, &status)
                    .await
                {
                    error!(%run_id, error = %ledger_err, "Failed to record run failure");
                }

                error!(
                    %run_id,
                    error = %err,
                    offset = state.checkpoint.offset,
                    "Run failed"
                );
                Err(err)
            },
        }
    }

    async fn drive(
        &self,
        conn: &mut SqliteConnection,
        state: &mut RunState,
        cancel: &CancellationToken,
    ) -> Result<RunStatus> {
        let stream = self.source.produce(state.checkpoint.offset);
        tokio::pin!(stream);

        loop {
            if state.ceiling_reached(self.config.max_rows) {
                info!(accepted = state.accepted, "Row ceiling reached, stopping intake");
                break;
            }

            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(
                        discarded = state.buffer.len(),
                        offset = state.checkpoint.offset,
                        "Cancellation requested, keeping last committed checkpoint"
                    );
                    return Ok(RunStatus::Interrupted);
                }
                next = stream.next() => next,
            };

            let Some(raw) = next.transpose()? else {
                debug!("Source exhausted");
                break;
            };

            match transform_value(&raw) {
                Transformed::Valid(obs) => {
                    state.buffer.push(obs);
                    state.accepted += 1;
                },
                Transformed::Invalid(err) => {
                    state.skipped_since_checkpoint += 1;
                    debug!(
                        country = %raw.get("SpatialDim").unwrap_or(&serde_json::Value::Null),
                        error = %err,
                        "Skipping invalid record"
                    );
                },
            }

            if state.buffer.len() >= self.config.batch_size {
                self.flush(conn, state).await?;
            }
        }

        self.flush(conn, state).await?;
        Ok(RunStatus::Success)
    }

    /// Commit the buffer and advance the checkpoint past it
    async fn flush(&self, conn: &mut SqliteConnection, state: &mut RunState) -> Result<()> {
        if !state.has_pending() {
            return Ok(());
        }

        let summary = self.sink.commit(conn, &state.buffer).await?;
        let skipped = state.skipped_since_checkpoint;

        let next = state.checkpoint.advance(summary.rows, skipped);
        self.checkpoints.save(&next)?;

        state.checkpoint = next;
        state.rows_loaded += summary.rows;
        state.rows_skipped += skipped;
        state.skipped_since_checkpoint = 0;
        state.buffer.clear();

        info!(
            committed = summary.rows,
            changed = summary.changed,
            skipped,
            offset = next.offset,
            loaded_rows = next.committed_count,
            "Batch committed"
        );
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_ceiling() {
        let mut state = RunState::new(Checkpoint::default(), 4);
        assert!(!state.ceiling_reached(None));
        assert!(!state.ceiling_reached(Some(2)));

        state.accepted = 2;
        assert!(state.ceiling_reached(Some(2)));
        assert!(!state.ceiling_reached(None));
    }

    #[test]
    fn test_pending_includes_skipped_only_batches() {
        let mut state = RunState::new(Checkpoint::default(), 4);
        assert!(!state.has_pending());

        state.skipped_since_checkpoint = 1;
        assert!(state.has_pending());
    }
}
