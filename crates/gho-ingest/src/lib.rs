//! GHO Ingest Library
//!
//! Incremental, resumable extraction of the WHO Global Health Observatory
//! life-expectancy indicator into SQLite.
//!
//! # Components
//!
//! - [`source`]: offset-paginated record stream over a [`PageFetcher`]
//! - [`client`]: [`GhoClient`], the HTTP implementation of [`PageFetcher`]
//! - [`transform`] / [`model`]: raw record to validated [`Observation`]
//! - [`checkpoint`]: crash-safe resume position
//! - [`sink`]: idempotent batch upserts
//! - [`ledger`]: one `etl_runs` row per run
//! - [`pipeline`]: the driver tying them together
//!
//! # Example
//!
//! ```no_run
//! use gho_ingest::{Config, GhoClient, PageSource, Pipeline};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let source = PageSource::new(GhoClient::new(&config.source)?, &config.source);
//!     let pipeline = Pipeline::new(source, config.pipeline.clone());
//!
//!     let report = pipeline
//!         .execute(&config.database.url, CancellationToken::new())
//!         .await?;
//!     println!("{} rows loaded", report.rows_loaded);
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod checkpoint;
pub mod client;
pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod model;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod transform;

pub use checkpoint::{Checkpoint, CheckpointStore};
pub use client::GhoClient;
pub use config::Config;
pub use error::{CheckpointError, FetchError, IngestError, Result, ValidationError};
pub use ledger::{RunLedger, RunRecord, RunStatus};
pub use model::{Observation, ObservationFields, Sex};
pub use pipeline::{Pipeline, RunReport};
pub use sink::{CommitSummary, UpsertSink};
pub use source::{PageFetcher, PageSource, RawRecord};
pub use transform::{transform, transform_value, Transformed};
