//! GHO Ingest - life expectancy extraction tool

use anyhow::Result;
use clap::{Parser, Subcommand};
use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Table};
use gho_common::logging::{init_logging, LogConfig, LogLevel};
use gho_ingest::{db, CheckpointStore, Config, GhoClient, PageSource, Pipeline, RunLedger};
use sqlx::Connection;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gho-ingest")]
#[command(author, version, about = "WHO GHO life expectancy ingestion tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, validate and load the indicator, resuming from the checkpoint
    Run {
        /// Delete the checkpoint and start from offset 0
        #[arg(long)]
        no_resume: bool,

        /// Stop after this many valid records
        #[arg(long)]
        max_rows: Option<u64>,

        /// Valid records committed per transaction
        #[arg(long)]
        batch_size: Option<usize>,

        /// Indicator code to extract
        #[arg(long)]
        indicator: Option<String>,
    },

    /// Show recent runs from the ledger
    Runs {
        /// Number of runs to show
        #[arg(short, long, default_value_t = 10)]
        limit: u32,
    },

    /// Show or clear the checkpoint
    Checkpoint {
        /// Delete the checkpoint file
        #[arg(long)]
        clear: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };

    // Environment variables take precedence over CLI defaults
    let log_config = LogConfig::builder()
        .level(log_level)
        .log_file_prefix("gho-ingest")
        .build()
        .merge_env()?;

    let _guard = init_logging(&log_config)?;

    let mut config = Config::load()?;

    match cli.command {
        Command::Run {
            no_resume,
            max_rows,
            batch_size,
            indicator,
        } => {
            config.pipeline.resume = !no_resume;
            if max_rows.is_some() {
                config.pipeline.max_rows = max_rows;
            }
            if let Some(batch_size) = batch_size {
                config.pipeline.batch_size = batch_size;
            }
            if let Some(indicator) = indicator {
                config.source.indicator = indicator;
            }
            config.validate()?;

            run(config).await
        },
        Command::Runs { limit } => show_runs(&config, limit).await,
        Command::Checkpoint { clear } => checkpoint(&config, clear),
    }
}

async fn run(config: Config) -> Result<()> {
    let client = GhoClient::new(&config.source)?;
    info!(url = client.indicator_url(), "Starting extraction");

    let source = PageSource::new(client, &config.source);
    let pipeline = Pipeline::new(source, config.pipeline.clone());

    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, finishing current step");
                signal_token.cancel();
            },
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });

    let report = pipeline.execute(&config.database.url, cancel).await?;

    println!(
        "Run {} {}: {} rows loaded, {} skipped, checkpoint offset {}",
        report.run_id, report.status, report.rows_loaded, report.rows_skipped, report.checkpoint.offset
    );
    Ok(())
}

async fn show_runs(config: &Config, limit: u32) -> Result<()> {
    let mut conn = db::connect(&config.database.url).await?;
    let runs = RunLedger::new().recent(&mut conn, limit).await;
    conn.close().await?;
    let runs = runs?;

    if runs.is_empty() {
        println!("No runs recorded");
        return Ok(());
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(vec!["Run", "Started", "Finished", "Loaded", "Skipped", "Status"]);

    for run in &runs {
        table.add_row(vec![
            run.id.clone(),
            run.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            run.finished_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "-".to_string()),
            run.rows_loaded.to_string(),
            run.rows_skipped.to_string(),
            run.status.clone().unwrap_or_else(|| "running".to_string()),
        ]);
    }

    println!("{}", table);
    Ok(())
}

fn checkpoint(config: &Config, clear: bool) -> Result<()> {
    let store = CheckpointStore::new(config.pipeline.checkpoint_path.clone());

    if clear {
        store.clear()?;
        println!("Checkpoint {} cleared", store.path().display());
        return Ok(());
    }

    let checkpoint = store.load()?;
    println!(
        "{}: offset {}, loaded rows {}",
        store.path().display(),
        checkpoint.offset,
        checkpoint.committed_count
    );
    Ok(())
}
