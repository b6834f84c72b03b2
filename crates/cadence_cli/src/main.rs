//! Command-line entry point for the Cadence recurrence engine.
//!
//! # Responsibility
//! - Load configuration, initialize logging and open the store.
//! - Expose period lookup, batch generation and virtual projection.
//! - Print machine-readable JSON for every data-producing command.

use anyhow::{Context, Result};
use cadence_core::db::open_db;
use cadence_core::{
    init_from_config, load_config, period_end, period_key, CadenceConfig, Frequency,
    InstanceService, SqliteEventRepository, SqlitePatternRepository, VirtualEventService,
};
use chrono::{NaiveDate, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use log::info;
use rusqlite::Connection;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cadence")]
#[command(about = "Period-based recurring task engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Database file path (overrides config)
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the period key and period end containing a date
    PeriodKey {
        #[arg(long)]
        date: NaiveDate,
        #[arg(long)]
        frequency: Frequency,
    },
    /// Generate missing instances for every active pattern of a frequency
    Generate {
        #[arg(long)]
        frequency: Frequency,
        /// Reference date (defaults to today, UTC)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// List virtual events for unsatisfied periods in a date range
    Virtual {
        #[arg(long)]
        from: NaiveDate,
        #[arg(long)]
        to: NaiveDate,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = match cli.config.as_deref() {
        Some(path) => load_config(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => CadenceConfig::default(),
    };
    if let Some(db_path) = cli.db_path {
        config.database_path = db_path;
    }
    init_from_config(&config.logging).context("failed to initialize logging")?;

    match cli.command {
        Commands::PeriodKey { date, frequency } => {
            let key = period_key(date, frequency)?;
            let end = period_end(&key, frequency)?;
            println!(
                "{}",
                serde_json::json!({
                    "frequency": frequency,
                    "period_key": key,
                    "period_end": end,
                })
            );
        }
        Commands::Generate { frequency, date } => {
            let conn = open_store(&config)?;
            let service = InstanceService::new(
                SqlitePatternRepository::new(&conn),
                SqliteEventRepository::new(&conn),
                config.engine.clone(),
            );
            let reference_date = date.unwrap_or_else(|| Utc::now().date_naive());
            let report = service.generate_for_frequency_batch(frequency, reference_date)?;
            info!(
                "event=cli_generate module=cli status=ok frequency={frequency} created={} skipped={} failed={}",
                report.created.len(),
                report.skipped.len(),
                report.failures.len()
            );
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Virtual { from, to } => {
            let conn = open_store(&config)?;
            let service = VirtualEventService::new(
                SqlitePatternRepository::new(&conn),
                SqliteEventRepository::new(&conn),
                config.engine.clone(),
            );
            let start = from.and_time(NaiveTime::MIN).and_utc();
            let end = to
                .and_hms_opt(23, 59, 59)
                .context("invalid range end")?
                .and_utc();
            let events = service.virtual_events_in_range(start, end)?;
            println!("{}", serde_json::to_string_pretty(&events)?);
        }
    }
    Ok(())
}

fn open_store(config: &CadenceConfig) -> Result<Connection> {
    open_db(&config.database_path).with_context(|| {
        format!(
            "failed to open database {}",
            config.database_path.display()
        )
    })
}
