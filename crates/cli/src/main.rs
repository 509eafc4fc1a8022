use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use ledgermend_core::ReconSettings;

mod commands;

#[derive(Parser)]
#[command(
    name = "ledgermend",
    about = "Reconciliation and cleanup toolkit for charter bookkeeping.",
    version
)]
pub struct Cli {
    /// Path to the ledger database (default: platform data directory)
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    /// Settings TOML: per-channel match windows, epsilon, confidence floor
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Import bank statement rows from a JSON-lines file. Rows already
    /// seen (same fingerprint) are skipped; malformed rows are rejected
    /// individually.
    Import {
        /// JSON-lines file of bank rows
        file: PathBuf,
        /// Commit the import (default is dry-run)
        #[arg(long)]
        write: bool,
        /// Import at most N rows
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Match unreconciled bank transactions to receipts and payments.
    Match {
        #[arg(long)]
        write: bool,
        /// Examine at most N transactions
        #[arg(long)]
        limit: Option<i64>,
    },
    /// Group split receipts into stable families.
    Splits {
        #[arg(long)]
        write: bool,
        /// Apply at most N groups
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Recalculate charter paid/balance fields from payments.
    Recalc {
        /// Single reserve number; omit to recalculate every charter
        reserve: Option<String>,
        #[arg(long)]
        write: bool,
        /// Recalculate at most N charters
        #[arg(long)]
        limit: Option<i64>,
        /// Charters per committed chunk in batch mode
        #[arg(long, default_value = "500")]
        chunk_size: i64,
    },
    /// Cancel a charter: snapshot it, zero the amount due, and rederive
    /// the balance so payments become credit.
    Cancel {
        reserve: String,
        /// Audit note recorded with the cancellation
        #[arg(long, default_value = "cancelled via cli")]
        note: String,
        #[arg(long)]
        write: bool,
    },
    /// Break a receipt's bank link, with an audit snapshot of the prior
    /// state.
    Unlink {
        receipt_id: i64,
        /// Audit note explaining the correction
        #[arg(long)]
        note: String,
        #[arg(long)]
        write: bool,
    },
    /// Report unmatched, duplicate, and inconsistent records. Applies
    /// only the flagged/restored status overlay; repairs nothing.
    Report {
        #[arg(long)]
        write: bool,
        /// Emit findings as JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("com", "ledgermend", "Ledgermend")
        .context("Failed to resolve application data directory")?;
    let data_dir = dirs.data_dir();
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create {}", data_dir.display()))?;
    Ok(data_dir.join("ledger.db"))
}

fn load_settings(path: Option<&PathBuf>) -> anyhow::Result<ReconSettings> {
    match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            ReconSettings::from_toml(&raw).map_err(anyhow::Error::msg)
        }
        None => Ok(ReconSettings::default()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let settings = load_settings(cli.config.as_ref())?;
    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path()?,
    };
    let pool = ledgermend_storage::create_db(&db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    let code = match cli.command {
        Commands::Import { file, write, limit } => {
            commands::import(&pool, &file, write, limit).await?
        }
        Commands::Match { write, limit } => {
            commands::run_match(&pool, &settings, write, limit).await?
        }
        Commands::Splits { write, limit } => commands::splits(&pool, write, limit).await?,
        Commands::Recalc {
            reserve,
            write,
            limit,
            chunk_size,
        } => commands::recalc(&pool, reserve.as_deref(), write, limit, chunk_size).await?,
        Commands::Cancel { reserve, note, write } => {
            commands::cancel(&pool, &reserve, &note, write).await?
        }
        Commands::Unlink {
            receipt_id,
            note,
            write,
        } => commands::unlink(&pool, receipt_id, &note, write).await?,
        Commands::Report { write, json } => {
            commands::report(&pool, &settings, write, json).await?
        }
    };

    Ok(code)
}
