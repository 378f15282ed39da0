use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

use stageload::config::Config;
use stageload::error::Result;
use stageload::pipeline::RunSummary;
use stageload::{catalog, logging, rates};

#[derive(Parser)]
#[command(name = "stageload")]
#[command(about = "Idempotent staging loads for catalog and exchange-rate data")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to a TOML config file. Defaults plus environment overrides apply
    /// when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load the show catalog CSV into the staging database
    Catalog {
        /// Source CSV path
        #[arg(long)]
        input: Option<PathBuf>,
        /// Staging SQLite database path
        #[arg(long)]
        db: Option<PathBuf>,
        /// Keep link tables from previous runs instead of clearing them
        #[arg(long)]
        no_reload: bool,
    },
    /// Fetch exchange rates for every transaction date into a CSV
    Rates {
        /// Transactions SQLite database path
        #[arg(long)]
        transactions_db: Option<PathBuf>,
        /// Output CSV path
        #[arg(long)]
        out: Option<PathBuf>,
        /// Maximum in-flight API requests
        #[arg(long)]
        workers: Option<usize>,
    },
}

fn load_config(path: &Option<PathBuf>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path),
        None => Ok(Config::from_env()),
    }
}

fn print_summary(summary: &RunSummary) {
    println!("\n📊 Run summary for {}:", summary.pipeline);
    println!("   Keys found: {}", summary.keys_found);
    println!("   Rows written: {}", summary.rows_written);
    println!("   Fetch failures: {}", summary.fetch_failures);
    println!("   Keys without rows: {}", summary.keys_without_rows);
    println!("   Sink errors: {}", summary.sink_errors);
    println!("   Duration: {:.2}s", summary.duration_secs);
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse();

    let mut config = match load_config(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            println!("❌ Failed to load configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Commands::Catalog {
            input,
            db,
            no_reload,
        } => {
            println!("🔄 Running catalog load...");
            if let Some(input) = input {
                config.catalog.csv_path = input;
            }
            if let Some(db) = db {
                config.catalog.db_path = db;
            }
            if no_reload {
                config.catalog.full_reload = false;
            }
            catalog::run(&config).await
        }
        Commands::Rates {
            transactions_db,
            out,
            workers,
        } => {
            println!("🔄 Running rates load...");
            if let Some(db) = transactions_db {
                config.rates.transactions_db = db;
            }
            if let Some(out) = out {
                config.rates.output_csv = out;
            }
            if let Some(workers) = workers {
                config.rates.workers = workers;
            }
            rates::run(&config).await
        }
    };

    match result {
        Ok(summary) => {
            print_summary(&summary);
            println!("✅ Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Run failed: {}", e);
            println!("❌ Run failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
