//! PDP ETL - guest-check ingestion tool

use anyhow::Result;
use clap::Parser;
use pdp_common::logging::{init_logging, LogConfig, LogLevel};
use pdp_etl::{config::EtlConfig, db, object_store::ObjectStore, EtlPipeline, RunStatus};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pdp-etl")]
#[command(author, version, about = "POS guest-check ETL pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Parser, Debug)]
enum Command {
    /// Process raw guest-check documents from object storage
    Process {
        /// Object key of a raw document (repeatable; overrides ETL_RAW_KEYS)
        #[arg(short, long = "key")]
        keys: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env().unwrap_or_else(|_| {
        LogConfig::builder()
            .log_file_prefix("pdp-etl".to_string())
            .build()
    });

    // The CLI flag wins over the environment.
    if cli.verbose {
        log_config.level = LogLevel::Debug;
    }

    init_logging(&log_config)?;

    match cli.command {
        Command::Process { keys } => process(keys).await,
    }
}

async fn process(cli_keys: Vec<String>) -> Result<()> {
    let config = EtlConfig::load()?;

    let keys = if cli_keys.is_empty() {
        config.raw_keys.clone()
    } else {
        cli_keys
    };
    anyhow::ensure!(
        !keys.is_empty(),
        "no document keys given (pass --key or set ETL_RAW_KEYS)"
    );

    let pool = db::create_pool(&config.database).await?;
    info!("Database connection pool established");

    let store = ObjectStore::new(config.object_store.clone()).await?;
    info!("Object store client initialized");

    let pipeline = EtlPipeline::new(config, pool, store);
    let summary = pipeline.run_keys(&keys).await;

    info!("{}", summary);

    match summary.status {
        RunStatus::Completed => Ok(()),
        RunStatus::Aborted { reason } => {
            error!(reason = %reason, "Run aborted");
            anyhow::bail!("run aborted: {}", reason)
        },
    }
}
