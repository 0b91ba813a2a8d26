use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use roleradar_core::RunSummary;
use roleradar_storage::{JobStore, MemoryJobStore, PgJobStore};
use roleradar_sync::{Orchestrator, RadarConfig, RunRequest};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "roleradar-cli")]
#[command(about = "RoleRadar command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run every enabled source once and print the summary.
    Sync {
        /// Overrides ROLERADAR_LOOKBACK_DAYS for this run.
        #[arg(long)]
        lookback_days: Option<i64>,
        /// Keep results in memory instead of Postgres.
        #[arg(long)]
        memory: bool,
    },
    /// Apply database migrations.
    Migrate,
    /// Serve the JSON API, with the daily scheduler when enabled.
    Serve,
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,roleradar=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

async fn connect_store(config: &RadarConfig) -> Result<PgJobStore> {
    PgJobStore::connect(&config.database_url, 5)
        .await
        .context("connecting to DATABASE_URL")
}

fn print_summary(summary: &RunSummary) {
    println!(
        "sync {:?}: run_id={} found={} added={} skipped={} elapsed_ms={}",
        summary.status,
        summary.run_id,
        summary.total_found(),
        summary.total_added(),
        summary.total_skipped(),
        summary.elapsed_ms
    );
    for (source, stats) in &summary.sources {
        println!(
            "  {source}: found={} added={} skipped={} filtered={} parse_skipped={}{}",
            stats.found,
            stats.added,
            stats.skipped,
            stats.filtered,
            stats.parse_skipped,
            stats.error.as_deref().map(|e| format!(" error={e}")).unwrap_or_default()
        );
    }
    if let Some(reason) = &summary.failure_reason {
        println!("  failure: {reason}");
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = RadarConfig::from_env();

    match cli.command.unwrap_or(Commands::Sync {
        lookback_days: None,
        memory: false,
    }) {
        Commands::Sync { lookback_days, memory } => {
            let store: Arc<dyn JobStore> = if memory {
                Arc::new(MemoryJobStore::new())
            } else {
                Arc::new(connect_store(&config).await?)
            };
            let orchestrator = Orchestrator::from_config(&config, store).await?;
            let summary = orchestrator.run_to_completion(RunRequest { lookback_days }).await?;
            print_summary(&summary);
        }
        Commands::Migrate => {
            connect_store(&config).await?.migrate().await?;
            println!("migrations applied");
        }
        Commands::Serve => {
            roleradar_web::serve_from_env().await?;
        }
    }

    Ok(())
}
