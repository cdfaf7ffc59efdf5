use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use jobgrid_ingest::{
    build_coordinator_from_env, DedupConfig, DeduplicationEngine, IngestConfig,
    IngestionCoordinator, TracingNotifier,
};
use jobgrid_store::{FileLedgerStore, JobStore, MemoryJobStore, QuotaLedger};
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "jobgrid-cli")]
#[command(about = "JobGrid ingestion command-line interface")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one ingestion pass over every configured source.
    Ingest,
    /// Remove later-created duplicates from the store.
    DedupSweep,
    /// Show remaining quota and next reset for a source.
    QuotaStatus { source: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = IngestConfig::from_env();

    match cli.command.unwrap_or(Commands::Ingest) {
        Commands::Ingest => {
            // The deployment injects the application's shared store here;
            // the standalone binary runs against an in-memory one.
            let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
            let (coordinator, _ledger) =
                build_coordinator_from_env(&config, store, Arc::new(TracingNotifier)).await?;

            if let Some(mut scheduler) =
                IngestionCoordinator::maybe_build_scheduler(Arc::clone(&coordinator), &config)
                    .await?
            {
                scheduler.start().await?;
                info!(cron = %config.ingest_cron, "scheduler running, Ctrl-C to stop");
                tokio::signal::ctrl_c().await?;
                return Ok(());
            }

            let stats = coordinator.run().await;
            let new: usize = stats.iter().map(|s| s.new_count).sum();
            let duplicates: usize = stats.iter().map(|s| s.duplicate_count).sum();
            let errors: usize = stats.iter().map(|s| s.error_count).sum();
            println!(
                "ingest complete: sources={} new={new} duplicates={duplicates} errors={errors}",
                stats.len()
            );
        }
        Commands::DedupSweep => {
            let store: Arc<dyn JobStore> = Arc::new(MemoryJobStore::new());
            let engine = DeduplicationEngine::new(store, DedupConfig::default());
            let report = engine.find_and_remove_duplicates().await?;
            println!(
                "sweep complete: scanned={} removed={} companies={}",
                report.scanned, report.removed_duplicates, report.companies
            );
        }
        Commands::QuotaStatus { source } => {
            let ledger =
                QuotaLedger::open(Arc::new(FileLedgerStore::new(config.ledger_path.clone())))
                    .await?;
            let status = ledger.status(&source).await;
            match status.next_reset {
                Some(reset) => println!(
                    "{source}: remaining={} next_reset={reset}",
                    status.remaining
                ),
                None => println!("{source}: remaining={} next_reset=none", status.remaining),
            }
        }
    }

    Ok(())
}
