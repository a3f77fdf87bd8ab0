//! Main entry point for the index resolver
//!
//! Loads the entity registry and environment, pushes an initial snapshot to
//! the oracle and then keeps it synchronised every hour until killed.

use anyhow::{Context, Result};
use clap::Parser;
use index_resolver::config::Settings;
use index_resolver::resolver::{
    AptosCliClient, DryRunClient, EntityRegistry, LedgerClient, SqliteSeriesStore, TimeSeriesStore,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "index-resolver")]
#[command(about = "Keep the on-chain index oracle synchronised with hourly index values")]
struct Args {
    /// Entity configuration file
    #[arg(long, env = "CITIES_FILE", default_value = "cities.json")]
    cities_file: PathBuf,

    /// Env file to load instead of ./.env
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Run the startup reconciliation only, then exit
    #[arg(long)]
    once: bool,

    /// Log ledger operations instead of running the CLI
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "index_resolver=info".into()),
        )
        .init();

    let args = Args::parse();
    let settings = Settings::load(args.env_file.as_deref())?;

    info!("Starting index resolver");

    let registry = EntityRegistry::load(&args.cities_file)?;

    let store = SqliteSeriesStore::connect(&settings.store_url).await?;
    if !store.health_check().await? {
        anyhow::bail!("Time-series store failed its health check");
    }

    let aptos = AptosCliClient::new(
        settings.aptos_bin.clone(),
        settings.admin_address.clone(),
        settings.aptos_profile.clone(),
    );
    let client: Arc<dyn LedgerClient> = if args.dry_run {
        warn!("Dry run: ledger operations will only be logged");
        Arc::new(DryRunClient::new(aptos))
    } else {
        Arc::new(aptos)
    };

    let mut scheduler = settings.resolver_builder().build(registry, store, client);

    if args.once {
        let report = scheduler.reconcile().await.context("Reconciliation failed")?;
        info!("Done: {} operations issued, {} failed", report.issued, report.failed);
        return Ok(());
    }

    scheduler.run().await.context("Reconciliation failed")?;
    Ok(())
}
