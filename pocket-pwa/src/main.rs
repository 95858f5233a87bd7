//! Pocket Pay command-line client and worker daemon

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pocket_pwa::{cli, config::Args};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pocket_pwa={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    if matches!(args.command, cli::Command::Serve) {
        info!("======================================");
        info!("  Pocket Pay worker");
        info!("======================================");
        info!("Listen: {}", args.listen);
        info!("Origin: {}", args.origin_url);
        if let Ok(api) = args.api_base_url() {
            info!("Ledger: {}", api);
        }
        info!("Cache version: {}", args.cache_version);
        info!("Data dir: {}", args.data_dir.display());
        info!(
            "Background sync: {}",
            if args.no_background_sync { "DISABLED" } else { "enabled" }
        );
        info!("======================================");
    }

    cli::run(args).await
}
