//! Pocket ledger service

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pocket_ledger::{
    config::Args,
    db::MongoClient,
    server::{self, AppState},
    store::{MemoryUserStore, MongoUserStore, UserStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("pocket_ledger={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }
    let user_id = match args.user_object_id() {
        Ok(id) => id,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    info!("======================================");
    info!("  Pocket Ledger");
    info!("======================================");
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {} / {}", args.mongodb_uri, args.mongodb_db);
    info!("User: {}", user_id);
    info!("======================================");

    // Connect to MongoDB (optional in dev mode)
    let store: Arc<dyn UserStore> = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            let store = MongoUserStore::new(&client).await?;
            if args.seed {
                store.seed_if_missing(&user_id, &args.user_name).await?;
            }
            Arc::new(store)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, continuing on memory store): {}", e);
                Arc::new(MemoryUserStore::seeded(user_id, &args.user_name))
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let state = Arc::new(AppState::new(user_id, &args.cors_origin, store)?);
    server::run(args.listen, state).await?;
    Ok(())
}
