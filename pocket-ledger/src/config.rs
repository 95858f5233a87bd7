//! Configuration for pocket-ledger
//!
//! CLI arguments and environment variable handling using clap.

use bson::oid::ObjectId;
use clap::Parser;
use std::net::SocketAddr;

/// Pocket ledger - budget pockets and transaction log over HTTP
#[derive(Parser, Debug, Clone)]
#[command(name = "pocket-ledger")]
#[command(about = "Records UPI transactions against budget pockets")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:5000")]
    pub listen: SocketAddr,

    /// MongoDB connection URI
    #[arg(long, env = "MONGO_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "upi-pwa")]
    pub mongodb_db: String,

    /// The ledger's single user
    #[arg(long, env = "LEDGER_USER_ID", default_value = "68b17ec7b692741c19ed5b3d")]
    pub user_id: String,

    /// Name given to the user when it has to be created
    #[arg(long, env = "LEDGER_USER_NAME", default_value = "Pocket User")]
    pub user_name: String,

    /// Create the user with default pockets if MongoDB does not have it
    #[arg(long, env = "LEDGER_SEED", default_value = "false")]
    pub seed: bool,

    /// Run on a seeded in-memory store when MongoDB is unreachable
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Value of Access-Control-Allow-Origin
    #[arg(long, env = "CORS_ORIGIN", default_value = "*")]
    pub cors_origin: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Args {
    pub fn user_object_id(&self) -> Result<ObjectId, String> {
        ObjectId::parse_str(&self.user_id)
            .map_err(|e| format!("LEDGER_USER_ID '{}' is not an ObjectId: {}", self.user_id, e))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        self.user_object_id()?;
        if self.cors_origin.trim().is_empty() {
            return Err("CORS_ORIGIN must not be empty".to_string());
        }
        if hyper::header::HeaderValue::from_str(&self.cors_origin).is_err() {
            return Err(format!("CORS_ORIGIN '{}' is not a valid header value", self.cors_origin));
        }
        Ok(())
    }
}
