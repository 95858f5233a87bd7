//! Pocket ledger - budget pockets and transaction log
//!
//! Serves the three-endpoint contract the pocket-pwa client syncs against:
//! record a transaction against a pocket, list transactions, list pockets.
//! Backed by MongoDB, or by a seeded memory store in dev mode.

pub mod config;
pub mod db;
pub mod error;
pub mod ledger;
pub mod server;
pub mod store;

pub use config::Args;
pub use error::{LedgerError, Result};
pub use server::{run, AppState};
