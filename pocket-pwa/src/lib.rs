//! Pocket Pay - offline-resilient UPI payments
//!
//! Builds `upi://pay` deep-links and hands them to whatever payment app the
//! device has, while keeping every attempt in a durable local queue that is
//! replayed to the ledger once connectivity returns.
//!
//! ## Components
//!
//! - **Intent**: UPI URI builder, app launcher and outcome attestation
//! - **Queue**: sled-backed transaction store with history filters
//! - **Worker**: caching intermediary with per-class fetch strategies
//! - **Sync**: background reconciliation against the ledger
//! - **Scanner**: camera frame loop for UPI QR codes

pub mod cli;
pub mod config;
pub mod error;
pub mod intent;
pub mod pipeline;
pub mod queue;
pub mod scanner;
pub mod sync;
pub mod worker;

pub use config::Args;
pub use error::{PwaError, Result};
pub use pipeline::{PaymentForm, PaymentPipeline, SubmissionOutcome};
