//! Background reconciliation
//!
//! Queued records are replayed against the ledger when connectivity comes
//! back (for registered sync tags) or on an explicit wake. Drains are
//! sequential and single-flight; a record is only ever marked, never
//! deleted.

pub mod client;
pub mod connectivity;
pub mod reconciler;
pub mod registry;

pub use client::{HttpLedgerClient, LedgerAck, LedgerClient, LedgerTransaction};
pub use connectivity::{spawn_connectivity_probe, Connectivity};
pub use reconciler::{spawn_reconciliation_task, DrainReport, LogNotifier, Notifier, Reconciler};
pub use registry::{SyncRegistry, BACKGROUND_SYNC_TAG};
