//! Database schemas for the ledger

mod user;

pub use user::{PocketDoc, TransactionDoc, UserDoc, DEFAULT_POCKETS, USER_COLLECTION};
