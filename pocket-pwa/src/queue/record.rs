//! Transaction records held in the local queue

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;
use crate::intent::builder::random_base36;
use crate::intent::{Amount, Outcome, UpiId};

/// Direction of a transaction against a pocket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TxType {
    Credit,
    Debit,
}

impl FromStr for TxType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "credit" => Ok(TxType::Credit),
            "debit" => Ok(TxType::Debit),
            other => Err(ValidationError::InvalidType(other.to_string())),
        }
    }
}

impl fmt::Display for TxType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxType::Credit => f.write_str("credit"),
            TxType::Debit => f.write_str("debit"),
        }
    }
}

/// Fields supplied by the caller; the queue adds id, timestamp and flags
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub upi_id: UpiId,
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub pocket: String,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    /// Display name sent to the ledger; the UPI id stands in when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee: Option<String>,
}

/// The unit of durability. Created unsynced, flipped to synced only after
/// the ledger acknowledged it, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: String,
    pub upi_id: UpiId,
    pub amount: Amount,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub pocket: String,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payee: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub synced: bool,
    #[serde(default)]
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl TransactionRecord {
    /// Stamp a new record at `now`
    pub fn create(input: NewTransaction, now: DateTime<Utc>) -> Self {
        Self {
            id: generate_record_id(now),
            upi_id: input.upi_id,
            amount: input.amount,
            note: input.note.filter(|n| !n.trim().is_empty()),
            pocket: input.pocket,
            tx_type: input.tx_type,
            payee: input.payee.filter(|p| !p.trim().is_empty()),
            timestamp: now,
            synced: false,
            outcome: Outcome::Unknown,
            synced_at: None,
        }
    }

    /// Key for the time index: big-endian millis then id, so byte order is
    /// chronological order
    pub(crate) fn time_key(&self) -> Vec<u8> {
        let millis = self.timestamp.timestamp_millis().max(0) as u64;
        let mut key = Vec::with_capacity(8 + self.id.len());
        key.extend_from_slice(&millis.to_be_bytes());
        key.extend_from_slice(self.id.as_bytes());
        key
    }
}

/// `<epoch millis>-<random base-36>`: sortable and unique enough locally
pub fn generate_record_id(now: DateTime<Utc>) -> String {
    format!("{}-{}", now.timestamp_millis(), random_base36(8))
}
