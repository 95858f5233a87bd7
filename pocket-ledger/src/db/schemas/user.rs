//! User document schema
//!
//! One document per user holding the budget pockets and the full
//! transaction log.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// Pockets every new user starts with
pub const DEFAULT_POCKETS: &[&str] = &[
    "Food",
    "Fitness",
    "Travel",
    "Grocery",
    "Shopping",
    "Accommodation",
    "Investment",
];

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PocketDoc {
    pub name: String,
    pub balance: f64,
    pub spent: f64,
}

impl PocketDoc {
    pub fn new(name: impl Into<String>, balance: f64) -> Self {
        Self {
            name: name.into(),
            balance,
            spent: 0.0,
        }
    }
}

/// One entry of the transaction log, as posted by the client
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionDoc {
    pub pocket: String,
    /// "credit" or "debit"; validated when applied
    #[serde(rename = "type")]
    pub tx_type: String,
    pub amount: f64,
    pub upi_id: String,
    pub payee: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// User document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct UserDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    pub name: String,

    #[serde(default)]
    pub pockets: Vec<PocketDoc>,

    #[serde(default)]
    pub transactions: Vec<TransactionDoc>,

    /// Start of the current budget period
    pub reset_date: DateTime,
}

impl UserDoc {
    /// New user with the default pockets, each holding `balance`
    pub fn with_default_pockets(id: ObjectId, name: impl Into<String>, balance: f64) -> Self {
        Self {
            _id: Some(id),
            name: name.into(),
            pockets: DEFAULT_POCKETS
                .iter()
                .map(|pocket| PocketDoc::new(*pocket, balance))
                .collect(),
            transactions: Vec::new(),
            reset_date: DateTime::now(),
        }
    }

    pub fn pocket(&self, name: &str) -> Option<&PocketDoc> {
        self.pockets.iter().find(|p| p.name == name)
    }
}

impl IntoIndexes for UserDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "pockets.name": 1 },
            Some(
                IndexOptions::builder()
                    .name("pockets_name_idx".to_string())
                    .build(),
            ),
        )]
    }
}
