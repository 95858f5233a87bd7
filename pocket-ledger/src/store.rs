//! User storage backends
//!
//! `MongoUserStore` is the production backend. `MemoryUserStore` backs dev
//! mode and tests.

use async_trait::async_trait;
use bson::{doc, oid::ObjectId};
use dashmap::DashMap;
use tracing::{debug, info};

use crate::db::schemas::{TransactionDoc, UserDoc, USER_COLLECTION};
use crate::db::{MongoClient, MongoCollection};
use crate::error::{LedgerError, Result};
use crate::ledger::{self, TransactionReceipt};

/// Balance each seeded pocket starts with
pub const SEED_BALANCE: f64 = 5000.0;

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, id: &ObjectId) -> Result<Option<UserDoc>>;

    /// Apply a transaction to the user's pocket and append it to their log
    async fn add_transaction(&self, id: &ObjectId, tx: TransactionDoc)
        -> Result<TransactionReceipt>;

    fn backend(&self) -> &'static str;
}

// =============================================================================
// MongoDB
// =============================================================================

pub struct MongoUserStore {
    users: MongoCollection<UserDoc>,
}

impl MongoUserStore {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            users: client.collection(USER_COLLECTION).await?,
        })
    }

    /// Create the user with the default pockets when it does not exist yet
    pub async fn seed_if_missing(&self, id: &ObjectId, name: &str) -> Result<bool> {
        if self.users.find_by_id(id).await?.is_some() {
            return Ok(false);
        }
        self.users
            .insert_one(UserDoc::with_default_pockets(*id, name, SEED_BALANCE))
            .await?;
        info!(user_id = %id, "Seeded user with default pockets");
        Ok(true)
    }
}

#[async_trait]
impl UserStore for MongoUserStore {
    async fn find_user(&self, id: &ObjectId) -> Result<Option<UserDoc>> {
        self.users.find_by_id(id).await
    }

    async fn add_transaction(
        &self,
        id: &ObjectId,
        tx: TransactionDoc,
    ) -> Result<TransactionReceipt> {
        let user = self.find_user(id).await?.ok_or(LedgerError::UserNotFound)?;
        let delta = ledger::validate(&user, &tx)?;

        // Single atomic update so concurrent posts cannot lose increments
        let entry = bson::to_bson(&tx)?;
        let updated = self
            .users
            .update_and_fetch(
                doc! { "_id": id, "pockets.name": tx.pocket.as_str() },
                doc! {
                    "$inc": {
                        "pockets.$.balance": delta.balance,
                        "pockets.$.spent": delta.spent,
                    },
                    "$push": { "transactions": entry },
                },
            )
            .await?
            .ok_or(LedgerError::PocketNotFound)?;

        let pocket = updated
            .pocket(&tx.pocket)
            .cloned()
            .ok_or(LedgerError::PocketNotFound)?;
        debug!(user_id = %id, pocket = %pocket.name, balance = pocket.balance, "Transaction stored");

        Ok(TransactionReceipt {
            name: updated.name,
            pocket,
            transaction: tx,
        })
    }

    fn backend(&self) -> &'static str {
        "mongodb"
    }
}

// =============================================================================
// Memory
// =============================================================================

#[derive(Default)]
pub struct MemoryUserStore {
    users: DashMap<ObjectId, UserDoc>,
}

impl MemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store holding one user with the default pockets
    pub fn seeded(id: ObjectId, name: &str) -> Self {
        let store = Self::new();
        store.insert(UserDoc::with_default_pockets(id, name, SEED_BALANCE));
        store
    }

    /// Insert or replace a user; documents without an id get a fresh one
    pub fn insert(&self, mut user: UserDoc) -> ObjectId {
        let id = *user._id.get_or_insert_with(ObjectId::new);
        self.users.insert(id, user);
        id
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn find_user(&self, id: &ObjectId) -> Result<Option<UserDoc>> {
        Ok(self.users.get(id).map(|user| user.clone()))
    }

    async fn add_transaction(
        &self,
        id: &ObjectId,
        tx: TransactionDoc,
    ) -> Result<TransactionReceipt> {
        let mut user = self.users.get_mut(id).ok_or(LedgerError::UserNotFound)?;
        ledger::apply_transaction(&mut user, tx)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debit(pocket: &str, amount: f64) -> TransactionDoc {
        TransactionDoc {
            pocket: pocket.into(),
            tx_type: "debit".into(),
            amount,
            upi_id: "shop@okbank".into(),
            payee: "shop@okbank".into(),
            message: Some("tea".into()),
        }
    }

    #[tokio::test]
    async fn test_memory_store_applies_and_logs() {
        let id = ObjectId::new();
        let store = MemoryUserStore::seeded(id, "Asha");

        let receipt = store.add_transaction(&id, debit("Food", 120.0)).await.unwrap();
        assert_eq!(receipt.pocket.balance, SEED_BALANCE - 120.0);
        assert_eq!(receipt.pocket.spent, 120.0);

        let user = store.find_user(&id).await.unwrap().unwrap();
        assert_eq!(user.transactions.len(), 1);
        assert_eq!(user.transactions[0].message.as_deref(), Some("tea"));
    }

    #[tokio::test]
    async fn test_memory_store_unknown_user() {
        let store = MemoryUserStore::new();
        let err = store
            .add_transaction(&ObjectId::new(), debit("Food", 1.0))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::UserNotFound));
    }
}
