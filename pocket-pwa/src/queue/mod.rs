//! Local durable queue of transaction records
//!
//! Backed by sled, independent of network state. Layout:
//!
//! ```text
//! transactions           id            -> JSON record
//! transactions_by_time   millis ++ id  -> id
//! transactions_unsynced  id            -> ()
//! settings               key           -> JSON value
//! ```
//!
//! The database is opened lazily on first access and the handle reused
//! afterwards. Writes that touch several trees run in one sled transaction.

pub mod history;
pub mod record;

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use sled::transaction::{
    ConflictableTransactionError, TransactionError, TransactionalTree,
};
use sled::{Db, Transactional, Tree};
use std::path::{Path, PathBuf};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::intent::Outcome;

pub use history::{AmountRange, DateRange, HistoryFilter, HistoryStats, StatusFilter};
pub use record::{NewTransaction, TransactionRecord, TxType};

/// Current on-disk schema. Migrations between versions are additive only.
pub const SCHEMA_VERSION: u32 = 2;

const TRANSACTIONS_TREE: &str = "transactions";
const BY_TIME_TREE: &str = "transactions_by_time";
const UNSYNCED_TREE: &str = "transactions_unsynced";
const SETTINGS_TREE: &str = "settings";
const SCHEMA_VERSION_KEY: &str = "__schema_version";

#[derive(Debug, Clone)]
enum Location {
    Path(PathBuf),
    Temporary,
}

struct Handle {
    db: Db,
    transactions: Tree,
    by_time: Tree,
    unsynced: Tree,
    settings: Tree,
}

/// Durable store of pending and synced transactions
pub struct DurableQueue {
    location: Location,
    handle: OnceCell<Handle>,
}

impl DurableQueue {
    /// Queue stored under `path`; nothing is opened until first use
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            location: Location::Path(path.as_ref().to_path_buf()),
            handle: OnceCell::new(),
        }
    }

    /// Queue that lives only as long as the process (dev mode, tests)
    pub fn temporary() -> Self {
        Self {
            location: Location::Temporary,
            handle: OnceCell::new(),
        }
    }

    /// Open the store now instead of on first access. Idempotent.
    pub async fn init(&self) -> Result<(), StorageError> {
        self.handle().await.map(|_| ())
    }

    async fn handle(&self) -> Result<&Handle, StorageError> {
        self.handle
            .get_or_try_init(|| async { Self::open(&self.location) })
            .await
    }

    fn open(location: &Location) -> Result<Handle, StorageError> {
        let db = match location {
            Location::Path(path) => {
                let db = sled::open(path)?;
                info!(path = %path.display(), "Opened transaction queue");
                db
            }
            Location::Temporary => sled::Config::new().temporary(true).open()?,
        };

        let handle = Handle {
            transactions: db.open_tree(TRANSACTIONS_TREE)?,
            by_time: db.open_tree(BY_TIME_TREE)?,
            unsynced: db.open_tree(UNSYNCED_TREE)?,
            settings: db.open_tree(SETTINGS_TREE)?,
            db,
        };
        migrate(&handle)?;
        Ok(handle)
    }

    /// Persist a new record. Always unsynced.
    pub async fn put(&self, input: NewTransaction) -> Result<TransactionRecord, StorageError> {
        let h = self.handle().await?;
        let record = TransactionRecord::create(input, Utc::now());
        let value = serde_json::to_vec(&record)?;
        let time_key = record.time_key();
        let id = record.id.as_bytes();

        (&h.transactions, &h.by_time, &h.unsynced)
            .transaction(|(transactions, by_time, unsynced)| {
                transactions.insert(id, value.clone())?;
                by_time.insert(time_key.clone(), id)?;
                unsynced.insert(id, &[] as &[u8])?;
                Ok(())
            })
            .map_err(unwrap_tx_error)?;

        debug!(id = %record.id, "Transaction queued");
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Result<Option<TransactionRecord>, StorageError> {
        let h = self.handle().await?;
        match h.transactions.get(id.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    /// Records not yet acknowledged by the ledger, oldest first
    pub async fn list_unsynced(&self) -> Result<Vec<TransactionRecord>, StorageError> {
        let h = self.handle().await?;
        let mut records = Vec::new();
        for item in h.unsynced.iter() {
            let (id, _) = item?;
            if let Some(value) = h.transactions.get(&id)? {
                records.push(serde_json::from_slice::<TransactionRecord>(&value)?);
            }
        }
        records.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    /// Every record, newest first
    pub async fn list_all(&self) -> Result<Vec<TransactionRecord>, StorageError> {
        let h = self.handle().await?;
        let mut records = Vec::new();
        for item in h.by_time.iter().rev() {
            let (_, id) = item?;
            if let Some(value) = h.transactions.get(&id)? {
                records.push(serde_json::from_slice(&value)?);
            }
        }
        Ok(records)
    }

    /// Flag a record as acknowledged. Marking twice is a no-op.
    pub async fn mark_synced(&self, id: &str) -> Result<TransactionRecord, StorageError> {
        let h = self.handle().await?;
        let key = id.as_bytes();

        let record = (&h.transactions, &h.unsynced)
            .transaction(|(transactions, unsynced)| {
                let mut record = read_record(transactions, id)?;
                if !record.synced {
                    record.synced = true;
                    record.synced_at = Some(Utc::now());
                    write_record(transactions, &record)?;
                }
                unsynced.remove(key)?;
                Ok(record)
            })
            .map_err(unwrap_tx_error)?;

        debug!(id = %id, "Transaction marked synced");
        Ok(record)
    }

    /// Store the user's attestation on a record
    pub async fn set_outcome(
        &self,
        id: &str,
        outcome: Outcome,
    ) -> Result<TransactionRecord, StorageError> {
        let h = self.handle().await?;
        h.transactions
            .transaction(|transactions| {
                let mut record = read_record(transactions, id)?;
                record.outcome = outcome;
                write_record(transactions, &record)?;
                Ok(record)
            })
            .map_err(unwrap_tx_error)
    }

    pub async fn put_setting<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let h = self.handle().await?;
        h.settings.insert(key.as_bytes(), serde_json::to_vec(value)?)?;
        Ok(())
    }

    pub async fn get_setting<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, StorageError> {
        let h = self.handle().await?;
        match h.settings.get(key.as_bytes())? {
            Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
            None => Ok(None),
        }
    }

    pub async fn flush(&self) -> Result<(), StorageError> {
        let h = self.handle().await?;
        h.db.flush_async().await?;
        Ok(())
    }
}

fn read_record(
    tree: &TransactionalTree,
    id: &str,
) -> Result<TransactionRecord, ConflictableTransactionError<StorageError>> {
    let value = tree
        .get(id.as_bytes())?
        .ok_or_else(|| ConflictableTransactionError::Abort(StorageError::NotFound(id.to_string())))?;
    serde_json::from_slice(&value)
        .map_err(|e| ConflictableTransactionError::Abort(StorageError::Serialization(e)))
}

fn write_record(
    tree: &TransactionalTree,
    record: &TransactionRecord,
) -> Result<(), ConflictableTransactionError<StorageError>> {
    let value = serde_json::to_vec(record)
        .map_err(|e| ConflictableTransactionError::Abort(StorageError::Serialization(e)))?;
    tree.insert(record.id.as_bytes(), value)?;
    Ok(())
}

fn unwrap_tx_error(e: TransactionError<StorageError>) -> StorageError {
    match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => StorageError::Database(e),
    }
}

fn read_schema_version(h: &Handle) -> Result<Option<u32>, StorageError> {
    match h.settings.get(SCHEMA_VERSION_KEY)? {
        Some(value) => Ok(Some(serde_json::from_slice(&value)?)),
        None => Ok(None),
    }
}

/// Bring an existing store up to [`SCHEMA_VERSION`]. Records are never
/// rewritten; only derived trees are built.
fn migrate(h: &Handle) -> Result<(), StorageError> {
    let current = match read_schema_version(h)? {
        Some(v) => v,
        // Records without a version marker predate the index trees
        None if !h.transactions.is_empty() => 1,
        None => SCHEMA_VERSION,
    };

    if current > SCHEMA_VERSION {
        return Err(StorageError::Migration(format!(
            "store schema v{} is newer than supported v{}",
            current, SCHEMA_VERSION
        )));
    }

    if current < 2 {
        let mut rebuilt = 0usize;
        for item in h.transactions.iter() {
            let (id, value) = item?;
            let record: TransactionRecord = serde_json::from_slice(&value)?;
            h.by_time.insert(record.time_key(), id.clone())?;
            if !record.synced {
                h.unsynced.insert(id, &[] as &[u8])?;
            }
            rebuilt += 1;
        }
        info!(records = rebuilt, "Migrated transaction queue to schema v2");
    }

    h.settings
        .insert(SCHEMA_VERSION_KEY, serde_json::to_vec(&SCHEMA_VERSION)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::UpiId;

    fn new_tx(upi: &str, amount: &str) -> NewTransaction {
        NewTransaction {
            upi_id: UpiId::parse(upi).unwrap(),
            amount: amount.parse().unwrap(),
            note: Some("lunch".into()),
            pocket: "Food".into(),
            tx_type: TxType::Debit,
            payee: None,
        }
    }

    #[tokio::test]
    async fn test_put_then_list_all_round_trip() {
        let queue = DurableQueue::temporary();
        let stored = queue.put(new_tx("user@bank", "150.00")).await.unwrap();

        let all = queue.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        let fetched = &all[0];
        assert_eq!(fetched, &stored);
        assert_eq!(fetched.upi_id.as_str(), "user@bank");
        assert_eq!(fetched.amount.to_string(), "150.00");
        assert_eq!(fetched.note.as_deref(), Some("lunch"));
        assert!(!fetched.synced);
        assert!(!fetched.id.is_empty());
    }

    #[tokio::test]
    async fn test_list_all_newest_first() {
        let queue = DurableQueue::temporary();
        let first = queue.put(new_tx("a@bank", "1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = queue.put(new_tx("b@bank", "2")).await.unwrap();

        let ids: Vec<_> = queue.list_all().await.unwrap().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[tokio::test]
    async fn test_mark_synced_is_idempotent() {
        let queue = DurableQueue::temporary();
        let record = queue.put(new_tx("user@bank", "10")).await.unwrap();
        assert_eq!(queue.list_unsynced().await.unwrap().len(), 1);

        let once = queue.mark_synced(&record.id).await.unwrap();
        let twice = queue.mark_synced(&record.id).await.unwrap();
        assert!(once.synced && twice.synced);
        assert_eq!(once.synced_at, twice.synced_at);

        let all = queue.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].synced);
        assert!(queue.list_unsynced().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_synced_unknown_id() {
        let queue = DurableQueue::temporary();
        let err = queue.mark_synced("missing").await.unwrap_err();
        assert!(matches!(err, StorageError::NotFound(id) if id == "missing"));
    }

    #[tokio::test]
    async fn test_outcome_and_settings() {
        let queue = DurableQueue::temporary();
        let record = queue.put(new_tx("user@bank", "10")).await.unwrap();
        let updated = queue.set_outcome(&record.id, Outcome::Declined).await.unwrap();
        assert_eq!(updated.outcome, Outcome::Declined);
        assert!(!updated.synced);

        queue.put_setting("last_pocket", &"Food").await.unwrap();
        let pocket: Option<String> = queue.get_setting("last_pocket").await.unwrap();
        assert_eq!(pocket.as_deref(), Some("Food"));
        let missing: Option<String> = queue.get_setting("nope").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let id = {
            let queue = DurableQueue::new(dir.path().join("queue"));
            let record = queue.put(new_tx("user@bank", "42")).await.unwrap();
            queue.flush().await.unwrap();
            record.id
        };

        let queue = DurableQueue::new(dir.path().join("queue"));
        let pending = queue.list_unsynced().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, id);
    }

    #[tokio::test]
    async fn test_v1_store_migrates_without_losing_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue");
        let record = TransactionRecord::create(new_tx("user@bank", "5"), Utc::now());
        {
            // A v1 store: records only, no index trees, no version marker
            let db = sled::open(&path).unwrap();
            let tree = db.open_tree(TRANSACTIONS_TREE).unwrap();
            tree.insert(record.id.as_bytes(), serde_json::to_vec(&record).unwrap())
                .unwrap();
            db.flush().unwrap();
        }

        let queue = DurableQueue::new(&path);
        assert_eq!(queue.list_all().await.unwrap(), vec![record.clone()]);
        assert_eq!(queue.list_unsynced().await.unwrap().len(), 1);
        let version: Option<u32> = queue.get_setting(SCHEMA_VERSION_KEY).await.unwrap();
        assert_eq!(version, Some(SCHEMA_VERSION));
    }
}
