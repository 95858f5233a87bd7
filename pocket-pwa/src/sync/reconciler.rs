//! Replays unsynced records against the ledger

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use super::client::{LedgerClient, LedgerTransaction};
use super::connectivity::Connectivity;
use super::registry::SyncRegistry;
use crate::error::{StorageError, SyncError};
use crate::intent::Outcome;
use crate::queue::{DurableQueue, TransactionRecord};

/// Summary of one drain
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DrainReport {
    pub attempted: usize,
    pub synced: usize,
    pub failed: usize,
    /// Records the user said did not go through
    pub skipped: usize,
    /// Another drain held the lock; nothing was done
    pub already_running: bool,
}

impl DrainReport {
    pub fn is_clean(&self) -> bool {
        !self.already_running && self.failed == 0
    }
}

/// User-visible notification for synced records
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn synced(&self, record: &TransactionRecord);
}

/// Notifications go to the log
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn synced(&self, record: &TransactionRecord) {
        info!(
            id = %record.id,
            upi_id = %record.upi_id,
            amount = %record.amount,
            "Transaction synced"
        );
    }
}

pub struct Reconciler {
    queue: Arc<DurableQueue>,
    client: Arc<dyn LedgerClient>,
    notifier: Arc<dyn Notifier>,
    running: Mutex<()>,
}

impl Reconciler {
    pub fn new(queue: Arc<DurableQueue>, client: Arc<dyn LedgerClient>) -> Self {
        Self::with_notifier(queue, client, Arc::new(LogNotifier))
    }

    pub fn with_notifier(
        queue: Arc<DurableQueue>,
        client: Arc<dyn LedgerClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            queue,
            client,
            notifier,
            running: Mutex::new(()),
        }
    }

    /// Replay every unsynced record once, oldest first, one at a time.
    /// Failed records stay pending for the next signal. Single-flight: a
    /// drain started while another runs returns at once.
    pub async fn drain(&self) -> Result<DrainReport, StorageError> {
        let Ok(_guard) = self.running.try_lock() else {
            debug!("Drain already in progress");
            return Ok(DrainReport {
                already_running: true,
                ..Default::default()
            });
        };

        let mut report = DrainReport::default();
        for record in self.queue.list_unsynced().await? {
            if record.outcome == Outcome::Declined {
                report.skipped += 1;
                continue;
            }
            report.attempted += 1;
            match self.sync_one(&record).await {
                Ok(synced) => {
                    report.synced += 1;
                    self.notifier.synced(&synced).await;
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(id = %record.id, error = %e, "Sync failed, record stays pending");
                }
            }
        }

        if report.attempted > 0 {
            info!(
                attempted = report.attempted,
                synced = report.synced,
                failed = report.failed,
                "Drain finished"
            );
        }
        Ok(report)
    }

    async fn sync_one(&self, record: &TransactionRecord) -> Result<TransactionRecord, SyncError> {
        self.client
            .post_transaction(&LedgerTransaction::from_record(record))
            .await?;
        Ok(self.queue.mark_synced(&record.id).await?)
    }
}

/// Drain when connectivity comes back while sync tags are registered, and
/// on every explicit wake
pub fn spawn_reconciliation_task(
    reconciler: Arc<Reconciler>,
    registry: Arc<SyncRegistry>,
    connectivity: Arc<Connectivity>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut online = connectivity.subscribe();

        if *online.borrow_and_update() && registry.has_pending() {
            run_drain(&reconciler, &registry).await;
        }

        loop {
            tokio::select! {
                _ = registry.woken() => {
                    debug!("Reconciliation woken");
                }
                changed = online.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    if !*online.borrow_and_update() || !registry.has_pending() {
                        continue;
                    }
                }
            }
            run_drain(&reconciler, &registry).await;
        }
    })
}

async fn run_drain(reconciler: &Reconciler, registry: &SyncRegistry) {
    match reconciler.drain().await {
        Ok(report) if report.is_clean() => registry.complete_all().await,
        Ok(_) => {}
        Err(e) => error!(error = %e, "Could not read pending transactions"),
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::NetworkError;
    use crate::intent::UpiId;
    use crate::queue::{NewTransaction, TxType};
    use crate::sync::client::LedgerAck;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    /// Ledger double: records posts, can be switched off or slowed down
    #[derive(Default)]
    pub(crate) struct FakeLedger {
        pub down: AtomicBool,
        pub delay_ms: u64,
        pub posted: std::sync::Mutex<Vec<LedgerTransaction>>,
    }

    #[async_trait]
    impl LedgerClient for FakeLedger {
        async fn post_transaction(&self, tx: &LedgerTransaction) -> Result<LedgerAck, SyncError> {
            if self.delay_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            }
            if self.down.load(Ordering::SeqCst) {
                return Err(NetworkError::Connection("down".into()).into());
            }
            self.posted.lock().unwrap().push(tx.clone());
            Ok(LedgerAck {
                message: "Transaction added".into(),
                body: serde_json::Value::Null,
            })
        }

        async fn ping(&self) -> Result<(), NetworkError> {
            if self.down.load(Ordering::SeqCst) {
                Err(NetworkError::Connection("down".into()))
            } else {
                Ok(())
            }
        }
    }

    fn new_tx(amount: &str) -> NewTransaction {
        NewTransaction {
            upi_id: UpiId::parse("user@bank").unwrap(),
            amount: amount.parse().unwrap(),
            note: Some("lunch".into()),
            pocket: "Food".into(),
            tx_type: TxType::Debit,
            payee: None,
        }
    }

    #[tokio::test]
    async fn test_drain_marks_synced() {
        let queue = Arc::new(DurableQueue::temporary());
        let ledger = Arc::new(FakeLedger::default());
        let record = queue.put(new_tx("150.00")).await.unwrap();

        let reconciler = Reconciler::new(Arc::clone(&queue), ledger.clone());
        let report = reconciler.drain().await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(report.synced, 1);
        assert!(report.is_clean());

        assert!(queue.get(&record.id).await.unwrap().unwrap().synced);
        let posted = ledger.posted.lock().unwrap();
        assert_eq!(posted[0].upi_id.as_str(), "user@bank");
        assert_eq!(posted[0].message.as_deref(), Some("lunch"));
    }

    #[tokio::test]
    async fn test_failures_stay_pending() {
        let queue = Arc::new(DurableQueue::temporary());
        let ledger = Arc::new(FakeLedger::default());
        ledger.down.store(true, Ordering::SeqCst);
        queue.put(new_tx("1")).await.unwrap();
        queue.put(new_tx("2")).await.unwrap();

        let reconciler = Reconciler::new(Arc::clone(&queue), ledger);
        let report = reconciler.drain().await.unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.failed, 2);
        assert!(!report.is_clean());
        assert_eq!(queue.list_unsynced().await.unwrap().len(), 2);
        assert_eq!(queue.list_all().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_declined_records_skipped() {
        let queue = Arc::new(DurableQueue::temporary());
        let ledger = Arc::new(FakeLedger::default());
        let record = queue.put(new_tx("1")).await.unwrap();
        queue.set_outcome(&record.id, Outcome::Declined).await.unwrap();

        let reconciler = Reconciler::new(Arc::clone(&queue), ledger.clone());
        let report = reconciler.drain().await.unwrap();
        assert_eq!(report.skipped, 1);
        assert_eq!(report.attempted, 0);
        assert!(ledger.posted.lock().unwrap().is_empty());
        assert_eq!(queue.list_unsynced().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_drain_is_single_flight() {
        let queue = Arc::new(DurableQueue::temporary());
        let ledger = Arc::new(FakeLedger {
            delay_ms: 50,
            ..Default::default()
        });
        queue.put(new_tx("1")).await.unwrap();

        let reconciler = Arc::new(Reconciler::new(Arc::clone(&queue), ledger.clone()));
        let (a, b) = tokio::join!(reconciler.drain(), reconciler.drain());
        let (a, b) = (a.unwrap(), b.unwrap());

        assert!(a.already_running ^ b.already_running);
        assert_eq!(ledger.posted.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_task_drains_on_reconnect() {
        let queue = Arc::new(DurableQueue::temporary());
        let ledger = Arc::new(FakeLedger::default());
        let record = queue.put(new_tx("5")).await.unwrap();

        let registry = Arc::new(SyncRegistry::new());
        registry.register(super::super::BACKGROUND_SYNC_TAG).await;
        let connectivity = Arc::new(Connectivity::new(false));
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&queue), ledger));
        let task = spawn_reconciliation_task(
            reconciler,
            Arc::clone(&registry),
            Arc::clone(&connectivity),
        );

        connectivity.set_online(true);
        for _ in 0..50 {
            if queue.get(&record.id).await.unwrap().unwrap().synced {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(queue.get(&record.id).await.unwrap().unwrap().synced);
        assert!(!registry.has_pending());
        task.abort();
    }
}
