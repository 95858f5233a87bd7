//! Command-line entry points
//!
//! `serve` runs the caching worker daemon with background reconciliation.
//! The other commands are one-shot operations against the local queue.

use anyhow::Context;
use clap::Subcommand;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Args;
use crate::error::PwaError;
use crate::intent::{parse_intent, Launcher, Outcome, TerminalPlatform};
use crate::pipeline::{PaymentForm, PaymentPipeline};
use crate::queue::{
    AmountRange, DateRange, DurableQueue, HistoryFilter, HistoryStats, StatusFilter,
    TransactionRecord, TxType,
};
use crate::sync::{
    spawn_connectivity_probe, spawn_reconciliation_task, Connectivity, HttpLedgerClient,
    LedgerClient, Reconciler, SyncRegistry,
};
use crate::worker::{
    server, spawn_install_task, CacheStorage, HttpUpstream, ServiceWorker, WorkerConfig,
};

const INSTALL_RETRY: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Run the caching worker in front of the app origin
    Serve,

    /// Build a UPI intent, record it locally and hand it to a payment app
    Pay {
        /// Payee VPA, e.g. merchant@okbank
        upi_id: String,
        /// Amount in rupees
        amount: String,
        #[arg(short, long)]
        note: Option<String>,
        #[arg(short, long, default_value = "Food")]
        pocket: String,
        #[arg(long = "type", value_enum, default_value = "debit")]
        tx_type: TxType,
        /// Merchant transaction reference (tr)
        #[arg(long)]
        transaction_id: Option<String>,
        /// Merchant category code (mc)
        #[arg(long)]
        merchant_code: Option<String>,
    },

    /// Show local transactions
    History {
        #[arg(long, value_enum, default_value = "all")]
        date: DateRange,
        #[arg(long, value_enum, default_value = "all")]
        amount: AmountRange,
        #[arg(long, value_enum, default_value = "all")]
        status: StatusFilter,
        /// Print records and stats as JSON
        #[arg(long)]
        json: bool,
    },

    /// Record whether a dispatched payment went through
    Attest {
        id: String,
        /// The payment did not complete
        #[arg(long)]
        declined: bool,
    },

    /// Replay pending transactions to the ledger now
    Sync,

    /// Parse a scanned QR payload into form fields
    Decode { payload: String },
}

pub async fn run(args: Args) -> anyhow::Result<()> {
    match args.command.clone() {
        Command::Serve => serve(&args).await,
        Command::Pay {
            upi_id,
            amount,
            note,
            pocket,
            tx_type,
            transaction_id,
            merchant_code,
        } => {
            let form = PaymentForm {
                upi_id,
                amount,
                note,
                pocket,
                tx_type,
                transaction_id,
                merchant_code,
            };
            pay(&args, form).await
        }
        Command::History {
            date,
            amount,
            status,
            json,
        } => {
            let filter = HistoryFilter {
                date_range: date,
                amount_range: amount,
                status,
            };
            history(&args, filter, json).await
        }
        Command::Attest { id, declined } => attest(&args, &id, !declined).await,
        Command::Sync => sync_now(&args).await,
        Command::Decode { payload } => {
            let intent = parse_intent(&payload)?;
            println!("{}", serde_json::to_string_pretty(&intent)?);
            Ok(())
        }
    }
}

// =============================================================================
// Shared setup
// =============================================================================

async fn open_queue(args: &Args) -> anyhow::Result<Arc<DurableQueue>> {
    let queue = DurableQueue::new(args.data_dir.join("transactions"));
    queue
        .init()
        .await
        .with_context(|| format!("opening queue in {}", args.data_dir.display()))?;
    Ok(Arc::new(queue))
}

async fn open_registry(args: &Args, queue: &Arc<DurableQueue>) -> Arc<SyncRegistry> {
    if args.no_background_sync {
        warn!("Background sync disabled; pending records replay on the next online run");
        Arc::new(SyncRegistry::unsupported())
    } else {
        Arc::new(SyncRegistry::persistent(Arc::clone(queue)).await)
    }
}

fn ledger_client(args: &Args) -> anyhow::Result<Arc<dyn LedgerClient>> {
    let base = args.api_base_url().map_err(PwaError::Config)?;
    Ok(Arc::new(HttpLedgerClient::new(base, args.request_timeout())?))
}

// =============================================================================
// Commands
// =============================================================================

async fn serve(args: &Args) -> anyhow::Result<()> {
    let queue = open_queue(args).await?;
    let registry = open_registry(args, &queue).await;
    let client = ledger_client(args)?;

    let config = WorkerConfig {
        origin: args.origin().map_err(PwaError::Config)?,
        api_origin: args.api_base_url().map_err(PwaError::Config)?,
        version: args.cache_version,
    };
    let upstream = Arc::new(HttpUpstream::new(args.request_timeout(), &args.user_agent)?);
    let worker = Arc::new(ServiceWorker::new(
        config,
        Arc::new(CacheStorage::new()),
        upstream,
        Arc::clone(&queue),
        Arc::clone(&registry),
    ));

    let connectivity = Arc::new(Connectivity::new(client.ping().await.is_ok()));
    let reconciler = Arc::new(Reconciler::new(Arc::clone(&queue), Arc::clone(&client)));

    let install = spawn_install_task(Arc::clone(&worker), INSTALL_RETRY);
    let probe = spawn_connectivity_probe(Arc::clone(&connectivity), client, args.probe_interval());
    let reconcile = spawn_reconciliation_task(reconciler, registry, connectivity);

    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal");
            let _ = shutdown_tx.send(()).await;
        }
    });

    server::run(args.listen, worker, shutdown_rx).await?;

    install.abort();
    probe.abort();
    reconcile.abort();
    queue.flush().await?;
    Ok(())
}

async fn pay(args: &Args, form: PaymentForm) -> anyhow::Result<()> {
    let queue = open_queue(args).await?;
    let registry = open_registry(args, &queue).await;
    let client = ledger_client(args)?;

    let online = client.ping().await.is_ok();
    let connectivity = Arc::new(Connectivity::new(online));
    let launcher = Launcher::new(TerminalPlatform::new(&args.user_agent));
    let pipeline = PaymentPipeline::new(
        Arc::clone(&queue),
        launcher,
        Arc::clone(&registry),
        connectivity,
    );

    let outcome = pipeline.submit(form).await?;

    match &outcome.record {
        Some(record) => println!("Recorded {} (pending sync)", record.id),
        None => println!("Payment was not recorded locally"),
    }

    if outcome.online {
        let report = Reconciler::new(Arc::clone(&queue), client).drain().await?;
        if report.is_clean() {
            registry.complete_all().await;
        }
        println!("Synced {} of {} pending", report.synced, report.attempted);
    } else if outcome.sync_registered {
        println!("Offline: will sync when the ledger is reachable");
    }

    if let Some(record) = outcome.record {
        println!(
            "Run `pocket-pwa attest {}` (or with --declined) once the payment app returns",
            record.id
        );
    }

    queue.flush().await?;
    Ok(())
}

async fn history(args: &Args, filter: HistoryFilter, json: bool) -> anyhow::Result<()> {
    let queue = open_queue(args).await?;
    let records = filter.apply(&queue.list_all().await?, chrono::Utc::now());
    let stats = HistoryStats::from_records(&records);

    if json {
        let out = serde_json::json!({ "transactions": records, "stats": stats });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    for record in &records {
        println!("{}", history_line(record));
    }
    println!(
        "{} transactions, {} synced, {} pending, {} declined, total ₹{}",
        stats.total, stats.synced, stats.pending, stats.declined, stats.total_amount
    );
    Ok(())
}

fn history_line(record: &TransactionRecord) -> String {
    let status = match (record.synced, record.outcome) {
        (_, Outcome::Declined) => "declined",
        (true, _) => "synced",
        (false, _) => "pending",
    };
    format!(
        "{}  {}  {:<24} {:>10}  {:<12} {:<6} {}",
        record.timestamp.format("%Y-%m-%d %H:%M"),
        record.id,
        record.upi_id,
        record.amount.display_inr(),
        record.pocket,
        record.tx_type,
        status
    )
}

async fn attest(args: &Args, id: &str, confirmed: bool) -> anyhow::Result<()> {
    let queue = open_queue(args).await?;
    let outcome = if confirmed {
        Outcome::Confirmed
    } else {
        Outcome::Declined
    };
    let record = queue.set_outcome(id, outcome).await?;
    queue.flush().await?;
    println!("{} marked {:?}", record.id, record.outcome);
    Ok(())
}

async fn sync_now(args: &Args) -> anyhow::Result<()> {
    let queue = open_queue(args).await?;
    let registry = open_registry(args, &queue).await;
    let reconciler = Reconciler::new(Arc::clone(&queue), ledger_client(args)?);

    let report = reconciler.drain().await?;
    if report.is_clean() {
        registry.complete_all().await;
    }
    queue.flush().await?;

    println!(
        "attempted {}, synced {}, failed {}, skipped {}",
        report.attempted, report.synced, report.failed, report.skipped
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::{Amount, UpiId};
    use crate::queue::NewTransaction;
    use chrono::Utc;

    #[test]
    fn test_history_line_status() {
        let mut record = TransactionRecord::create(
            NewTransaction {
                upi_id: UpiId::parse("shop@okbank").unwrap(),
                amount: Amount::from_paise(12_050).unwrap(),
                note: None,
                pocket: "Food".into(),
                tx_type: TxType::Debit,
                payee: None,
            },
            Utc::now(),
        );
        assert!(history_line(&record).ends_with("pending"));
        record.synced = true;
        assert!(history_line(&record).ends_with("synced"));
        record.outcome = Outcome::Declined;
        assert!(history_line(&record).ends_with("declined"));
    }
}
