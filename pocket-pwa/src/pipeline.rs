//! Payment submission pipeline
//!
//! validate and build → persist locally → hand off to a payment app →
//! schedule reconciliation. Validation fails before any I/O. A storage
//! failure is logged and the handoff still happens.

use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::error::{PwaError, Result};
use crate::intent::{
    build_intent, Amount, AttestationPrompt, AttestationTracker, IntentUri, LaunchReport, Launcher,
    Outcome, PaymentRequest, PendingPayment, Platform, UpiId,
};
use crate::queue::{DurableQueue, NewTransaction, TransactionRecord, TxType};
use crate::sync::{Connectivity, SyncRegistry, BACKGROUND_SYNC_TAG};

/// Raw form input, validated on submit
#[derive(Debug, Clone)]
pub struct PaymentForm {
    pub upi_id: String,
    pub amount: String,
    pub note: Option<String>,
    pub pocket: String,
    pub tx_type: TxType,
    pub transaction_id: Option<String>,
    pub merchant_code: Option<String>,
}

impl PaymentForm {
    pub fn new(upi_id: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            upi_id: upi_id.into(),
            amount: amount.into(),
            note: None,
            pocket: "Food".to_string(),
            tx_type: TxType::Debit,
            transaction_id: None,
            merchant_code: None,
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }
}

/// What happened to one submission
#[derive(Debug)]
pub struct SubmissionOutcome {
    pub intent: IntentUri,
    /// None when local persistence failed
    pub record: Option<TransactionRecord>,
    pub launch: LaunchReport,
    pub online: bool,
    /// A background sync was registered for later replay
    pub sync_registered: bool,
}

pub struct PaymentPipeline<P: Platform> {
    queue: Arc<DurableQueue>,
    launcher: Launcher<P>,
    registry: Arc<SyncRegistry>,
    connectivity: Arc<Connectivity>,
    attestation: AttestationTracker,
}

impl<P: Platform> PaymentPipeline<P> {
    pub fn new(
        queue: Arc<DurableQueue>,
        launcher: Launcher<P>,
        registry: Arc<SyncRegistry>,
        connectivity: Arc<Connectivity>,
    ) -> Self {
        Self {
            queue,
            launcher,
            registry,
            connectivity,
            attestation: AttestationTracker::new(),
        }
    }

    pub fn queue(&self) -> &Arc<DurableQueue> {
        &self.queue
    }

    pub async fn submit(&self, form: PaymentForm) -> Result<SubmissionOutcome> {
        let upi_id = UpiId::parse(form.upi_id.trim())?;
        let amount: Amount = form.amount.parse()?;
        let note = form.note.filter(|n| !n.trim().is_empty());

        let mut request = PaymentRequest::new(upi_id.clone(), amount);
        request.note = note.clone();
        request.transaction_id = form.transaction_id;
        request.merchant_code = form.merchant_code;
        let intent = build_intent(&request);

        let record = match self
            .queue
            .put(NewTransaction {
                upi_id: upi_id.clone(),
                amount,
                note,
                pocket: form.pocket,
                tx_type: form.tx_type,
                payee: None,
            })
            .await
        {
            Ok(record) => Some(record),
            Err(e) => {
                error!(error = %e, "Could not persist transaction, continuing without durability");
                None
            }
        };

        let launch = self.launcher.launch(&intent).await?;

        self.attestation.track(PendingPayment {
            record_id: record.as_ref().map(|r| r.id.clone()),
            upi_id: upi_id.to_string(),
            amount,
            note: request.effective_note(),
            dispatched_at: Utc::now(),
        });

        let online = self.connectivity.is_online();
        let sync_registered = if online {
            self.registry.wake();
            false
        } else {
            let registered = self.registry.register(BACKGROUND_SYNC_TAG).await;
            if !registered {
                warn!("Background sync unavailable; record syncs next time the app runs online");
            }
            registered
        };

        info!(
            upi_id = %upi_id,
            amount = %amount,
            online,
            state = ?launch.state,
            "Payment submitted"
        );

        Ok(SubmissionOutcome {
            intent,
            record,
            launch,
            online,
            sync_registered,
        })
    }

    /// Visibility signal from the host; yields the attestation prompt
    pub fn on_visibility_change(&self, visible: bool) -> Option<AttestationPrompt> {
        self.attestation.on_visibility_change(visible)
    }

    /// Record the user's answer about a dispatched payment
    pub async fn attest(&self, record_id: &str, confirmed: bool) -> Result<TransactionRecord> {
        let outcome = if confirmed {
            Outcome::Confirmed
        } else {
            Outcome::Declined
        };
        self.queue
            .set_outcome(record_id, outcome)
            .await
            .map_err(PwaError::from)
    }
}
