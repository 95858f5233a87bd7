//! User attestation of payment outcome
//!
//! The external app never reports back. When the user returns to the app
//! (visibility regained) with a payment in flight, they are asked whether it
//! went through, and their answer is the only completion signal.

use chrono::{DateTime, Utc};
use std::sync::Mutex;

use super::builder::Amount;

/// User-reported outcome of a dispatched payment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    #[default]
    Unknown,
    Confirmed,
    Declined,
}

/// A payment handed to an external app and not yet attested
#[derive(Debug, Clone, PartialEq)]
pub struct PendingPayment {
    /// Local record id, absent when durability was skipped
    pub record_id: Option<String>,
    pub upi_id: String,
    pub amount: Amount,
    pub note: String,
    pub dispatched_at: DateTime<Utc>,
}

/// Question put to the user when they come back
#[derive(Debug, Clone, PartialEq)]
pub struct AttestationPrompt {
    pub payment: PendingPayment,
    pub message: String,
}

/// Holds at most one in-flight payment per page
#[derive(Debug, Default)]
pub struct AttestationTracker {
    pending: Mutex<Option<PendingPayment>>,
}

impl AttestationTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a dispatched payment, replacing any earlier one
    pub fn track(&self, payment: PendingPayment) {
        if let Ok(mut slot) = self.pending.lock() {
            *slot = Some(payment);
        }
    }

    pub fn pending(&self) -> Option<PendingPayment> {
        self.pending.lock().ok().and_then(|slot| slot.clone())
    }

    /// Visibility-change signal. Regaining visibility with a payment in
    /// flight yields the prompt and clears the pending slot.
    pub fn on_visibility_change(&self, visible: bool) -> Option<AttestationPrompt> {
        if !visible {
            return None;
        }
        let payment = self.pending.lock().ok()?.take()?;
        let message = format!(
            "Did your payment of {} to {} complete successfully?",
            payment.amount.display_inr(),
            payment.upi_id
        );
        Some(AttestationPrompt { payment, message })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment() -> PendingPayment {
        PendingPayment {
            record_id: Some("r1".into()),
            upi_id: "user@bank".into(),
            amount: "150".parse().unwrap(),
            note: "lunch".into(),
            dispatched_at: Utc::now(),
        }
    }

    #[test]
    fn test_prompt_only_when_visible_and_pending() {
        let tracker = AttestationTracker::new();
        assert!(tracker.on_visibility_change(true).is_none());

        tracker.track(payment());
        assert!(tracker.on_visibility_change(false).is_none());
        assert!(tracker.pending().is_some());

        let prompt = tracker.on_visibility_change(true).unwrap();
        assert_eq!(
            prompt.message,
            "Did your payment of ₹150.00 to user@bank complete successfully?"
        );
        assert!(tracker.pending().is_none());
        assert!(tracker.on_visibility_change(true).is_none());
    }
}
