//! Pocket accounting rules
//!
//! A credit raises the pocket balance. A debit lowers the balance and
//! raises `spent` by the same amount. Balances may go negative.

use serde::Serialize;
use std::str::FromStr;

use crate::db::schemas::{PocketDoc, TransactionDoc, UserDoc};
use crate::error::{LedgerError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxKind {
    Credit,
    Debit,
}

impl FromStr for TxKind {
    type Err = LedgerError;

    /// Exact, case-sensitive match
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "credit" => Ok(TxKind::Credit),
            "debit" => Ok(TxKind::Debit),
            _ => Err(LedgerError::InvalidType),
        }
    }
}

/// Change applied to one pocket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PocketDelta {
    pub balance: f64,
    pub spent: f64,
}

impl TxKind {
    pub fn delta(self, amount: f64) -> PocketDelta {
        match self {
            TxKind::Credit => PocketDelta {
                balance: amount,
                spent: 0.0,
            },
            TxKind::Debit => PocketDelta {
                balance: -amount,
                spent: amount,
            },
        }
    }
}

impl PocketDoc {
    pub fn apply(&mut self, delta: PocketDelta) {
        self.balance += delta.balance;
        self.spent += delta.spent;
    }
}

/// What the client gets back after a transaction is recorded
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionReceipt {
    pub name: String,
    pub pocket: PocketDoc,
    pub transaction: TransactionDoc,
}

/// Check a transaction against a user without changing anything.
/// Pocket existence is checked before the type.
pub fn validate(user: &UserDoc, tx: &TransactionDoc) -> Result<PocketDelta> {
    if user.pocket(&tx.pocket).is_none() {
        return Err(LedgerError::PocketNotFound);
    }
    let kind: TxKind = tx.tx_type.parse()?;
    Ok(kind.delta(tx.amount))
}

/// Record `tx` on `user`: adjust the pocket and append to the log
pub fn apply_transaction(user: &mut UserDoc, tx: TransactionDoc) -> Result<TransactionReceipt> {
    let delta = validate(user, &tx)?;
    let pocket = user
        .pockets
        .iter_mut()
        .find(|p| p.name == tx.pocket)
        .ok_or(LedgerError::PocketNotFound)?;
    pocket.apply(delta);
    let pocket = pocket.clone();

    user.transactions.push(tx.clone());

    Ok(TransactionReceipt {
        name: user.name.clone(),
        pocket,
        transaction: tx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::oid::ObjectId;

    fn user() -> UserDoc {
        let mut user = UserDoc::with_default_pockets(ObjectId::new(), "Asha", 0.0);
        user.pockets[0] = PocketDoc {
            name: "Food".into(),
            balance: 500.0,
            spent: 50.0,
        };
        user
    }

    fn tx(pocket: &str, kind: &str, amount: f64) -> TransactionDoc {
        TransactionDoc {
            pocket: pocket.into(),
            tx_type: kind.into(),
            amount,
            upi_id: "shop@okbank".into(),
            payee: "Shop".into(),
            message: None,
        }
    }

    #[test]
    fn test_debit_moves_balance_into_spent() {
        let mut user = user();
        let receipt = apply_transaction(&mut user, tx("Food", "debit", 100.0)).unwrap();
        assert_eq!(
            receipt.pocket,
            PocketDoc {
                name: "Food".into(),
                balance: 400.0,
                spent: 150.0
            }
        );
        assert_eq!(receipt.name, "Asha");
        assert_eq!(user.transactions.len(), 1);
    }

    #[test]
    fn test_credit_only_raises_balance() {
        let mut user = user();
        let receipt = apply_transaction(&mut user, tx("Food", "credit", 25.5)).unwrap();
        assert_eq!(receipt.pocket.balance, 525.5);
        assert_eq!(receipt.pocket.spent, 50.0);
    }

    #[test]
    fn test_rejections_leave_user_untouched() {
        let mut user = user();
        assert!(matches!(
            apply_transaction(&mut user, tx("Rent", "debit", 1.0)),
            Err(LedgerError::PocketNotFound)
        ));
        assert!(matches!(
            apply_transaction(&mut user, tx("Food", "Debit", 1.0)),
            Err(LedgerError::InvalidType)
        ));
        // Unknown pocket wins over a bad type
        assert!(matches!(
            apply_transaction(&mut user, tx("Rent", "refund", 1.0)),
            Err(LedgerError::PocketNotFound)
        ));
        assert!(user.transactions.is_empty());
        assert_eq!(user.pocket("Food").map(|p| p.balance), Some(500.0));
    }

    #[test]
    fn test_debit_can_overdraw() {
        let mut user = user();
        let receipt = apply_transaction(&mut user, tx("Food", "debit", 900.0)).unwrap();
        assert_eq!(receipt.pocket.balance, -400.0);
    }
}
