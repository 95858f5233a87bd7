//! Client for the ledger's transaction endpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::{NetworkError, SyncError};
use crate::intent::{Amount, UpiId};
use crate::queue::{NewTransaction, TransactionRecord, TxType};

/// Body of `POST /api/user/transaction`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerTransaction {
    pub pocket: String,
    #[serde(rename = "type")]
    pub tx_type: TxType,
    pub amount: Amount,
    pub upi_id: UpiId,
    #[serde(default)]
    pub payee: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl LedgerTransaction {
    /// Replay form of a queued record: the stored payee or else the UPI id,
    /// message the note
    pub fn from_record(record: &TransactionRecord) -> Self {
        Self {
            pocket: record.pocket.clone(),
            tx_type: record.tx_type,
            amount: record.amount,
            upi_id: record.upi_id.clone(),
            payee: Some(
                record
                    .payee
                    .clone()
                    .unwrap_or_else(|| record.upi_id.to_string()),
            ),
            message: record.note.clone(),
        }
    }

    pub fn into_new_transaction(self) -> NewTransaction {
        NewTransaction {
            upi_id: self.upi_id,
            amount: self.amount,
            note: self.message,
            pocket: self.pocket,
            tx_type: self.tx_type,
            payee: self.payee,
        }
    }
}

/// Successful ledger reply
#[derive(Debug, Clone)]
pub struct LedgerAck {
    pub message: String,
    pub body: serde_json::Value,
}

#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn post_transaction(&self, tx: &LedgerTransaction) -> Result<LedgerAck, SyncError>;

    /// Reachability check against the health route
    async fn ping(&self) -> Result<(), NetworkError>;
}

/// Ledger over HTTP
#[derive(Clone)]
pub struct HttpLedgerClient {
    client: reqwest::Client,
    base_url: url::Url,
}

impl HttpLedgerClient {
    pub fn new(base_url: url::Url, timeout: Duration) -> Result<Self, NetworkError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> Result<url::Url, NetworkError> {
        self.base_url
            .join(path)
            .map_err(|e| NetworkError::InvalidRequest(e.to_string()))
    }
}

#[async_trait]
impl LedgerClient for HttpLedgerClient {
    async fn post_transaction(&self, tx: &LedgerTransaction) -> Result<LedgerAck, SyncError> {
        let url = self.endpoint("/api/user/transaction")?;
        debug!(url = %url, upi_id = %tx.upi_id, "Posting transaction to ledger");

        let response = self
            .client
            .post(url)
            .json(tx)
            .send()
            .await
            .map_err(NetworkError::from)?;

        let status = response.status();
        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);

        if !status.is_success() {
            let message = body
                .get("error")
                .or_else(|| body.get("message"))
                .and_then(|m| m.as_str())
                .unwrap_or("request failed")
                .to_string();
            return Err(SyncError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        let message = body
            .get("message")
            .and_then(|m| m.as_str())
            .unwrap_or_default()
            .to_string();
        Ok(LedgerAck { message, body })
    }

    async fn ping(&self) -> Result<(), NetworkError> {
        let response = self.client.get(self.endpoint("/api")?).send().await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(NetworkError::Connection(format!(
                "health check returned {}",
                response.status()
            )))
        }
    }
}
