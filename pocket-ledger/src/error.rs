//! Ledger error types
//!
//! Every variant maps to one HTTP status and a `{"error": …}` body.

use hyper::StatusCode;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("User not found")]
    UserNotFound,

    #[error("Pocket not found")]
    PocketNotFound,

    #[error("Invalid transaction type")]
    InvalidType,

    #[error("{0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl LedgerError {
    pub fn status(&self) -> StatusCode {
        match self {
            LedgerError::UserNotFound => StatusCode::NOT_FOUND,
            LedgerError::PocketNotFound | LedgerError::InvalidType | LedgerError::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            LedgerError::Database(_) | LedgerError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message sent to clients. Internal failures are not described.
    pub fn public_message(&self) -> String {
        match self {
            LedgerError::Database(_) | LedgerError::Io(_) => "Server error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<bson::ser::Error> for LedgerError {
    fn from(e: bson::ser::Error) -> Self {
        LedgerError::Database(format!("Serialization failed: {}", e))
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
