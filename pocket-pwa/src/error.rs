//! Error types for pocket-pwa
//!
//! Every failure in the submission pipeline lands in one of these variants.
//! None of them is fatal: validation errors go back to the user, storage and
//! sync errors are logged, network errors become cached or synthetic
//! responses inside the worker.

use thiserror::Error;

/// Rejected payment parameters. Raised before any I/O happens.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("UPI ID and amount are required")]
    Missing,

    #[error("Invalid UPI ID '{0}' (expected user@bank)")]
    InvalidUpiId(String),

    #[error("Invalid amount '{0}'")]
    InvalidAmount(String),

    #[error("Invalid UPI intent: {0}")]
    InvalidIntent(String),

    #[error("Invalid transaction type '{0}' (expected credit or debit)")]
    InvalidType(String),
}

/// Local persistence failures (store unavailable, full, corrupt record)
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Transaction not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Schema migration failed: {0}")]
    Migration(String),
}

/// Transport failure talking to the origin or the ledger
#[derive(Error, Debug, Clone)]
pub enum NetworkError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl From<reqwest::Error> for NetworkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            NetworkError::Timeout(e.to_string())
        } else if e.is_builder() {
            NetworkError::InvalidRequest(e.to_string())
        } else {
            NetworkError::Connection(e.to_string())
        }
    }
}

/// Per-record reconciliation failure. The record stays pending.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Ledger unreachable: {0}")]
    Network(#[from] NetworkError),

    #[error("Ledger rejected transaction ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("Could not mark record synced: {0}")]
    Storage(#[from] StorageError),
}

/// Camera failures, mapped once from the platform's error names
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CameraError {
    #[error("Camera permission denied. Please allow camera access.")]
    PermissionDenied,

    #[error("No camera found on this device.")]
    NotFound,

    #[error("Camera is already in use by another application.")]
    InUse,

    #[error("Camera constraints not supported.")]
    Overconstrained,

    #[error("Camera access requires HTTPS on mobile devices.")]
    InsecureContext,

    #[error("Camera access is not supported in this context.")]
    Unsupported,

    #[error("Failed to start camera: {0}")]
    Other(String),
}

impl CameraError {
    /// Map a platform media error name (`NotAllowedError`, ...) to a variant
    pub fn from_platform(name: &str, message: &str) -> Self {
        match name {
            "NotAllowedError" | "PermissionDeniedError" | "SecurityError" => {
                CameraError::PermissionDenied
            }
            "NotFoundError" | "DevicesNotFoundError" => CameraError::NotFound,
            "NotReadableError" | "TrackStartError" => CameraError::InUse,
            "OverconstrainedError" | "ConstraintNotSatisfiedError" => CameraError::Overconstrained,
            "TypeError" if message.contains("secure") => CameraError::InsecureContext,
            _ if message.is_empty() => CameraError::Other("Unknown error occurred.".into()),
            _ => CameraError::Other(message.to_string()),
        }
    }
}

/// Top-level error for the pipeline
#[derive(Error, Debug)]
pub enum PwaError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("No UPI app can be launched on this platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Network error: {0}")]
    Network(#[from] NetworkError),

    #[error("Sync error: {0}")]
    Sync(#[from] SyncError),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, PwaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_error_mapping() {
        assert_eq!(
            CameraError::from_platform("NotAllowedError", ""),
            CameraError::PermissionDenied
        );
        assert_eq!(CameraError::from_platform("NotFoundError", ""), CameraError::NotFound);
        assert_eq!(CameraError::from_platform("NotReadableError", ""), CameraError::InUse);
        assert_eq!(
            CameraError::from_platform("OverconstrainedError", ""),
            CameraError::Overconstrained
        );
        assert_eq!(
            CameraError::from_platform("AbortError", "device lost"),
            CameraError::Other("device lost".into())
        );
    }

    #[test]
    fn test_validation_wraps_into_pwa_error() {
        let err: PwaError = ValidationError::InvalidAmount("0".into()).into();
        assert!(matches!(err, PwaError::Validation(_)));
        assert!(err.to_string().contains("Invalid amount"));
    }
}
