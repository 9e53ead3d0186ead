//! Store error taxonomy shared by the session store, history archive and
//! escalation ledger backings.

use thiserror::Error;

/// Errors from store backings
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Key not found: {0}")]
    NotFound(String),

    #[error("Stored document for {found} was read under key {expected}")]
    KeyMismatch { expected: String, found: String },

    #[error("Lock poisoned")]
    LockPoisoned,
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
