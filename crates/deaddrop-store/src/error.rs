use deaddrop_shared::error::{CryptoError, LookupError, ProtocolError};
use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem error in the file mailbox backend.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A stored key failed to parse.
    #[error("Corrupt key record: {0}")]
    Crypto(#[from] CryptoError),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),

    /// A lock guarding a backend was poisoned by a panicking holder.
    #[error("Store lock poisoned")]
    LockPoisoned,

    /// The key, name or address has no current binding.
    #[error("Record not found")]
    NotFound,

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Not authorized: {0}")]
    NotAuthorized(String),

    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Invalid request: {0}")]
    Invalid(String),
}

impl From<ProtocolError> for StoreError {
    fn from(e: ProtocolError) -> Self {
        StoreError::Invalid(e.to_string())
    }
}

impl From<StoreError> for LookupError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound => LookupError::NotFound,
            other => LookupError::Internal(other.to_string()),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
