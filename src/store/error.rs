//! Store error types
//!
//! Defines all errors that can occur in the persistence layer.

use thiserror::Error;

/// Errors that can occur in the message/account store
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing database could not serve the request
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A uniqueness constraint was violated (duplicate username, id, ...)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Requested record does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A stored row could not be decoded
    #[error("Corrupt row: {0}")]
    Corruption(String),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                StoreError::Conflict(err.to_string())
            }
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..) => StoreError::Corruption(err.to_string()),
            _ => StoreError::Unavailable(err.to_string()),
        }
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;
