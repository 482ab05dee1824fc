//! Error types for eballscan

use std::num::ParseIntError;
use thiserror::Error;

/// A request field that could not be turned into the value a handler needs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("parsing {raw:?} for field {field:?}: {source}")]
    InvalidInteger {
        field: String,
        raw: String,
        source: ParseIntError,
    },
    #[error("field {field:?} {requirement}, got {value}")]
    OutOfRange {
        field: String,
        value: i64,
        requirement: &'static str,
    },
}

impl ValidationError {
    /// Name of the form field that failed.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::InvalidInteger { field, .. } => field,
            ValidationError::OutOfRange { field, .. } => field,
        }
    }
}

/// Failures reported by a storage backend. The message is shown to clients verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0} already exists")]
    AlreadyExists(String),
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("Storage lock poisoned")]
    LockPoisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::DatabaseError(err.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for StoreError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        StoreError::LockPoisoned
    }
}

/// Convenience alias used across the storage layer
pub type Result<T> = std::result::Result<T, StoreError>;
