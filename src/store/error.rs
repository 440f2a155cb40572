//! Store error types

use thiserror::Error;

/// Errors that can occur in the document store
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite reported a failure
    #[error("Database error: {0}")]
    Database(String),

    /// I/O operation failed (opening the database file)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Input rejected by a store-level rule
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced document does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Lock acquisition failed
    #[error("Lock error: {0}")]
    Lock(String),

    /// A blocking store task panicked or was cancelled
    #[error("Store task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Task(err.to_string())
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::Validation("at least 2 unique members required".to_string());
        assert_eq!(
            err.to_string(),
            "Validation error: at least 2 unique members required"
        );
    }

    #[test]
    fn test_sqlite_error_conversion() {
        let err: StoreError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, StoreError::Database(_)));
    }
}
