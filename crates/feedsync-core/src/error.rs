//! Error types for Feedsync

use thiserror::Error;

/// Main error type for Feedsync operations
#[derive(Error, Debug)]
pub enum SyncError {
    /// Connecting to the remote peer failed; fatal, never retried
    #[error("Connection error: {0}")]
    Connection(String),

    /// Strict hash-chain validation failed; fatal for the current feed's
    /// stream and the remainder of the sync pass
    #[error("Chain validation error: {0}")]
    ChainValidation(String),

    /// A single message failed relaxed validation (signature or shape);
    /// recorded per message, the scan continues without it
    #[error("Message validation error: {0}")]
    MessageValidation(String),

    /// Error during storage operations
    #[error("Storage error: {0}")]
    Store(String),

    /// Transport-level error in the middle of a fetch; fatal
    #[error("Stream error: {0}")]
    Stream(String),

    /// Database creation/opening error
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    /// Transaction error
    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    /// Table error
    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    /// Storage operation error
    #[error("Storage operation error: {0}")]
    StorageOp(#[from] redb::StorageError),

    /// Commit error
    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    /// Error during serialization/deserialization
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Identity-related error (feed ids, keys, signatures)
    #[error("Identity error: {0}")]
    Identity(String),

    /// A long-running fold was cancelled by its abort handle
    #[error("Operation aborted")]
    Aborted,

    /// General I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    /// Whether this error came from the store side of a per-message append.
    ///
    /// Store failures are soft: the replication stream logs them and keeps
    /// going. Everything else aborts the stream that produced it.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            SyncError::Store(_)
                | SyncError::Database(_)
                | SyncError::Transaction(_)
                | SyncError::Table(_)
                | SyncError::StorageOp(_)
                | SyncError::Commit(_)
        )
    }
}

/// Result type alias using SyncError
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::ChainValidation("sequence gap".to_string());
        assert_eq!(format!("{}", err), "Chain validation error: sequence gap");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let sync_err: SyncError = io_err.into();
        assert!(matches!(sync_err, SyncError::Io(_)));
    }

    #[test]
    fn test_store_errors_are_soft() {
        assert!(SyncError::Store("disk full".to_string()).is_store_error());
        assert!(!SyncError::ChainValidation("gap".to_string()).is_store_error());
        assert!(!SyncError::Stream("reset".to_string()).is_store_error());
        assert!(!SyncError::Aborted.is_store_error());
    }
}
