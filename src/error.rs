use crate::domain::status::TransactionStatus;
use crate::domain::transaction::TransactionId;
use crate::domain::transition::Rejection;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("Transaction not found: {0}")]
    NotFound(TransactionId),

    #[error("Transaction {id} is {status}; {action} is not allowed")]
    InvalidState {
        id: TransactionId,
        status: TransactionStatus,
        action: &'static str,
    },

    #[error("Transition on {id} rejected: {reason}")]
    Rejected { id: TransactionId, reason: Rejection },

    #[error("Version conflict on transaction {id}: expected {expected}, found {found}")]
    VersionConflict {
        id: TransactionId,
        expected: u64,
        found: u64,
    },

    /// The status write is durable but a trace append after it failed.
    #[error("Transaction {id} committed as {committed} but a side effect failed: {source}")]
    SideEffectFailure {
        id: TransactionId,
        committed: TransactionStatus,
        #[source]
        source: Box<LifecycleError>,
    },

    /// The ledger append failed and the status was restored to `restored`.
    #[error("Ledger append for {id} failed, status restored to {restored}: {source}")]
    LedgerRolledBack {
        id: TransactionId,
        restored: TransactionStatus,
        #[source]
        source: Box<LifecycleError>,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDbError(#[from] rocksdb::Error),
}

impl LifecycleError {
    /// Whether the error was caused by the caller's input or the transaction's state
    /// rather than by infrastructure.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LifecycleError::NotFound(_)
                | LifecycleError::InvalidState { .. }
                | LifecycleError::Rejected { .. }
                | LifecycleError::ValidationError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
