use super::ledger::LedgerEntry;
use super::status::TransactionStatus;
use super::trace::{Trace, TraceRecord};
use super::transaction::{Transaction, TransactionId};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

#[async_trait]
pub trait TransactionStore: Send + Sync {
    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>>;

    /// Persists `tx`.
    ///
    /// With `expected_version: None` the record must not exist yet. With
    /// `Some(v)` the write is accepted only if the stored version is still `v`,
    /// otherwise it fails with `LifecycleError::VersionConflict`. The check and
    /// the write are atomic. Returns the stored record with its new version.
    async fn save(&self, tx: Transaction, expected_version: Option<u64>) -> Result<Transaction>;

    async fn find_by_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>>;

    async fn all(&self) -> Result<Vec<Transaction>>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn append(&self, entry: LedgerEntry) -> Result<()>;
    async fn entries_for(&self, id: TransactionId) -> Result<Vec<LedgerEntry>>;
}

#[async_trait]
pub trait TraceStore: Send + Sync {
    async fn append(&self, trace: Trace) -> Result<TraceRecord>;

    /// Traces of one transaction, newest first.
    async fn for_transaction(&self, id: TransactionId) -> Result<Vec<TraceRecord>>;

    /// Newest trace of the transaction that carries an error.
    async fn latest_error(&self, id: TransactionId) -> Result<Option<TraceRecord>> {
        Ok(self
            .for_transaction(id)
            .await?
            .into_iter()
            .find(|record| record.trace.error.is_some()))
    }
}

/// Fire-and-forget fan-out of human-readable lifecycle messages.
pub trait Notifier: Send + Sync {
    fn broadcast(&self, message: &str);
}

/// Arms the initiation-scoped timer whose expiry moves a transaction to escrow.
#[async_trait]
pub trait EscrowTimer: Send + Sync {
    async fn arm(&self, id: TransactionId, delay: Duration) -> Result<()>;
}

/// FIFO of raw transaction identifiers fed by administrative backfills.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    async fn push(&self, raw_id: String) -> Result<()>;

    /// Waits at most `timeout` for the next item; `None` means the queue is empty.
    async fn pop(&self, timeout: Duration) -> Result<Option<String>>;
}

/// Draws simulated outcomes for initiation and retries.
pub trait OutcomeSimulator: Send + Sync {
    fn succeeds(&self, probability: f64) -> bool;
}

pub type TransactionStoreRef = Arc<dyn TransactionStore>;
pub type LedgerStoreRef = Arc<dyn LedgerStore>;
pub type TraceStoreRef = Arc<dyn TraceStore>;
pub type NotifierRef = Arc<dyn Notifier>;
pub type EscrowTimerRef = Arc<dyn EscrowTimer>;
pub type WorkQueueRef = Arc<dyn WorkQueue>;
pub type SimulatorRef = Arc<dyn OutcomeSimulator>;
