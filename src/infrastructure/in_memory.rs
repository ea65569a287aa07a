use crate::domain::ledger::LedgerEntry;
use crate::domain::ports::{LedgerStore, TraceStore, TransactionStore, WorkQueue};
use crate::domain::status::TransactionStatus;
use crate::domain::trace::{Trace, TraceRecord};
use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::{LifecycleError, Result};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, RwLock};

/// A thread-safe in-memory transaction store.
///
/// The version check and the write happen under the same write guard, which
/// makes `save` an atomic compare-and-swap per record.
#[derive(Default, Clone)]
pub struct InMemoryTransactionStore {
    transactions: Arc<RwLock<HashMap<TransactionId, Transaction>>>,
}

impl InMemoryTransactionStore {
    /// Creates a new, empty in-memory transaction store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(&id).cloned())
    }

    async fn save(&self, mut tx: Transaction, expected_version: Option<u64>) -> Result<Transaction> {
        let mut transactions = self.transactions.write().await;
        let found = transactions.get(&tx.id).map(|stored| stored.version);

        tx.version = match (expected_version, found) {
            (None, None) => 1,
            (Some(expected), Some(found)) if expected == found => found + 1,
            (Some(_), None) => return Err(LifecycleError::NotFound(tx.id)),
            (expected, Some(found)) => {
                return Err(LifecycleError::VersionConflict {
                    id: tx.id,
                    expected: expected.unwrap_or(0),
                    found,
                });
            }
        };

        transactions.insert(tx.id, tx.clone());
        Ok(tx)
    }

    async fn find_by_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut matching: Vec<Transaction> = transactions
            .values()
            .filter(|tx| tx.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|tx| tx.created_at);
        Ok(matching)
    }

    async fn all(&self) -> Result<Vec<Transaction>> {
        let transactions = self.transactions.read().await;
        let mut all: Vec<Transaction> = transactions.values().cloned().collect();
        all.sort_by_key(|tx| tx.created_at);
        Ok(all)
    }
}

/// Append-only in-memory ledger.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    entries: Arc<RwLock<Vec<LedgerEntry>>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn append(&self, entry: LedgerEntry) -> Result<()> {
        self.entries.write().await.push(entry);
        Ok(())
    }

    async fn entries_for(&self, id: TransactionId) -> Result<Vec<LedgerEntry>> {
        let entries = self.entries.read().await;
        Ok(entries
            .iter()
            .filter(|entry| entry.transaction_id == id)
            .cloned()
            .collect())
    }
}

/// Append-only in-memory trace log. Ids are assigned in insertion order.
#[derive(Default, Clone)]
pub struct InMemoryTraceStore {
    records: Arc<RwLock<Vec<TraceRecord>>>,
}

impl InMemoryTraceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TraceStore for InMemoryTraceStore {
    async fn append(&self, trace: Trace) -> Result<TraceRecord> {
        let mut records = self.records.write().await;
        let record = TraceRecord {
            id: records.len() as u64 + 1,
            trace,
        };
        records.push(record.clone());
        Ok(record)
    }

    async fn for_transaction(&self, id: TransactionId) -> Result<Vec<TraceRecord>> {
        let records = self.records.read().await;
        let mut matching: Vec<TraceRecord> = records
            .iter()
            .filter(|record| record.trace.transaction_id == id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| {
            b.trace
                .recorded_at
                .cmp(&a.trace.recorded_at)
                .then(b.id.cmp(&a.id))
        });
        Ok(matching)
    }
}

/// In-process FIFO standing in for an external list-backed queue.
#[derive(Default, Clone)]
pub struct InMemoryWorkQueue {
    items: Arc<Mutex<VecDeque<String>>>,
    available: Arc<Notify>,
}

impl InMemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }
}

#[async_trait]
impl WorkQueue for InMemoryWorkQueue {
    async fn push(&self, raw_id: String) -> Result<()> {
        self.items.lock().await.push_back(raw_id);
        self.available.notify_one();
        Ok(())
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<String>> {
        let wait = async {
            loop {
                if let Some(item) = self.items.lock().await.pop_front() {
                    return item;
                }
                self.available.notified().await;
            }
        };
        Ok(tokio::time::timeout(timeout, wait).await.ok())
    }
}
