use crate::domain::ledger::LedgerEntry;
use crate::domain::ports::{LedgerStore, TraceStore, TransactionStore};
use crate::domain::status::TransactionStatus;
use crate::domain::trace::{Trace, TraceRecord};
use crate::domain::transaction::{Transaction, TransactionId};
use crate::error::{LifecycleError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Column Family for transaction records.
pub const CF_TRANSACTIONS: &str = "transactions";
/// Column Family for ledger entries, keyed by transaction id + sequence.
pub const CF_LEDGER: &str = "ledger";
/// Column Family for traces, keyed by transaction id + trace id.
pub const CF_TRACES: &str = "traces";

const LOCK_STRIPES: usize = 64;

/// A persistent store implementation using RocksDB.
///
/// Implements the transaction, ledger and trace stores over separate Column
/// Families. Conditional saves are serialized per transaction through lock
/// striping, so writers on different transactions do not contend.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    stripes: Arc<Vec<Mutex<()>>>,
    ledger_seq: Arc<AtomicU64>,
    trace_seq: Arc<AtomicU64>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families exist and resumes the ledger
    /// and trace sequences from what is already stored.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = [CF_TRANSACTIONS, CF_LEDGER, CF_TRACES]
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect::<Vec<_>>();

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        let store = Self {
            db: Arc::new(db),
            stripes: Arc::new((0..LOCK_STRIPES).map(|_| Mutex::new(())).collect()),
            ledger_seq: Arc::new(AtomicU64::new(0)),
            trace_seq: Arc::new(AtomicU64::new(0)),
        };
        store
            .ledger_seq
            .store(store.max_suffix(CF_LEDGER)?, Ordering::SeqCst);
        store
            .trace_seq
            .store(store.max_suffix(CF_TRACES)?, Ordering::SeqCst);
        Ok(store)
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| LifecycleError::StorageError(format!("Column family {name} not found")))
    }

    fn stripe(&self, id: TransactionId) -> &Mutex<()> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        &self.stripes[hasher.finish() as usize % self.stripes.len()]
    }

    fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(value)?)
    }

    fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(serde_json::from_slice(bytes)?)
    }

    fn sequenced_key(id: TransactionId, seq: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(id.as_bytes());
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    /// Largest trailing sequence number among keys of a sequenced family.
    fn max_suffix(&self, cf_name: &str) -> Result<u64> {
        let cf = self.cf(cf_name)?;
        let mut max = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, _) = item?;
            if key.len() == 24 {
                let mut seq = [0u8; 8];
                seq.copy_from_slice(&key[16..]);
                max = max.max(u64::from_be_bytes(seq));
            }
        }
        Ok(max)
    }

    /// Values of every key starting with the transaction id, in key order.
    fn scan_prefix<T: DeserializeOwned>(&self, cf_name: &str, id: TransactionId) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        let prefix = id.as_bytes();
        let mut values = Vec::new();
        for item in self
            .db
            .iterator_cf(cf, IteratorMode::From(prefix, Direction::Forward))
        {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            values.push(Self::decode(&value)?);
        }
        Ok(values)
    }

    fn load(&self, id: TransactionId) -> Result<Option<Transaction>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        match self.db.get_cf(cf, id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl TransactionStore for RocksDBStore {
    async fn get(&self, id: TransactionId) -> Result<Option<Transaction>> {
        self.load(id)
    }

    async fn save(&self, mut tx: Transaction, expected_version: Option<u64>) -> Result<Transaction> {
        let _guard = self
            .stripe(tx.id)
            .lock()
            .map_err(|_| LifecycleError::StorageError("Transaction lock poisoned".to_string()))?;

        let found = self.load(tx.id)?.map(|stored| stored.version);
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

        let cf = self.cf(CF_TRANSACTIONS)?;
        self.db.put_cf(cf, tx.id.as_bytes(), Self::encode(&tx)?)?;
        Ok(tx)
    }

    async fn find_by_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>> {
        let mut matching: Vec<Transaction> = self
            .all()
            .await?
            .into_iter()
            .filter(|tx| tx.status == status)
            .collect();
        matching.sort_by_key(|tx| tx.created_at);
        Ok(matching)
    }

    async fn all(&self) -> Result<Vec<Transaction>> {
        let cf = self.cf(CF_TRANSACTIONS)?;
        let mut transactions = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            transactions.push(Self::decode::<Transaction>(&value)?);
        }
        transactions.sort_by_key(|tx| tx.created_at);
        Ok(transactions)
    }
}

#[async_trait]
impl LedgerStore for RocksDBStore {
    async fn append(&self, entry: LedgerEntry) -> Result<()> {
        let cf = self.cf(CF_LEDGER)?;
        let seq = self.ledger_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let key = Self::sequenced_key(entry.transaction_id, seq);
        self.db.put_cf(cf, key, Self::encode(&entry)?)?;
        Ok(())
    }

    async fn entries_for(&self, id: TransactionId) -> Result<Vec<LedgerEntry>> {
        self.scan_prefix(CF_LEDGER, id)
    }
}

#[async_trait]
impl TraceStore for RocksDBStore {
    async fn append(&self, trace: Trace) -> Result<TraceRecord> {
        let cf = self.cf(CF_TRACES)?;
        let id = self.trace_seq.fetch_add(1, Ordering::SeqCst) + 1;
        let record = TraceRecord { id, trace };
        let key = Self::sequenced_key(record.trace.transaction_id, id);
        self.db.put_cf(cf, key, Self::encode(&record)?)?;
        Ok(record)
    }

    async fn for_transaction(&self, id: TransactionId) -> Result<Vec<TraceRecord>> {
        let mut records: Vec<TraceRecord> = self.scan_prefix(CF_TRACES, id)?;
        records.sort_by(|a, b| {
            b.trace
                .recorded_at
                .cmp(&a.trace.recorded_at)
                .then(b.id.cmp(&a.id))
        });
        Ok(records)
    }
}
