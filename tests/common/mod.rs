#![allow(dead_code)]

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracktrove::application::lifecycle::{Adapters, LifecycleService};
use tracktrove::config::LifecycleConfig;
use tracktrove::domain::ledger::LedgerEntry;
use tracktrove::domain::ports::{EscrowTimerRef, LedgerStore, TraceStore, TransactionStore};
use tracktrove::domain::trace::{Trace, TraceRecord};
use tracktrove::domain::transaction::{NewTransaction, Transaction, TransactionId};
use tracktrove::error::{LifecycleError, Result};
use tracktrove::infrastructure::in_memory::{
    InMemoryLedgerStore, InMemoryTraceStore, InMemoryTransactionStore, InMemoryWorkQueue,
};
use tracktrove::infrastructure::notifier::BroadcastNotifier;
use tracktrove::infrastructure::simulator::FixedOutcome;
use tracktrove::infrastructure::timer::{DisabledEscrowTimer, TokioEscrowTimer};

/// Ledger store that refuses appends for selected transactions.
#[derive(Default)]
pub struct FlakyLedgerStore {
    inner: InMemoryLedgerStore,
    failing: Mutex<HashSet<TransactionId>>,
}

impl FlakyLedgerStore {
    pub fn fail_for(&self, id: TransactionId) {
        self.failing.lock().unwrap().insert(id);
    }
}

#[async_trait]
impl LedgerStore for FlakyLedgerStore {
    async fn append(&self, entry: LedgerEntry) -> Result<()> {
        if self.failing.lock().unwrap().contains(&entry.transaction_id) {
            return Err(LifecycleError::StorageError("ledger unavailable".to_string()));
        }
        self.inner.append(entry).await
    }

    async fn entries_for(&self, id: TransactionId) -> Result<Vec<LedgerEntry>> {
        self.inner.entries_for(id).await
    }
}

/// Trace store that refuses appends for selected transactions.
#[derive(Default)]
pub struct FlakyTraceStore {
    inner: InMemoryTraceStore,
    failing: Mutex<HashSet<TransactionId>>,
}

impl FlakyTraceStore {
    pub fn fail_for(&self, id: TransactionId) {
        self.failing.lock().unwrap().insert(id);
    }
}

#[async_trait]
impl TraceStore for FlakyTraceStore {
    async fn append(&self, trace: Trace) -> Result<TraceRecord> {
        if self.failing.lock().unwrap().contains(&trace.transaction_id) {
            return Err(LifecycleError::StorageError("trace log unavailable".to_string()));
        }
        self.inner.append(trace).await
    }

    async fn for_transaction(&self, id: TransactionId) -> Result<Vec<TraceRecord>> {
        self.inner.for_transaction(id).await
    }
}

pub struct Harness {
    pub service: Arc<LifecycleService>,
    pub transactions: Arc<InMemoryTransactionStore>,
    pub ledger: Arc<FlakyLedgerStore>,
    pub traces: Arc<FlakyTraceStore>,
    pub notifier: Arc<BroadcastNotifier>,
    pub queue: Arc<InMemoryWorkQueue>,
}

pub fn test_config() -> LifecycleConfig {
    LifecycleConfig {
        escrow_delay: Duration::from_millis(20),
        escrow_sweep_interval: Duration::from_millis(25),
        queue_drain_interval: Duration::from_millis(25),
        queue_poll_timeout: Duration::from_millis(20),
        retry_interval: Duration::from_millis(25),
        settlement_interval: Duration::from_millis(25),
        max_retries: 3,
    }
}

fn build(succeeds: bool, timer: EscrowTimerRef, config: LifecycleConfig) -> Harness {
    let transactions = Arc::new(InMemoryTransactionStore::new());
    let ledger = Arc::new(FlakyLedgerStore::default());
    let traces = Arc::new(FlakyTraceStore::default());
    let notifier = Arc::new(BroadcastNotifier::new());
    let queue = Arc::new(InMemoryWorkQueue::new());

    let service = LifecycleService::new(
        Adapters {
            transactions: transactions.clone(),
            ledger: ledger.clone(),
            traces: traces.clone(),
            notifier: notifier.clone(),
            timer,
            queue: queue.clone(),
            simulator: Arc::new(FixedOutcome(succeeds)),
        },
        config,
    );

    Harness {
        service: Arc::new(service),
        transactions,
        ledger,
        traces,
        notifier,
        queue,
    }
}

/// Lifecycle with a timer that never fires and a fixed simulated outcome.
pub fn harness(succeeds: bool) -> Harness {
    build(succeeds, Arc::new(DisabledEscrowTimer), test_config())
}

pub fn harness_with_config(succeeds: bool, config: LifecycleConfig) -> Harness {
    build(succeeds, Arc::new(DisabledEscrowTimer), config)
}

/// Lifecycle whose escrow timer publishes real expiry signals.
pub fn harness_with_timer(succeeds: bool) -> (Harness, mpsc::UnboundedReceiver<String>) {
    let (timer, signals) = TokioEscrowTimer::new();
    (build(succeeds, Arc::new(timer), test_config()), signals)
}

pub fn request(amount: Decimal, success_rate: f64) -> NewTransaction {
    NewTransaction {
        amount,
        currency: "INR".to_string(),
        channel: "WEB".to_string(),
        success_rate,
        payload: None,
        vendor_id: None,
        service_context: None,
    }
}

impl Harness {
    /// Overwrites the stored record, bypassing the transition rules.
    pub async fn force(&self, tx: Transaction) -> Transaction {
        let version = tx.version;
        self.transactions.save(tx, Some(version)).await.unwrap()
    }

    pub async fn steps(&self, id: TransactionId) -> Vec<String> {
        self.service
            .traces_for(id)
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.trace.step)
            .collect()
    }
}

/// Polls `check` until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check().await
}
