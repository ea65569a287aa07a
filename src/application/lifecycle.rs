use super::engine::TransitionEngine;
use super::escrow::{EscrowCoordinator, EscrowReport, EscrowSweep, QueueDrainWorker};
use super::retry::{RetryEngine, RetryReport};
use super::settlement::{SettlementReport, SettlementSweep};
use crate::config::LifecycleConfig;
use crate::domain::ledger::LedgerEntry;
use crate::domain::ports::{
    EscrowTimerRef, LedgerStoreRef, NotifierRef, SimulatorRef, TraceStoreRef, TransactionStoreRef,
    WorkQueueRef,
};
use crate::domain::status::{MANUALLY_RETRYABLE, TransactionStatus};
use crate::domain::trace::{TraceRecord, step};
use crate::domain::transaction::{NewTransaction, Transaction, TransactionId};
use crate::domain::transition::{Transition, TransitionOutcome};
use crate::error::{LifecycleError, Result};
use std::sync::Arc;
use tracing::{info, warn};

const INITIATED: &[TransactionStatus] = &[TransactionStatus::Initiated];
const SETTLED: &[TransactionStatus] = &[TransactionStatus::Settled];
const DISPUTE_OPEN: &[TransactionStatus] = &[TransactionStatus::DisputeOpen];

/// Outcome of one pass over every automatic job.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RoundReport {
    pub escrow_sweep: EscrowReport,
    pub queue_drain: EscrowReport,
    pub retry: RetryReport,
    pub settlement: SettlementReport,
}

/// Collaborators the lifecycle is wired with.
pub struct Adapters {
    pub transactions: TransactionStoreRef,
    pub ledger: LedgerStoreRef,
    pub traces: TraceStoreRef,
    pub notifier: NotifierRef,
    pub timer: EscrowTimerRef,
    pub queue: WorkQueueRef,
    pub simulator: SimulatorRef,
}

/// Entry point for initiation, operator actions and read paths.
///
/// It also builds the background jobs so they all share one engine.
pub struct LifecycleService {
    engine: Arc<TransitionEngine>,
    coordinator: Arc<EscrowCoordinator>,
    timer: EscrowTimerRef,
    queue: WorkQueueRef,
    simulator: SimulatorRef,
    config: LifecycleConfig,
}

impl LifecycleService {
    pub fn new(adapters: Adapters, config: LifecycleConfig) -> Self {
        let engine = Arc::new(TransitionEngine::new(
            adapters.transactions,
            adapters.ledger,
            adapters.traces,
            adapters.notifier,
        ));
        Self {
            coordinator: Arc::new(EscrowCoordinator::new(engine.clone())),
            engine,
            timer: adapters.timer,
            queue: adapters.queue,
            simulator: adapters.simulator,
            config,
        }
    }

    pub fn engine(&self) -> &Arc<TransitionEngine> {
        &self.engine
    }

    pub fn coordinator(&self) -> &Arc<EscrowCoordinator> {
        &self.coordinator
    }

    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    pub fn escrow_sweep(&self) -> EscrowSweep {
        EscrowSweep::new(self.engine.transactions().clone())
    }

    pub fn queue_worker(&self) -> QueueDrainWorker {
        QueueDrainWorker::new(self.queue.clone(), self.config.queue_poll_timeout)
    }

    pub fn retry_engine(&self) -> RetryEngine {
        RetryEngine::new(
            self.engine.clone(),
            self.simulator.clone(),
            self.config.max_retries,
        )
    }

    pub fn settlement_sweep(&self) -> SettlementSweep {
        SettlementSweep::new(self.engine.clone())
    }

    /// Creates an INITIATED transaction.
    ///
    /// A simulated initiation failure moves it straight to FAILED, where the
    /// retry engine picks it up. Otherwise the escrow timer is armed.
    pub async fn initiate(&self, request: NewTransaction) -> Result<Transaction> {
        let tx = Transaction::initiate(&request)?;
        let request_snapshot = serde_json::to_string(&request)?;
        let created = self.engine.create(tx, request_snapshot).await?;

        if !self.simulator.succeeds(created.success_rate) {
            let transition =
                Transition::new(INITIATED, TransactionStatus::Failed, step::INITIATION_FAILED)
                    .with_error("Simulated initiation failure.");
            return match self.engine.apply_transition(created.id, transition).await? {
                TransitionOutcome::Applied(failed) => Ok(failed),
                TransitionOutcome::Rejected(_) => self.get(created.id).await,
            };
        }

        if let Err(e) = self.timer.arm(created.id, self.config.escrow_delay).await {
            warn!(txn_id = %created.id, error = %e, "Could not arm escrow timer; sweep will escrow it");
        }
        Ok(created)
    }

    pub async fn get(&self, id: TransactionId) -> Result<Transaction> {
        self.engine
            .transactions()
            .get(id)
            .await?
            .ok_or(LifecycleError::NotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<Transaction>> {
        self.engine.transactions().all().await
    }

    pub async fn list_by_status(&self, status: TransactionStatus) -> Result<Vec<Transaction>> {
        self.engine.transactions().find_by_status(status).await
    }

    pub async fn retry_pending(&self) -> Result<Vec<Transaction>> {
        self.list_by_status(TransactionStatus::RetryPending).await
    }

    /// Trace history, newest first.
    pub async fn traces_for(&self, id: TransactionId) -> Result<Vec<TraceRecord>> {
        self.engine.traces().for_transaction(id).await
    }

    /// Error text of the newest trace that carries one.
    pub async fn last_error(&self, id: TransactionId) -> Result<Option<String>> {
        Ok(self
            .engine
            .traces()
            .latest_error(id)
            .await?
            .and_then(|record| record.trace.error))
    }

    pub async fn ledger_for(&self, id: TransactionId) -> Result<Vec<LedgerEntry>> {
        self.engine.ledger().entries_for(id).await
    }

    /// Operator-forced retry: bumps the counter and parks the transaction in
    /// RETRY_PENDING. Terminal transactions are refused.
    pub async fn force_manual_retry(&self, id: TransactionId) -> Result<Transaction> {
        let current = self.get(id).await?;
        if !current.status.accepts_manual_retry() {
            return Err(LifecycleError::InvalidState {
                id,
                status: current.status,
                action: "manual retry",
            });
        }
        let transition = Transition::new(
            MANUALLY_RETRYABLE,
            TransactionStatus::RetryPending,
            step::MANUAL_RETRY,
        )
        .incrementing_retry()
        .with_notice(format!(
            "Manual retry requested for transaction {}.",
            id.short()
        ));
        self.operator_transition(id, transition).await
    }

    pub async fn open_dispute(&self, id: TransactionId) -> Result<Transaction> {
        let current = self.get(id).await?;
        if current.status != TransactionStatus::Settled {
            return Err(LifecycleError::InvalidState {
                id,
                status: current.status,
                action: "open dispute",
            });
        }
        let transition = Transition::new(SETTLED, TransactionStatus::DisputeOpen, step::DISPUTE_OPENED)
            .with_notice(format!("Dispute opened for transaction {}.", id.short()));
        self.operator_transition(id, transition).await
    }

    pub async fn resolve_dispute(&self, id: TransactionId) -> Result<Transaction> {
        let current = self.get(id).await?;
        if current.status != TransactionStatus::DisputeOpen {
            return Err(LifecycleError::InvalidState {
                id,
                status: current.status,
                action: "resolve dispute",
            });
        }
        let transition =
            Transition::new(DISPUTE_OPEN, TransactionStatus::DisputeResolved, step::DISPUTE_RESOLVED)
                .with_notice(format!("Dispute resolved for transaction {}.", id.short()));
        self.operator_transition(id, transition).await
    }

    async fn operator_transition(
        &self,
        id: TransactionId,
        transition: Transition,
    ) -> Result<Transaction> {
        match self.engine.apply_transition(id, transition).await? {
            TransitionOutcome::Applied(tx) => Ok(tx),
            TransitionOutcome::Rejected(reason) => Err(LifecycleError::Rejected { id, reason }),
        }
    }

    /// Administrative backfill: pushes every INITIATED id onto the work queue.
    pub async fn enqueue_initiated(&self) -> Result<usize> {
        let initiated = self.list_by_status(TransactionStatus::Initiated).await?;
        for tx in &initiated {
            self.queue.push(tx.id.to_string()).await?;
        }
        info!(count = initiated.len(), "Pushed INITIATED transactions to queue");
        Ok(initiated.len())
    }

    /// Runs every automatic job once, in lifecycle order. Queued ids are
    /// drained before the sweep, which only picks up what is left.
    pub async fn run_round(&self) -> Result<RoundReport> {
        let queue_drain = self.coordinator.drain(&self.queue_worker()).await?;
        Ok(RoundReport {
            escrow_sweep: self.coordinator.drain(&self.escrow_sweep()).await?,
            queue_drain,
            retry: self.retry_engine().run_once().await?,
            settlement: self.settlement_sweep().run_once().await?,
        })
    }
}
