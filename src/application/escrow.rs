//! The three producers of the INITIATED -> ESCROW edge.
//!
//! Expiry signals, the work-queue drain and the periodic sweep only produce
//! candidate identifiers. They all hand those to [`EscrowCoordinator`], which
//! applies the one shared transition through the engine, so ledger and trace
//! side effects are written once no matter how many sources race.

use super::engine::TransitionEngine;
use crate::domain::ledger::LedgerType;
use crate::domain::ports::{TransactionStoreRef, WorkQueueRef};
use crate::domain::status::TransactionStatus;
use crate::domain::trace::step;
use crate::domain::transaction::TransactionId;
use crate::domain::transition::{Transition, TransitionOutcome};
use crate::error::{LifecycleError, Result};
use crate::infrastructure::timer::EXPIRY_KEY_PREFIX;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

const INITIATED: &[TransactionStatus] = &[TransactionStatus::Initiated];

/// What a source yielded on one poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidates {
    /// Identifiers to escrow. May be empty when a malformed input was dropped.
    Batch(Vec<TransactionId>),
    /// Nothing more to read for this round.
    Exhausted,
}

/// A producer of escrow candidates.
#[async_trait]
pub trait EscrowSource: Send + Sync {
    /// Trace step recorded when this source wins the transition.
    fn step(&self) -> &'static str;

    /// Ledger description recorded when this source wins the transition.
    fn description(&self) -> &'static str;

    async fn poll(&self) -> Result<Candidates>;

    /// Sources that answer with a full snapshot are polled once per round.
    fn single_batch(&self) -> bool {
        false
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct EscrowReport {
    pub escrowed: usize,
    pub rejected: usize,
    pub failed: usize,
}

/// Routes every escrow source through the same engine call.
pub struct EscrowCoordinator {
    engine: Arc<TransitionEngine>,
}

impl EscrowCoordinator {
    pub fn new(engine: Arc<TransitionEngine>) -> Self {
        Self { engine }
    }

    fn transition(step: &'static str, description: &'static str) -> Transition {
        Transition::new(INITIATED, TransactionStatus::Escrow, step)
            .with_ledger(LedgerType::Escrow, description)
    }

    /// Attempts INITIATED -> ESCROW for one id.
    pub async fn escrow(
        &self,
        id: TransactionId,
        step: &'static str,
        description: &'static str,
    ) -> Result<TransitionOutcome> {
        self.engine
            .apply_transition(id, Self::transition(step, description))
            .await
    }

    /// Polls `source` until it is exhausted and escrows every candidate.
    /// Failures on one id are traced and do not stop the round.
    pub async fn drain<S>(&self, source: &S) -> Result<EscrowReport>
    where
        S: EscrowSource + ?Sized,
    {
        let mut report = EscrowReport::default();
        loop {
            let ids = match source.poll().await? {
                Candidates::Batch(ids) => ids,
                Candidates::Exhausted => break,
            };
            for id in ids {
                self.attempt(id, source.step(), source.description(), &mut report)
                    .await;
            }
            if source.single_batch() {
                break;
            }
        }

        if report.escrowed > 0 || report.failed > 0 {
            info!(
                source = source.step(),
                escrowed = report.escrowed,
                rejected = report.rejected,
                failed = report.failed,
                "Escrow round finished"
            );
        }
        Ok(report)
    }

    async fn attempt(
        &self,
        id: TransactionId,
        step: &'static str,
        description: &'static str,
        report: &mut EscrowReport,
    ) {
        match self.escrow(id, step, description).await {
            Ok(TransitionOutcome::Applied(_)) => report.escrowed += 1,
            Ok(TransitionOutcome::Rejected(reason)) => {
                debug!(txn_id = %id, source = step, %reason, "Escrow attempt rejected");
                report.rejected += 1;
            }
            Err(LifecycleError::NotFound(_)) => {
                warn!(txn_id = %id, source = step, "Escrow candidate does not exist");
                report.rejected += 1;
            }
            Err(e) => {
                error!(txn_id = %id, source = step, error = %e, "Escrow attempt failed");
                self.engine
                    .record_exception(id, step::ESCROW_EXCEPTION, &e)
                    .await;
                report.failed += 1;
            }
        }
    }
}

/// Extracts the transaction id from an expiry key such as `txn:<uuid>`.
/// Unrelated or malformed keys yield `None`.
pub fn parse_expiry_key(key: &str) -> Option<TransactionId> {
    key.strip_prefix(EXPIRY_KEY_PREFIX)?.parse().ok()
}

/// Listens for timer-elapsed signals.
pub struct ExpirySignalHandler {
    signals: Mutex<mpsc::UnboundedReceiver<String>>,
}

impl ExpirySignalHandler {
    pub fn new(signals: mpsc::UnboundedReceiver<String>) -> Self {
        Self {
            signals: Mutex::new(signals),
        }
    }

    /// Handles signals until the channel closes.
    pub async fn run(self, coordinator: Arc<EscrowCoordinator>) {
        info!("Expiry signal listener started");
        match coordinator.drain(&self).await {
            Ok(report) => info!(escrowed = report.escrowed, "Expiry signal listener stopped"),
            Err(e) => error!(error = %e, "Expiry signal listener failed"),
        }
    }
}

#[async_trait]
impl EscrowSource for ExpirySignalHandler {
    fn step(&self) -> &'static str {
        step::AUTO_ESCROW
    }

    fn description(&self) -> &'static str {
        "Auto-hold in escrow after expiry timer"
    }

    async fn poll(&self) -> Result<Candidates> {
        let Some(key) = self.signals.lock().await.recv().await else {
            return Ok(Candidates::Exhausted);
        };
        match parse_expiry_key(&key) {
            Some(id) => Ok(Candidates::Batch(vec![id])),
            None => {
                if key.starts_with(EXPIRY_KEY_PREFIX) {
                    warn!(key = %key, "Dropping expiry signal with malformed id");
                }
                Ok(Candidates::Batch(Vec::new()))
            }
        }
    }
}

/// Drains identifiers pushed on the work queue, waiting at most
/// `poll_timeout` per dequeue.
pub struct QueueDrainWorker {
    queue: WorkQueueRef,
    poll_timeout: Duration,
}

impl QueueDrainWorker {
    pub fn new(queue: WorkQueueRef, poll_timeout: Duration) -> Self {
        Self {
            queue,
            poll_timeout,
        }
    }
}

#[async_trait]
impl EscrowSource for QueueDrainWorker {
    fn step(&self) -> &'static str {
        step::QUEUED_ESCROW
    }

    fn description(&self) -> &'static str {
        "Escrow hold from queued backfill"
    }

    async fn poll(&self) -> Result<Candidates> {
        let Some(raw) = self.queue.pop(self.poll_timeout).await? else {
            return Ok(Candidates::Exhausted);
        };
        match raw.parse::<TransactionId>() {
            Ok(id) => Ok(Candidates::Batch(vec![id])),
            Err(e) => {
                warn!(raw = %raw, error = %e, "Dropping malformed queued id");
                Ok(Candidates::Batch(Vec::new()))
            }
        }
    }
}

/// Fallback that escrows every transaction still INITIATED.
pub struct EscrowSweep {
    transactions: TransactionStoreRef,
}

impl EscrowSweep {
    pub fn new(transactions: TransactionStoreRef) -> Self {
        Self { transactions }
    }
}

#[async_trait]
impl EscrowSource for EscrowSweep {
    fn step(&self) -> &'static str {
        step::SCHEDULED_ESCROW
    }

    fn description(&self) -> &'static str {
        "Scheduled fallback to escrow"
    }

    async fn poll(&self) -> Result<Candidates> {
        let stuck = self
            .transactions
            .find_by_status(TransactionStatus::Initiated)
            .await?;
        Ok(Candidates::Batch(stuck.into_iter().map(|tx| tx.id).collect()))
    }

    fn single_batch(&self) -> bool {
        true
    }
}
