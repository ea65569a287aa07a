use super::engine::TransitionEngine;
use crate::domain::ledger::LedgerType;
use crate::domain::ports::SimulatorRef;
use crate::domain::status::TransactionStatus;
use crate::domain::trace::step;
use crate::domain::transaction::Transaction;
use crate::domain::transition::{Transition, TransitionOutcome};
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, error, info};

const FAILED: &[TransactionStatus] = &[TransactionStatus::Failed];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RetryReport {
    pub escrowed: usize,
    pub still_failed: usize,
    pub permanently_failed: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Bounded-retry simulation over FAILED transactions.
///
/// A transaction whose counter already reached `max_retries` is moved to
/// PERMANENTLY_FAILED. Otherwise the counter is bumped and a Bernoulli draw with
/// the transaction's own success rate decides between ESCROW and staying FAILED.
pub struct RetryEngine {
    engine: Arc<TransitionEngine>,
    simulator: SimulatorRef,
    max_retries: u32,
}

impl RetryEngine {
    pub fn new(engine: Arc<TransitionEngine>, simulator: SimulatorRef, max_retries: u32) -> Self {
        Self {
            engine,
            simulator,
            max_retries,
        }
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Processes every FAILED transaction once.
    pub async fn run_once(&self) -> Result<RetryReport> {
        let failed = self
            .engine
            .transactions()
            .find_by_status(TransactionStatus::Failed)
            .await?;

        let mut report = RetryReport::default();
        if failed.is_empty() {
            debug!("No FAILED transactions to retry");
            return Ok(report);
        }

        for tx in failed {
            let id = tx.id;
            match self.retry(&tx).await {
                Ok(Some(next)) => match next {
                    TransactionStatus::Escrow => report.escrowed += 1,
                    TransactionStatus::PermanentlyFailed => report.permanently_failed += 1,
                    _ => report.still_failed += 1,
                },
                Ok(None) => report.skipped += 1,
                Err(e) => {
                    error!(txn_id = %id, error = %e, "Retry processing failed");
                    self.engine
                        .record_exception(id, step::RETRY_EXCEPTION, &e)
                        .await;
                    report.errors += 1;
                }
            }
        }

        info!(
            escrowed = report.escrowed,
            still_failed = report.still_failed,
            permanently_failed = report.permanently_failed,
            errors = report.errors,
            "Retry run finished"
        );
        Ok(report)
    }

    /// Returns the status the transaction ended in, or `None` when another
    /// writer got there first. The limit check is only valid for the record it
    /// was made on, so the transition is pinned to that version.
    async fn retry(&self, tx: &Transaction) -> Result<Option<TransactionStatus>> {
        let transition = if tx.retry_count >= self.max_retries {
            Transition::new(FAILED, TransactionStatus::PermanentlyFailed, step::RETRY_LIMIT_EXCEEDED)
                .with_error(format!(
                    "Transaction reached max retry limit ({}).",
                    self.max_retries
                ))
        } else if self.simulator.succeeds(tx.success_rate) {
            Transition::new(FAILED, TransactionStatus::Escrow, step::RETRIED_SUCCESS)
                .incrementing_retry()
                .with_ledger(LedgerType::Escrow, "Escrow hold after successful retry")
        } else {
            Transition::new(FAILED, TransactionStatus::Failed, step::RETRIED_FAILURE)
                .incrementing_retry()
                .with_error("Transaction retry failed.")
        }
        .expecting_version(tx.version);

        match self.engine.apply_transition(tx.id, transition).await? {
            TransitionOutcome::Applied(updated) => {
                debug!(
                    txn_id = %updated.id,
                    status = %updated.status,
                    retry_count = updated.retry_count,
                    "Retry attempt recorded"
                );
                Ok(Some(updated.status))
            }
            TransitionOutcome::Rejected(reason) => {
                debug!(txn_id = %tx.id, %reason, "Retry attempt skipped");
                Ok(None)
            }
        }
    }
}
