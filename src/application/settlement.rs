use super::engine::TransitionEngine;
use crate::domain::ledger::LedgerType;
use crate::domain::status::TransactionStatus;
use crate::domain::trace::step;
use crate::domain::transition::{Transition, TransitionOutcome};
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, error, info};

const ESCROW: &[TransactionStatus] = &[TransactionStatus::Escrow];

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SettlementReport {
    pub settled: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Promotes escrowed transactions to SETTLED with a SETTLEMENT ledger entry.
pub struct SettlementSweep {
    engine: Arc<TransitionEngine>,
}

impl SettlementSweep {
    pub fn new(engine: Arc<TransitionEngine>) -> Self {
        Self { engine }
    }

    pub async fn run_once(&self) -> Result<SettlementReport> {
        let escrows = self
            .engine
            .transactions()
            .find_by_status(TransactionStatus::Escrow)
            .await?;
        debug!(pending = escrows.len(), "Settlement sweep started");

        let mut report = SettlementReport::default();
        for tx in escrows {
            let transition = Transition::new(ESCROW, TransactionStatus::Settled, step::AUTO_SETTLEMENT)
                .with_ledger(LedgerType::Settlement, "Auto-settlement job");
            match self.engine.apply_transition(tx.id, transition).await {
                Ok(TransitionOutcome::Applied(_)) => report.settled += 1,
                Ok(TransitionOutcome::Rejected(reason)) => {
                    debug!(txn_id = %tx.id, %reason, "Settlement skipped");
                    report.skipped += 1;
                }
                Err(e) => {
                    error!(txn_id = %tx.id, error = %e, "Failed settlement");
                    self.engine
                        .record_exception(tx.id, step::SETTLEMENT_EXCEPTION, &e)
                        .await;
                    report.failed += 1;
                }
            }
        }

        if report.settled > 0 || report.failed > 0 {
            info!(
                settled = report.settled,
                skipped = report.skipped,
                failed = report.failed,
                "Settlement sweep finished"
            );
        }
        Ok(report)
    }
}
