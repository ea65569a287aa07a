use crate::domain::ledger::LedgerEntry;
use crate::domain::ports::{LedgerStoreRef, NotifierRef, TraceStoreRef, TransactionStoreRef};
use crate::domain::status::TransactionStatus;
use crate::domain::trace::{Trace, TraceRecord, step};
use crate::domain::transaction::{Transaction, TransactionId};
use crate::domain::transition::{Rejection, Transition, TransitionOutcome};
use crate::error::{LifecycleError, Result};
use tracing::{debug, error, info, warn};

/// The only component allowed to change `Transaction::status`.
///
/// Every caller (escrow triggers, retry engine, settlement sweep, operator
/// actions) funnels through [`TransitionEngine::apply_transition`]. The
/// engine reads the transaction, checks the expected source states and the
/// lifecycle graph, then performs a version-guarded write. Only the caller
/// whose write is accepted produces ledger, trace and notification side
/// effects; everybody else gets a [`TransitionOutcome::Rejected`].
pub struct TransitionEngine {
    transactions: TransactionStoreRef,
    ledger: LedgerStoreRef,
    traces: TraceStoreRef,
    notifier: NotifierRef,
}

impl TransitionEngine {
    pub fn new(
        transactions: TransactionStoreRef,
        ledger: LedgerStoreRef,
        traces: TraceStoreRef,
        notifier: NotifierRef,
    ) -> Self {
        Self {
            transactions,
            ledger,
            traces,
            notifier,
        }
    }

    pub fn transactions(&self) -> &TransactionStoreRef {
        &self.transactions
    }

    pub fn ledger(&self) -> &LedgerStoreRef {
        &self.ledger
    }

    pub fn traces(&self) -> &TraceStoreRef {
        &self.traces
    }

    /// Persists a freshly initiated transaction and writes its `INITIATED` trace.
    ///
    /// `request_snapshot` is the serialized request the transaction was built from.
    pub async fn create(&self, tx: Transaction, request_snapshot: String) -> Result<Transaction> {
        let stored = self.transactions.save(tx, None).await?;

        let trace = Trace::new(stored.id, step::INITIATED, stored.retry_count)
            .with_snapshots(Some(request_snapshot), Some(stored.snapshot()?));
        if let Err(e) = self.traces.append(trace).await {
            error!(txn_id = %stored.id, error = %e, "Failed to record INITIATED trace");
            return Err(LifecycleError::SideEffectFailure {
                id: stored.id,
                committed: stored.status,
                source: Box::new(e),
            });
        }

        info!(txn_id = %stored.id, amount = %stored.amount, currency = %stored.currency, "Transaction initiated");
        self.notifier.broadcast(&format!(
            "Transaction {} initiated for {} {}.",
            stored.id.short(),
            stored.amount,
            stored.currency
        ));
        Ok(stored)
    }

    /// Applies one lifecycle edge to `id`.
    ///
    /// Returns `Ok(Rejected(_))` when the source state no longer matches, the
    /// edge is illegal, or another writer won the conditional write. In those
    /// cases nothing is written. `Err(NotFound)` is returned for unknown ids.
    ///
    /// After the status write is accepted the ledger entry (if any) is appended.
    /// A failing ledger append restores the previous record so the ledger never
    /// disagrees with the status history. A failing trace append leaves the
    /// new status in place and is reported as `SideEffectFailure`.
    pub async fn apply_transition(
        &self,
        id: TransactionId,
        transition: Transition,
    ) -> Result<TransitionOutcome> {
        let current = self
            .transactions
            .get(id)
            .await?
            .ok_or(LifecycleError::NotFound(id))?;

        if !transition.expected.contains(&current.status) {
            debug!(txn_id = %id, current = %current.status, step = transition.step, "Source state no longer expected");
            return Ok(TransitionOutcome::Rejected(Rejection::Stale {
                current: current.status,
            }));
        }
        if let Some(expected) = transition.expected_version
            && expected != current.version
        {
            debug!(txn_id = %id, expected, found = current.version, step = transition.step, "Record changed since it was read");
            return Ok(TransitionOutcome::Rejected(Rejection::VersionConflict));
        }
        if !current.status.can_transition_to(transition.next) {
            warn!(txn_id = %id, from = %current.status, to = %transition.next, "Illegal transition requested");
            return Ok(TransitionOutcome::Rejected(Rejection::Illegal {
                from: current.status,
                to: transition.next,
            }));
        }

        let mut updated = current.clone();
        updated.status = transition.next;
        if transition.increment_retry {
            updated.retry_count += 1;
        }
        updated.touch();
        let before = current.snapshot()?;

        let committed = match self
            .transactions
            .save(updated, Some(current.version))
            .await
        {
            Ok(committed) => committed,
            Err(LifecycleError::VersionConflict { .. }) => {
                debug!(txn_id = %id, step = transition.step, "Lost conditional write");
                return Ok(TransitionOutcome::Rejected(Rejection::VersionConflict));
            }
            Err(e) => return Err(e),
        };

        if let Some(intent) = &transition.ledger {
            let entry = LedgerEntry::new(id, intent.kind, committed.amount, intent.description.clone());
            if let Err(e) = self.ledger.append(entry).await {
                error!(txn_id = %id, kind = %intent.kind, error = %e, "Ledger append failed, restoring status");
                self.restore(&committed, &current).await;
                return Err(LifecycleError::LedgerRolledBack {
                    id,
                    restored: current.status,
                    source: Box::new(e),
                });
            }
        }

        let trace = Trace::new(id, transition.step, committed.retry_count)
            .with_snapshots(Some(before), committed.snapshot().ok())
            .with_error(transition.error.clone());
        if let Err(e) = self.traces.append(trace).await {
            error!(txn_id = %id, step = transition.step, error = %e, "Trace append failed after commit; reconcile manually");
            return Err(LifecycleError::SideEffectFailure {
                id,
                committed: committed.status,
                source: Box::new(e),
            });
        }

        info!(
            txn_id = %id,
            from = %current.status,
            to = %committed.status,
            step = transition.step,
            retry_count = committed.retry_count,
            "Transition applied"
        );

        let notice = transition.notice.unwrap_or_else(|| {
            format!(
                "Transaction {} moved from {} to {} ({}).",
                id.short(),
                current.status,
                committed.status,
                transition.step
            )
        });
        self.notifier.broadcast(&notice);

        Ok(TransitionOutcome::Applied(committed))
    }

    /// Records a failed processing attempt. Never fails: a trace that cannot be
    /// written is logged instead.
    pub async fn record_exception(
        &self,
        id: TransactionId,
        step: &str,
        failure: &LifecycleError,
    ) -> Option<TraceRecord> {
        let retry_count = match self.transactions.get(id).await {
            Ok(Some(tx)) => tx.retry_count,
            _ => 0,
        };
        let trace = Trace::new(id, step, retry_count).with_error(Some(failure.to_string()));
        match self.traces.append(trace).await {
            Ok(record) => Some(record),
            Err(e) => {
                error!(txn_id = %id, step, error = %e, "Failed to record exception trace");
                None
            }
        }
    }

    /// Puts the pre-transition record back, retry counter included.
    async fn restore(&self, committed: &Transaction, previous: &Transaction) {
        let mut restored = previous.clone();
        restored.touch();
        if let Err(e) = self
            .transactions
            .save(restored, Some(committed.version))
            .await
        {
            error!(
                txn_id = %committed.id,
                status = %committed.status,
                error = %e,
                "Could not restore status after ledger failure; reconcile manually"
            );
        }
    }
}
