use super::ledger::LedgerType;
use super::status::TransactionStatus;
use super::transaction::Transaction;
use std::fmt;

/// Ledger entry to append when a transition is applied.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerIntent {
    pub kind: LedgerType,
    pub description: String,
}

/// A requested edge together with the side effects it carries.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub expected: &'static [TransactionStatus],
    /// When set, the stored record must still carry this version.
    pub expected_version: Option<u64>,
    pub next: TransactionStatus,
    pub step: &'static str,
    pub ledger: Option<LedgerIntent>,
    pub increment_retry: bool,
    pub error: Option<String>,
    pub notice: Option<String>,
}

impl Transition {
    pub fn new(
        expected: &'static [TransactionStatus],
        next: TransactionStatus,
        step: &'static str,
    ) -> Self {
        Self {
            expected,
            expected_version: None,
            next,
            step,
            ledger: None,
            increment_retry: false,
            error: None,
            notice: None,
        }
    }

    pub fn with_ledger(mut self, kind: LedgerType, description: impl Into<String>) -> Self {
        self.ledger = Some(LedgerIntent {
            kind,
            description: description.into(),
        });
        self
    }

    /// Binds the transition to the record the caller decided on. A newer
    /// version is rejected as a lost write even if the status still matches.
    pub fn expecting_version(mut self, version: u64) -> Self {
        self.expected_version = Some(version);
        self
    }

    pub fn incrementing_retry(mut self) -> Self {
        self.increment_retry = true;
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        self.notice = Some(notice.into());
        self
    }
}

/// Why a transition was not applied. None of these is an error: they are the
/// normal outcome of losing a race or asking for an edge that does not exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The stored status is not one of the expected sources.
    Stale { current: TransactionStatus },
    /// The edge is not part of the lifecycle graph.
    Illegal {
        from: TransactionStatus,
        to: TransactionStatus,
    },
    /// Another writer committed between our read and our conditional write.
    VersionConflict,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::Stale { current } => write!(f, "stale source state {current}"),
            Rejection::Illegal { from, to } => write!(f, "illegal edge {from} -> {to}"),
            Rejection::VersionConflict => f.write_str("lost conditional write"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransitionOutcome {
    Applied(Transaction),
    Rejected(Rejection),
}

impl TransitionOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, TransitionOutcome::Applied(_))
    }

    pub fn applied(self) -> Option<Transaction> {
        match self {
            TransitionOutcome::Applied(tx) => Some(tx),
            TransitionOutcome::Rejected(_) => None,
        }
    }
}
