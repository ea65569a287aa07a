//! Lifecycle states and the edges between them.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a transaction.
///
/// Terminal states: SETTLED, PERMANENTLY_FAILED, DISPUTE_RESOLVED, COMPLETED.
/// DISPUTE_OPEN and DISPUTE_RESOLVED are only reached through operator action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Initiated,
    Escrow,
    Settled,
    Failed,
    RetryPending,
    Retried,
    PermanentlyFailed,
    DisputeOpen,
    DisputeResolved,
    Refunded,
    Completed,
}

use TransactionStatus::*;

/// Every source state from which an operator may force a retry.
pub const MANUALLY_RETRYABLE: &[TransactionStatus] = &[
    Initiated,
    Escrow,
    Failed,
    RetryPending,
    Retried,
    DisputeOpen,
    Refunded,
];

impl TransactionStatus {
    pub const ALL: [TransactionStatus; 11] = [
        Initiated,
        Escrow,
        Settled,
        Failed,
        RetryPending,
        Retried,
        PermanentlyFailed,
        DisputeOpen,
        DisputeResolved,
        Refunded,
        Completed,
    ];

    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Settled | PermanentlyFailed | DisputeResolved | Completed
        )
    }

    /// States the periodic jobs never touch.
    #[inline]
    pub fn is_operator_only(&self) -> bool {
        matches!(self, DisputeOpen | DisputeResolved)
    }

    #[inline]
    pub fn accepts_manual_retry(&self) -> bool {
        !self.is_terminal()
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        match (*self, next) {
            (Initiated, Escrow)
            | (Initiated, Failed)
            | (Failed, Escrow)
            | (Failed, Failed)
            | (Failed, PermanentlyFailed)
            | (Escrow, Settled)
            | (Settled, DisputeOpen)
            | (DisputeOpen, DisputeResolved) => true,
            (from, RetryPending) => from.accepts_manual_retry(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Initiated => "INITIATED",
            Escrow => "ESCROW",
            Settled => "SETTLED",
            Failed => "FAILED",
            RetryPending => "RETRY_PENDING",
            Retried => "RETRIED",
            PermanentlyFailed => "PERMANENTLY_FAILED",
            DisputeOpen => "DISPUTE_OPEN",
            DisputeResolved => "DISPUTE_RESOLVED",
            Refunded => "REFUNDED",
            Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown transaction status: {s}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(Settled.is_terminal());
        assert!(PermanentlyFailed.is_terminal());
        assert!(DisputeResolved.is_terminal());
        assert!(Completed.is_terminal());

        assert!(!Initiated.is_terminal());
        assert!(!Escrow.is_terminal());
        assert!(!Failed.is_terminal());
        assert!(!DisputeOpen.is_terminal());
    }

    #[test]
    fn test_automatic_edges() {
        assert!(Initiated.can_transition_to(Escrow));
        assert!(Initiated.can_transition_to(Failed));
        assert!(Failed.can_transition_to(Escrow));
        assert!(Failed.can_transition_to(Failed));
        assert!(Failed.can_transition_to(PermanentlyFailed));
        assert!(Escrow.can_transition_to(Settled));

        assert!(!Initiated.can_transition_to(Settled));
        assert!(!Escrow.can_transition_to(Escrow));
        assert!(!Settled.can_transition_to(Escrow));
        assert!(!PermanentlyFailed.can_transition_to(Escrow));
        assert!(!Escrow.can_transition_to(DisputeOpen));
    }

    #[test]
    fn test_dispute_edges_only_from_expected_sources() {
        for from in TransactionStatus::ALL {
            assert_eq!(from.can_transition_to(DisputeOpen), from == Settled);
            assert_eq!(from.can_transition_to(DisputeResolved), from == DisputeOpen);
        }
    }

    #[test]
    fn test_manual_retry_sources_match_edge_table() {
        for from in TransactionStatus::ALL {
            assert_eq!(
                MANUALLY_RETRYABLE.contains(&from),
                from.can_transition_to(RetryPending),
                "mismatch for {from}"
            );
        }
        assert!(!Settled.accepts_manual_retry());
        assert!(!Completed.accepts_manual_retry());
        assert!(!PermanentlyFailed.accepts_manual_retry());
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!("escrow".parse::<TransactionStatus>(), Ok(Escrow));
        assert_eq!(
            "PERMANENTLY_FAILED".parse::<TransactionStatus>(),
            Ok(PermanentlyFailed)
        );
        assert!("UNKNOWN".parse::<TransactionStatus>().is_err());
        assert_eq!(RetryPending.to_string(), "RETRY_PENDING");
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&DisputeOpen).unwrap();
        assert_eq!(json, "\"DISPUTE_OPEN\"");
    }
}
