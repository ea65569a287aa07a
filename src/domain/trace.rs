use super::transaction::TransactionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Step names recorded on traces. Free-form on the wire; these are the ones
/// the lifecycle writes itself.
pub mod step {
    pub const INITIATED: &str = "INITIATED";
    pub const INITIATION_FAILED: &str = "INITIATION_FAILED";
    pub const AUTO_ESCROW: &str = "AUTO_ESCROW";
    pub const QUEUED_ESCROW: &str = "QUEUED_ESCROW";
    pub const SCHEDULED_ESCROW: &str = "SCHEDULED_ESCROW";
    pub const ESCROW_EXCEPTION: &str = "ESCROW_EXCEPTION";
    pub const RETRIED_SUCCESS: &str = "RETRIED_SUCCESS";
    pub const RETRIED_FAILURE: &str = "RETRIED_FAILURE";
    pub const RETRY_LIMIT_EXCEEDED: &str = "RETRY_LIMIT_EXCEEDED";
    pub const RETRY_EXCEPTION: &str = "RETRY_EXCEPTION";
    pub const AUTO_SETTLEMENT: &str = "AUTO_SETTLEMENT";
    pub const SETTLEMENT_EXCEPTION: &str = "SETTLEMENT_EXCEPTION";
    pub const MANUAL_RETRY: &str = "MANUAL_RETRY";
    pub const DISPUTE_OPENED: &str = "DISPUTE_OPENED";
    pub const DISPUTE_RESOLVED: &str = "DISPUTE_RESOLVED";
}

/// An audit record before the store has assigned it an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub transaction_id: TransactionId,
    pub step: String,
    pub before: Option<String>,
    pub after: Option<String>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub recorded_at: DateTime<Utc>,
}

impl Trace {
    pub fn new(transaction_id: TransactionId, step: impl Into<String>, retry_count: u32) -> Self {
        Self {
            transaction_id,
            step: step.into(),
            before: None,
            after: None,
            error: None,
            retry_count,
            recorded_at: Utc::now(),
        }
    }

    pub fn with_snapshots(mut self, before: Option<String>, after: Option<String>) -> Self {
        self.before = before;
        self.after = after;
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }
}

/// A stored trace. Ids grow with insertion order and break timestamp ties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub id: u64,
    #[serde(flatten)]
    pub trace: Trace,
}
