use super::transaction::TransactionId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LedgerType {
    Escrow,
    Settlement,
    Refund,
}

impl LedgerType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerType::Escrow => "ESCROW",
            LedgerType::Settlement => "SETTLEMENT",
            LedgerType::Refund => "REFUND",
        }
    }

    /// Sign applied to the transaction amount. The ledger is single-sided:
    /// holds and settlements are recorded as positive movements.
    pub fn sign(&self) -> Decimal {
        match self {
            LedgerType::Escrow | LedgerType::Settlement => Decimal::ONE,
            LedgerType::Refund => Decimal::NEGATIVE_ONE,
        }
    }
}

impl fmt::Display for LedgerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only monetary record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub transaction_id: TransactionId,
    pub kind: LedgerType,
    pub amount: Decimal,
    pub description: String,
    pub recorded_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(
        transaction_id: TransactionId,
        kind: LedgerType,
        amount: Decimal,
        description: impl Into<String>,
    ) -> Self {
        Self {
            transaction_id,
            kind,
            amount: amount.abs() * kind.sign(),
            description: description.into(),
            recorded_at: Utc::now(),
        }
    }
}
