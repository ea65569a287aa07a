use super::status::TransactionStatus;
use crate::error::{LifecycleError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque, immutable transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionId(Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }

    pub fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// First eight characters, used in operator-facing messages.
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TransactionId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl FromStr for TransactionId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// An initiation request, as received from the outside world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub amount: Decimal,
    pub currency: String,
    pub channel: String,
    pub success_rate: f64,
    #[serde(default)]
    pub payload: Option<String>,
    /// Merchant the request is attributed to.
    #[serde(default)]
    pub vendor_id: Option<Uuid>,
    #[serde(default)]
    pub service_context: Option<String>,
}

impl NewTransaction {
    pub fn validate(&self) -> Result<()> {
        if self.amount <= Decimal::ZERO {
            return Err(LifecycleError::ValidationError(
                "Amount must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.success_rate) {
            return Err(LifecycleError::ValidationError(format!(
                "Simulated success rate must be within [0, 1], got {}",
                self.success_rate
            )));
        }
        if self.currency.trim().is_empty() {
            return Err(LifecycleError::ValidationError(
                "Currency cannot be blank".to_string(),
            ));
        }
        Ok(())
    }
}

/// The central lifecycle entity.
///
/// `version` is owned by the store: it starts at 1 on insert and is bumped by
/// every accepted conditional save.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub amount: Decimal,
    pub currency: String,
    pub channel: String,
    pub status: TransactionStatus,
    pub retry_count: u32,
    pub success_rate: f64,
    pub initial_payload: String,
    #[serde(default)]
    pub vendor_id: Option<Uuid>,
    #[serde(default)]
    pub service_context: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u64,
}

impl Transaction {
    /// Builds a fresh INITIATED transaction. The request itself is kept as the
    /// initial payload unless it carries an explicit one.
    pub fn initiate(request: &NewTransaction) -> Result<Self> {
        request.validate()?;
        let initial_payload = match &request.payload {
            Some(payload) if !payload.trim().is_empty() => payload.clone(),
            _ => serde_json::to_string(request)?,
        };
        let now = Utc::now();
        Ok(Self {
            id: TransactionId::new(),
            amount: request.amount,
            currency: request.currency.trim().to_uppercase(),
            channel: request.channel.trim().to_string(),
            status: TransactionStatus::Initiated,
            retry_count: 0,
            success_rate: request.success_rate,
            initial_payload,
            vendor_id: request.vendor_id,
            service_context: request
                .service_context
                .as_deref()
                .map(str::trim)
                .filter(|context| !context.is_empty())
                .map(str::to_string),
            created_at: now,
            updated_at: now,
            version: 0,
        })
    }

    /// Moves `updated_at` forward without ever putting it before `created_at`.
    pub fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = now.max(self.created_at).max(self.updated_at);
    }

    pub fn snapshot(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
