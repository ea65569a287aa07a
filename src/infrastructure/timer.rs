use crate::domain::ports::EscrowTimer;
use crate::domain::transaction::TransactionId;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Key prefix of expiry signals.
pub const EXPIRY_KEY_PREFIX: &str = "txn:";

pub fn expiry_key(id: TransactionId) -> String {
    format!("{EXPIRY_KEY_PREFIX}{id}")
}

/// Timer backed by `tokio::time::sleep`. When a timer elapses its key is
/// published on the signal channel, like a keyspace expiry notification.
#[derive(Clone)]
pub struct TokioEscrowTimer {
    signals: mpsc::UnboundedSender<String>,
}

impl TokioEscrowTimer {
    /// Returns the timer and the receiving end of its expiry signals.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (signals, rx) = mpsc::unbounded_channel();
        (Self { signals }, rx)
    }
}

#[async_trait]
impl EscrowTimer for TokioEscrowTimer {
    async fn arm(&self, id: TransactionId, delay: Duration) -> Result<()> {
        let signals = self.signals.clone();
        let key = expiry_key(id);
        debug!(txn_id = %id, delay_ms = delay.as_millis() as u64, "Escrow timer armed");
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if signals.send(key).is_err() {
                warn!(txn_id = %id, "Expiry signal dropped: no listener");
            }
        });
        Ok(())
    }
}

/// Timer that never fires. The periodic sweep still escrows transactions.
#[derive(Default, Clone, Copy)]
pub struct DisabledEscrowTimer;

#[async_trait]
impl EscrowTimer for DisabledEscrowTimer {
    async fn arm(&self, _id: TransactionId, _delay: Duration) -> Result<()> {
        Ok(())
    }
}
