use crate::domain::ports::Notifier;
use std::collections::HashMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::{debug, warn};

pub type SubscriberId = u64;

/// Fans lifecycle messages out to every connected subscriber.
///
/// Subscribers are unbounded channels, so `broadcast` never waits. A
/// subscriber whose receiver is gone is dropped from the registry; the others
/// still receive the message.
#[derive(Default)]
pub struct BroadcastNotifier {
    subscribers: RwLock<HashMap<SubscriberId, mpsc::UnboundedSender<String>>>,
    next_id: AtomicU64,
}

impl BroadcastNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> (SubscriberId, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        match self.subscribers.write() {
            Ok(mut subscribers) => {
                subscribers.insert(id, tx);
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(id, tx);
            }
        }
        debug!(subscriber = id, "Subscriber connected");
        (id, rx)
    }

    pub fn unsubscribe(&self, id: SubscriberId) {
        match self.subscribers.write() {
            Ok(mut subscribers) => subscribers.remove(&id),
            Err(poisoned) => poisoned.into_inner().remove(&id),
        };
        debug!(subscriber = id, "Subscriber disconnected");
    }

    pub fn subscriber_count(&self) -> usize {
        match self.subscribers.read() {
            Ok(subscribers) => subscribers.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

impl Notifier for BroadcastNotifier {
    fn broadcast(&self, message: &str) {
        let mut dead = Vec::new();
        {
            let subscribers = match self.subscribers.read() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            for (id, tx) in subscribers.iter() {
                if tx.send(message.to_string()).is_err() {
                    warn!(subscriber = id, "Failed to deliver notification");
                    dead.push(*id);
                }
            }
        }
        for id in dead {
            self.unsubscribe(id);
        }
    }
}

/// Notifier that only logs. Used when nobody listens.
#[derive(Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn broadcast(&self, message: &str) {
        tracing::info!(target: "tracktrove::notify", "{message}");
    }
}
