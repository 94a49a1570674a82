//! Live Audit Broadcast Registry
//!
//! Tracks every live log subscriber (one per WebSocket connection) in an explicit
//! registry. Subscribers whose receiving side has gone away are pruned on the next
//! broadcast, and a [`Subscription`] unregisters itself when dropped.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, warn};
use uuid::Uuid;

use super::types::AuditRecord;

/// Per-subscriber buffer. A subscriber that falls this far behind misses records.
const SUBSCRIBER_BUFFER: usize = 256;

/// Registry of live audit-log subscribers.
#[derive(Clone, Default)]
pub struct LogBroadcaster {
    subscribers: Arc<DashMap<Uuid, mpsc::Sender<Arc<AuditRecord>>>>,
}

impl LogBroadcaster {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn subscribe(&self) -> Subscription {
        let id = Uuid::now_v7();
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        self.subscribers.insert(id, tx);
        debug!(subscriber_id = %id, total = self.subscribers.len(), "Log subscriber registered");

        Subscription {
            id,
            rx,
            subscribers: Arc::clone(&self.subscribers),
        }
    }

    /// Deliver a record to every live subscriber. Returns how many received it.
    pub fn broadcast(&self, record: &AuditRecord) -> usize {
        if self.subscribers.is_empty() {
            return 0;
        }

        let record = Arc::new(record.clone());
        let mut delivered = 0;

        self.subscribers.retain(|id, tx| match tx.try_send(Arc::clone(&record)) {
            Ok(()) => {
                delivered += 1;
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(subscriber_id = %id, "Log subscriber lagging, dropping record");
                true
            }
            Err(TrySendError::Closed(_)) => {
                debug!(subscriber_id = %id, "Pruning closed log subscriber");
                false
            }
        });

        delivered
    }

    /// Number of registered subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Receiving half of a registered subscriber.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::Receiver<Arc<AuditRecord>>,
    subscribers: Arc<DashMap<Uuid, mpsc::Sender<Arc<AuditRecord>>>>,
}

impl Subscription {
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next record. Returns `None` once the registry drops this subscriber.
    pub async fn recv(&mut self) -> Option<Arc<AuditRecord>> {
        self.rx.recv().await
    }

    /// Take the next record if one is already queued.
    pub fn try_recv(&mut self) -> Option<Arc<AuditRecord>> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.subscribers.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditStatus;

    fn record(details: &str) -> AuditRecord {
        AuditRecord::new(
            None,
            "test",
            AuditStatus::Info,
            details,
            serde_json::Value::Null,
        )
    }

    #[tokio::test]
    async fn delivers_to_every_subscriber() {
        let broadcaster = LogBroadcaster::new();
        let mut a = broadcaster.subscribe();
        let mut b = broadcaster.subscribe();

        assert_eq!(broadcaster.broadcast(&record("one")), 2);

        assert_eq!(a.recv().await.unwrap().details, "one");
        assert_eq!(b.recv().await.unwrap().details, "one");
    }

    #[tokio::test]
    async fn dropped_subscription_unregisters() {
        let broadcaster = LogBroadcaster::new();
        let sub = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 1);
        drop(sub);
        assert_eq!(broadcaster.subscriber_count(), 0);
        assert_eq!(broadcaster.broadcast(&record("nobody")), 0);
    }

    #[tokio::test]
    async fn closed_receiver_is_pruned() {
        let broadcaster = LogBroadcaster::new();
        let (tx, rx) = mpsc::channel(1);
        broadcaster.subscribers.insert(Uuid::now_v7(), tx);
        drop(rx);

        let _live = broadcaster.subscribe();
        assert_eq!(broadcaster.subscriber_count(), 2);
        assert_eq!(broadcaster.broadcast(&record("x")), 1);
        assert_eq!(broadcaster.subscriber_count(), 1);
    }

    #[tokio::test]
    async fn lagging_subscriber_is_kept() {
        let broadcaster = LogBroadcaster::new();
        let mut sub = broadcaster.subscribe();
        for i in 0..SUBSCRIBER_BUFFER + 10 {
            broadcaster.broadcast(&record(&i.to_string()));
        }
        assert_eq!(broadcaster.subscriber_count(), 1);
        assert_eq!(sub.recv().await.unwrap().details, "0");
    }
}
