//! # Change Notifications
//!
//! After every committed write the engine publishes a [`ChangeEvent`] on a
//! `tokio::sync::broadcast` channel. Listeners (the admin console's live
//! views, the chat notifier sidecar) subscribe with [`Engine::subscribe`].
//!
//! ```text
//! ┌───────────────┐  commit   ┌────────────────┐      ┌──────────────┐
//! │    Engine     │ ────────► │ ChangeNotifier │ ───► │ Receiver #1  │
//! │  operation    │  publish  │  (broadcast)   │ ───► │ Receiver #2  │
//! └───────────────┘           └────────────────┘      └──────────────┘
//! ```
//!
//! Publishing never blocks. A receiver that falls more than
//! [`CHANNEL_CAPACITY`] events behind gets `RecvError::Lagged` and skips
//! the oldest ones.
//!
//! [`Engine::subscribe`]: crate::Engine::subscribe

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::trace;
use ts_rs::TS;

/// Buffered events per receiver.
pub const CHANNEL_CAPACITY: usize = 256;

/// The record collection a change touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum Collection {
    Products,
    Purchases,
    Sales,
    Orders,
    Customers,
    Settings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ChangeKind {
    Created,
    Updated,
    Deleted,
}

/// One committed change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub id: String,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(collection: Collection, id: impl Into<String>, kind: ChangeKind) -> Self {
        ChangeEvent {
            collection,
            id: id.into(),
            kind,
        }
    }
}

/// Fan-out of change events to any number of subscribers.
#[derive(Debug, Clone)]
pub struct ChangeNotifier {
    tx: broadcast::Sender<ChangeEvent>,
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}

impl ChangeNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        ChangeNotifier { tx }
    }

    /// Returns a receiver that sees every event published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.tx.subscribe()
    }

    /// Publishes an event. Having no subscribers is not an error.
    pub fn publish(&self, event: ChangeEvent) {
        match self.tx.send(event) {
            Ok(receivers) => trace!(receivers, "Change published"),
            Err(broadcast::error::SendError(event)) => {
                trace!(collection = ?event.collection, id = %event.id, "No subscribers for change")
            }
        }
    }

    pub(crate) fn created(&self, collection: Collection, id: &str) {
        self.publish(ChangeEvent::new(collection, id, ChangeKind::Created));
    }

    pub(crate) fn updated(&self, collection: Collection, id: &str) {
        self.publish(ChangeEvent::new(collection, id, ChangeKind::Updated));
    }

    pub(crate) fn deleted(&self, collection: Collection, id: &str) {
        self.publish(ChangeEvent::new(collection, id, ChangeKind::Deleted));
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::RecvError;

    #[tokio::test]
    async fn test_publish_reaches_every_subscriber() {
        let notifier = ChangeNotifier::default();
        let mut a = notifier.subscribe();
        let mut b = notifier.subscribe();
        assert_eq!(notifier.receiver_count(), 2);

        notifier.created(Collection::Orders, "o-1");

        let expected = ChangeEvent::new(Collection::Orders, "o-1", ChangeKind::Created);
        assert_eq!(a.recv().await.unwrap(), expected);
        assert_eq!(b.recv().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let notifier = ChangeNotifier::default();
        notifier.deleted(Collection::Sales, "s-1");
        assert_eq!(notifier.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_old_events() {
        let notifier = ChangeNotifier::new(2);
        let mut rx = notifier.subscribe();
        for i in 0..5 {
            notifier.updated(Collection::Products, &format!("p-{}", i));
        }
        assert!(matches!(rx.recv().await, Err(RecvError::Lagged(3))));
        assert_eq!(rx.recv().await.unwrap().id, "p-3");
    }
}
