//! The process-wide wake broker: writers call [`Notifier::notify_all`] after
//! a successful insert; subscribers hold a capacity-1 channel and are
//! expected to re-read from storage on every wake, not to trust the wake's
//! payload (there isn't one).
//!
//! The subscriber map is guarded by one mutex; subscribe/unsubscribe/
//! notify_all never block under load -- notify_all uses a non-blocking
//! send, so a slow or saturated subscriber simply misses this particular
//! wake and catches up on the next one.

use std::collections::HashMap;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use uuid::Uuid;

/// A subscriber's wake handle. Dropping it unsubscribes implicitly only if
/// the caller also calls [`Notifier::unsubscribe`]; the notifier itself
/// does not watch for drop.
pub type SubscriberId = Uuid;

/// Process-wide publish/subscribe broker for oplog writes.
#[derive(Debug, Default)]
pub struct Notifier {
    subscribers: Mutex<HashMap<SubscriberId, mpsc::Sender<()>>>,
}

impl Notifier {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a new subscriber, returning its id and a capacity-1 wake
    /// receiver.
    pub fn subscribe(&self) -> (SubscriberId, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        let id = Uuid::new_v4();
        self.subscribers.lock().insert(id, tx);
        (id, rx)
    }

    /// Removes a subscriber.
    pub fn unsubscribe(&self, id: SubscriberId) {
        self.subscribers.lock().remove(&id);
    }

    /// Wakes every subscriber. Non-blocking: a full channel (the
    /// subscriber hasn't drained its previous wake yet) just drops this
    /// one, since the subscriber will re-read everything on its next wake
    /// regardless.
    pub fn notify_all(&self) {
        let subscribers = self.subscribers.lock();
        for tx in subscribers.values() {
            let _ = tx.try_send(());
        }
    }

    /// Current subscriber count, for test observability and metrics.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscribe_and_notify_wakes_the_receiver() {
        let notifier = Notifier::new();
        let (_id, mut rx) = notifier.subscribe();

        notifier.notify_all();
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn unsubscribe_removes_the_subscriber() {
        let notifier = Notifier::new();
        let (id, _rx) = notifier.subscribe();
        assert_eq!(notifier.subscriber_count(), 1);

        notifier.unsubscribe(id);
        assert_eq!(notifier.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn a_full_channel_does_not_block_notify_all() {
        let notifier = Notifier::new();
        let (_id, rx) = notifier.subscribe();
        notifier.notify_all(); // fills the capacity-1 channel
        notifier.notify_all(); // must not block even though rx hasn't drained

        drop(rx);
    }

    #[tokio::test]
    async fn notify_all_reaches_every_subscriber() {
        let notifier = Notifier::new();
        let (_a, mut rx_a) = notifier.subscribe();
        let (_b, mut rx_b) = notifier.subscribe();

        notifier.notify_all();
        assert!(rx_a.recv().await.is_some());
        assert!(rx_b.recv().await.is_some());
    }
}
