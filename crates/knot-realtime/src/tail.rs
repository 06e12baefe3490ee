//! The backfill-then-tail contract for a single `/events` subscriber:
//! drain everything newer than the cursor, then wait for a wake (or a
//! keepalive timer) and drain again.

use std::time::Duration;

use knot_store::{Event, Store};
use tokio::sync::mpsc;
use tokio::time::timeout;

use crate::notifier::{Notifier, SubscriberId};

const BACKFILL_PAGE: i64 = 100;
const KEEPALIVE: Duration = Duration::from_secs(30);

/// What a caller should do after one [`EventTail::next`] call.
pub enum TailEvent {
    /// New events are available; the cursor has already advanced past
    /// them.
    Events(Vec<Event>),
    /// No wake arrived within the keepalive window; the caller should send
    /// a websocket ping and call `next` again.
    Keepalive,
}

/// Owns one subscriber's cursor and wake channel across the lifetime of a
/// single `/events` connection.
pub struct EventTail {
    store: Store,
    notifier: std::sync::Arc<Notifier>,
    subscriber_id: SubscriberId,
    wake_rx: mpsc::Receiver<()>,
    cursor: i64,
}

impl EventTail {
    /// Subscribes to `notifier` and starts tailing from `cursor` (pass the
    /// query-string `cursor`, or "now" if absent, per the public route's
    /// parsing contract).
    pub fn subscribe(store: Store, notifier: std::sync::Arc<Notifier>, cursor: i64) -> Self {
        let (subscriber_id, wake_rx) = notifier.subscribe();
        Self {
            store,
            notifier,
            subscriber_id,
            wake_rx,
            cursor,
        }
    }

    /// Drains every row with `created_us > cursor`, advancing the cursor
    /// to the last row seen. Used both for the initial backfill and for
    /// post-wake re-reads -- the two are the same operation.
    pub async fn drain(&mut self) -> knot_store::Result<Vec<Event>> {
        let mut all = Vec::new();
        loop {
            let batch = self.store.events_after(self.cursor, BACKFILL_PAGE).await?;
            if batch.is_empty() {
                break;
            }
            self.cursor = batch.last().map(|e| e.created_us).unwrap_or(self.cursor);
            let done = batch.len() < BACKFILL_PAGE as usize;
            all.extend(batch);
            if done {
                break;
            }
        }
        Ok(all)
    }

    /// Waits for a wake or the 30s keepalive timer, then drains. Callers
    /// should loop on this until the client disconnects.
    pub async fn next(&mut self) -> knot_store::Result<TailEvent> {
        match timeout(KEEPALIVE, self.wake_rx.recv()).await {
            Ok(Some(())) => {
                let events = self.drain().await?;
                Ok(TailEvent::Events(events))
            }
            Ok(None) | Err(_) => Ok(TailEvent::Keepalive),
        }
    }
}

impl Drop for EventTail {
    fn drop(&mut self) {
        self.notifier.unsubscribe(self.subscriber_id);
    }
}
