//! One worker per shard: owns a websocket connection scoped to its DID
//! slice, dispatches each message through the [`MessageRouter`], and
//! persists the cursor on a timer and on graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use knot_store::Store;

use crate::messages::FirehoseMessage;
use crate::router::{KeyFetcher, MessageRouter, RepoLocator};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
const CURSOR_SAVE_INTERVAL: Duration = Duration::from_secs(60);

/// A single shard's subscription: `endpoint` scoped to `dids` via the
/// jetstream `wantedDids` query parameter.
pub struct Worker<L, K> {
    endpoint: String,
    dids: Vec<String>,
    store: Store,
    router: Arc<MessageRouter<L, K>>,
    cancel: CancellationToken,
}

impl<L, K> Worker<L, K>
where
    L: RepoLocator + 'static,
    K: KeyFetcher + 'static,
{
    pub fn new(
        endpoint: String,
        dids: Vec<String>,
        store: Store,
        router: Arc<MessageRouter<L, K>>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            endpoint,
            dids,
            store,
            router,
            cancel,
        }
    }

    fn subscribe_url(&self) -> String {
        build_subscribe_url(&self.endpoint, &self.dids)
    }

    /// Runs until cancelled, reconnecting on any transport error.
    pub async fn run(self) {
        let mut cursor = self.store.read_cursor(now_us_placeholder()).await.unwrap_or(0);
        let mut save_timer = tokio::time::interval(CURSOR_SAVE_INTERVAL);

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            let (mut stream, _) = match tokio_tungstenite::connect_async(self.subscribe_url()).await {
                Ok(conn) => conn,
                Err(e) => {
                    warn!(error = %e, endpoint = %self.endpoint, "firehose connect failed, retrying");
                    tokio::select! {
                        _ = tokio::time::sleep(RECONNECT_DELAY) => continue,
                        _ = self.cancel.cancelled() => break,
                    }
                }
            };
            info!(endpoint = %self.endpoint, dids = self.dids.len(), "firehose worker connected");

            loop {
                tokio::select! {
                    _ = self.cancel.cancelled() => {
                        let _ = stream.close(None).await;
                        self.store.save_cursor(cursor).await.ok();
                        return;
                    }
                    _ = save_timer.tick() => {
                        if let Err(e) = self.store.save_cursor(cursor).await {
                            warn!(error = %e, "failed to persist firehose cursor");
                        }
                    }
                    next = stream.next() => {
                        match next {
                            Some(Ok(Message::Text(text))) => {
                                cursor = self.dispatch(&text, cursor).await;
                            }
                            Some(Ok(Message::Close(_))) | None => {
                                debug!("firehose connection closed, reconnecting");
                                break;
                            }
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                error!(error = %e, "firehose read error, reconnecting");
                                break;
                            }
                        }
                    }
                }
            }
        }

        self.store.save_cursor(cursor).await.ok();
    }

    /// Parses and routes one message, returning the cursor advanced to
    /// `max(cursor, event_time)` regardless of handler outcome -- a single
    /// poison-pill record must never wedge the shard.
    async fn dispatch(&self, text: &str, cursor: i64) -> i64 {
        let msg: FirehoseMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "discarding malformed firehose message");
                return cursor;
            }
        };
        if let Err(e) = self.router.handle(&msg).await {
            warn!(error = %e, did = %msg.did, "firehose handler failed");
        }
        cursor.max(msg.time_us)
    }
}

fn build_subscribe_url(endpoint: &str, dids: &[String]) -> String {
    let joined = dids.join("&wantedDids=");
    format!("{endpoint}?wantedDids={joined}")
}

fn now_us_placeholder() -> i64 {
    // `read_cursor`'s staleness check needs a "now"; the worker supplies
    // its own since `knot-store` stays free of a wall-clock dependency.
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribe_url_joins_every_did_as_a_repeated_query_param() {
        let dids = vec!["did:plc:a".to_string(), "did:plc:b".to_string()];
        let url = build_subscribe_url("wss://relay.example/subscribe", &dids);
        assert_eq!(
            url,
            "wss://relay.example/subscribe?wantedDids=did:plc:a&wantedDids=did:plc:b"
        );
    }

    #[test]
    fn subscribe_url_with_no_dids_has_an_empty_param() {
        let url = build_subscribe_url("wss://relay.example/subscribe", &[]);
        assert_eq!(url, "wss://relay.example/subscribe?wantedDids=");
    }
}
