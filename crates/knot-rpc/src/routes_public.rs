//! The public router: knot metadata, the `/events` websocket tail, the
//! Smart-HTTP git proxy, and `/xrpc/<nsid>`.

use std::collections::HashMap;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use tracing::debug;

use knot_realtime::{EventTail, TailEvent};

use crate::git_http;
use crate::state::{AppState, RpcState};
use crate::xrpc;

pub fn router() -> Router<RpcState> {
    Router::new()
        .route("/", get(root))
        .route("/capabilities", get(capabilities))
        .route("/version", get(version))
        .route("/owner", get(owner))
        .route("/keys", get(keys))
        .route("/events", get(events))
        .route("/{did}/{name}/info/refs", get(git_http::info_refs))
        .route("/{did}/{name}/git-upload-pack", post(git_http::upload_pack))
        .route("/{did}/{name}/git-receive-pack", post(git_http::receive_pack))
        .route("/xrpc/{nsid}", get(xrpc::read).post(xrpc::mutate))
}

async fn root() -> &'static str {
    "knot\n"
}

async fn capabilities() -> Json<serde_json::Value> {
    Json(json!({
        "pull_requests": { "patch_submissions": true, "branch_submissions": true },
    }))
}

async fn version(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "version": env!("CARGO_PKG_VERSION"), "hostname": state.config.hostname }))
}

async fn owner(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({ "did": state.config.owner_did }))
}

async fn keys(State(state): State<AppState>) -> crate::error::Result<Json<serde_json::Value>> {
    let keys = state.store.all_public_keys().await?;
    Ok(Json(json!(keys)))
}

/// `GET /events?cursor=<us>` -- upgrades to a websocket that backfills
/// from `cursor` (or "now" if absent) and then tails new rows.
async fn events(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let cursor = params
        .get("cursor")
        .and_then(|v| v.parse::<i64>().ok())
        .unwrap_or_else(now_us);
    ws.on_upgrade(move |socket| tail_events(socket, state, cursor))
}

async fn tail_events(mut socket: WebSocket, state: AppState, cursor: i64) {
    let mut tail = EventTail::subscribe(state.store.clone(), state.notifier.clone(), cursor);

    match tail.drain().await {
        Ok(events) => {
            if send_events(&mut socket, events).await.is_err() {
                return;
            }
        }
        Err(e) => {
            debug!(error = %e, "events backfill failed");
            return;
        }
    }

    loop {
        match tail.next().await {
            Ok(TailEvent::Events(events)) => {
                if send_events(&mut socket, events).await.is_err() {
                    return;
                }
            }
            Ok(TailEvent::Keepalive) => {
                if socket.send(Message::Ping(Vec::new().into())).await.is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!(error = %e, "events tail failed");
                return;
            }
        }
    }
}

async fn send_events(socket: &mut WebSocket, events: Vec<knot_store::Event>) -> Result<(), axum::Error> {
    for event in events {
        let body = json!({ "rkey": event.rkey, "nsid": event.nsid, "event": event.payload });
        socket.send(Message::Text(body.to_string().into())).await?;
    }
    Ok(())
}

fn now_us() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn capabilities_reports_patch_and_branch_submissions() {
        let Json(body) = capabilities().await;
        assert_eq!(body["pull_requests"]["patch_submissions"], true);
    }
}
