//! HTTP surface for the knot code-hosting server: the public router
//! (knot metadata, Smart-HTTP git proxy, `/events`, `/xrpc/<nsid>`) and
//! the loopback-only internal router (`/push-allowed`, `/keys`,
//! `/hooks/post-receive`).

#![forbid(unsafe_code)]

mod error;
mod git_http;
mod repo_ops;
mod routes_internal;
mod routes_public;
mod service_auth;
mod state;
mod xrpc;

pub use error::{ApiError, Result};
pub use repo_ops::{open_repo, split_repo};
pub use service_auth::{ActorDid, AppviewKeyResolver, ServiceAuthKeyResolver};
pub use state::{AppState, KnotConfig, RpcState};

use axum::{http::StatusCode, routing::get, Router};
use tower_http::trace::TraceLayer;

/// Builds the public-facing router: knot metadata, the Smart-HTTP git
/// proxy, the `/events` websocket tail, and `/xrpc/<nsid>`.
pub fn public_router(state: RpcState) -> Router {
    routes_public::router()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds the loopback-only internal router: `/push-allowed`, `/keys`,
/// `/hooks/post-receive`. Callers are responsible for binding this only
/// to a loopback address.
pub fn internal_router(state: AppState) -> Router {
    routes_internal::router()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Readiness: the DB pool can acquire a connection and the scan root is
/// readable. Liveness (`/healthz`) only proves the process is up.
async fn readyz(axum::extract::State(state): axum::extract::State<AppState>) -> StatusCode {
    if state.store.check_ready().await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    if tokio::fs::metadata(&state.config.scan_root).await.is_err() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    StatusCode::NO_CONTENT
}
