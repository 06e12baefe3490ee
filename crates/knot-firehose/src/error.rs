//! Firehose ingester error types.

use thiserror::Error;

/// Errors the ingester surfaces. Per the propagation policy, handler
/// errors are logged and swallowed by the caller; only unrecoverable
/// websocket-setup errors trigger a backoff-and-retry.
#[derive(Debug, Error)]
pub enum FirehoseError {
    #[error("store error: {0}")]
    Store(#[from] knot_store::StoreError),

    #[error("auth error: {0}")]
    Auth(#[from] knot_auth::AuthError),

    #[error("git error: {0}")]
    Git(#[from] knot_git::GitError),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("appview request failed: {0}")]
    Appview(#[from] reqwest::Error),

    #[error("malformed firehose message: {0}")]
    MalformedMessage(String),

    #[error("access denied: {0}")]
    AccessDenied(String),
}

pub type Result<T> = std::result::Result<T, FirehoseError>;
