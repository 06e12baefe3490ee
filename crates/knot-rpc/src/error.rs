//! The error taxonomy surfaced to HTTP clients, and its `IntoResponse`
//! mapping to `{error: <tag>, message: <string>}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

use knot_auth::AuthError;
use knot_git::GitError;
use knot_store::StoreError;

/// Errors a handler can return. Every variant maps to a stable `{error,
/// message}` JSON body; `Internal` never leaks its wrapped detail to the
/// client.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("access denied")]
    AccessControl,

    #[error("missing actor DID")]
    MissingActorDid,

    #[error("repository not found: {0}")]
    RepoNotFound(String),

    #[error("ref not found: {0}")]
    RefNotFound(String),

    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("branch not found: {0}")]
    BranchNotFound(String),

    #[error("revision not found: {0}")]
    RevisionNotFound(String),

    #[error("repository already exists: {0}")]
    RepoExists(String),

    #[error("record already exists: {0}")]
    RecordExists(String),

    #[error("merge conflict")]
    MergeConflict {
        conflicts: Vec<knot_git::Conflict>,
        message: String,
    },

    #[error("git error: {0}")]
    GitError(String),

    #[error("internal server error")]
    InternalServerError(#[source] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

impl From<GitError> for ApiError {
    fn from(err: GitError) -> Self {
        match err {
            GitError::RepoNotFound(s) => ApiError::RepoNotFound(s),
            GitError::RepoExists(s) => ApiError::RepoExists(s),
            GitError::RefNotFound(s) => ApiError::RefNotFound(s),
            GitError::BranchNotFound(s) => ApiError::BranchNotFound(s),
            GitError::FileNotFound(s) => ApiError::FileNotFound(s),
            GitError::RevisionNotFound(s) => ApiError::RevisionNotFound(s),
            GitError::MergeConflict { conflicts, message } => ApiError::MergeConflict { conflicts, message },
            GitError::Command(s) => ApiError::GitError(s),
            GitError::Io(e) => ApiError::GitError(e.to_string()),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::InternalServerError(anyhow::anyhow!(err))
    }
}

impl From<knot_core::Error> for ApiError {
    fn from(err: knot_core::Error) -> Self {
        ApiError::InvalidRequest(err.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidRepo(s) => ApiError::InvalidRequest(s),
            AuthError::Store(e) => e.into(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, tag): (StatusCode, &str) = match &self {
            ApiError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "InvalidRequest"),
            ApiError::AccessControl => (StatusCode::FORBIDDEN, "AccessControl"),
            ApiError::MissingActorDid => (StatusCode::UNAUTHORIZED, "MissingActorDid"),
            ApiError::RepoNotFound(_) => (StatusCode::NOT_FOUND, "RepoNotFound"),
            ApiError::RefNotFound(_) => (StatusCode::NOT_FOUND, "RefNotFound"),
            ApiError::FileNotFound(_) => (StatusCode::NOT_FOUND, "FileNotFound"),
            ApiError::BranchNotFound(_) => (StatusCode::NOT_FOUND, "BranchNotFound"),
            ApiError::RevisionNotFound(_) => (StatusCode::NOT_FOUND, "RevisionNotFound"),
            ApiError::RepoExists(_) => (StatusCode::CONFLICT, "RepoExists"),
            ApiError::RecordExists(_) => (StatusCode::CONFLICT, "RecordExists"),
            ApiError::MergeConflict { .. } => (StatusCode::CONFLICT, "MergeConflict"),
            ApiError::GitError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "GitError"),
            ApiError::InternalServerError(_) => (StatusCode::INTERNAL_SERVER_ERROR, "InternalServerError"),
        };

        let message = match &self {
            // the catch-all never carries internal detail to the client
            ApiError::InternalServerError(_) => "internal server error".to_string(),
            ApiError::MergeConflict { message, .. } => message.clone(),
            other => other.to_string(),
        };

        if let ApiError::MergeConflict { conflicts, .. } = &self {
            #[derive(Serialize)]
            struct ConflictBody<'a> {
                error: &'a str,
                message: String,
                conflicts: &'a [knot_git::Conflict],
            }
            return (
                status,
                Json(ConflictBody {
                    error: tag,
                    message,
                    conflicts,
                }),
            )
                .into_response();
        }

        (status, Json(ErrorBody { error: tag, message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn internal_errors_never_leak_their_wrapped_message() {
        let err = ApiError::InternalServerError(anyhow::anyhow!("secret connection string"));
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn git_repo_not_found_maps_to_404() {
        let err: ApiError = GitError::RepoNotFound("did:plc:a/x".to_string()).into();
        assert!(matches!(err, ApiError::RepoNotFound(_)));
    }
}
