//! Resolves a `<did>/<name>` repo identifier to an open [`GitEngine`],
//! shared by the XRPC handlers and the Smart-HTTP git proxy.

use knot_git::GitEngine;

use crate::error::{ApiError, Result};
use crate::state::AppState;

/// Splits `did/name`, validates the name, and opens the bare repo at
/// `<scan_root>/<did>/<name>`.
pub fn open_repo(state: &AppState, repo: &str) -> Result<GitEngine> {
    let (did, name) = split_repo(repo)?;
    if !knot_core::is_valid_repo_name(name) {
        return Err(ApiError::InvalidRequest(format!("invalid repo name: {name}")));
    }
    let path = state.repo_path(did, name)?;
    Ok(GitEngine::open(path, state.caches.clone())?)
}

/// Splits `did/name` into its two components, rejecting anything else.
pub fn split_repo(repo: &str) -> Result<(&str, &str)> {
    repo.split_once('/')
        .filter(|(did, name)| did.starts_with("did:") && !name.is_empty())
        .ok_or_else(|| ApiError::InvalidRequest(format!("malformed repo identifier: {repo}")))
}
