//! The loopback-only internal router: `/push-allowed` (consulted by the
//! SSH gateway), `/keys` (consulted for `authorized_keys` generation),
//! and `/hooks/post-receive` (consulted by the hook delegate).

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use knot_git::GitEngine;

use crate::error::{ApiError, Result};
use crate::repo_ops::{open_repo, split_repo};
use crate::state::AppState;

const ZERO_SHA: &str = "0000000000000000000000000000000000000000";
const MAX_CREATION_COMMITS: usize = 100;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/push-allowed", get(push_allowed))
        .route("/keys", get(keys))
        .route("/hooks/post-receive", post(post_receive))
}

#[derive(Deserialize)]
struct PushAllowedQuery {
    user: String,
    repo: String,
}

/// `GET /push-allowed?user=<did>&repo=<did>/<name>` -- 204 permits,
/// anything else denies. The SSH gateway treats every non-204 response
/// identically, so a malformed query is denied rather than erroring.
async fn push_allowed(State(state): State<AppState>, Query(q): Query<PushAllowedQuery>) -> StatusCode {
    let allowed = state
        .enforcer
        .is_push_allowed(&q.user, &state.config.hostname, &q.repo)
        .await
        .unwrap_or(false);
    if allowed {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::FORBIDDEN
    }
}

async fn keys(State(state): State<AppState>) -> Result<Json<serde_json::Value>> {
    let keys = state.store.all_public_keys().await?;
    Ok(Json(json!(keys)))
}

/// One line of `post-receive` stdin: `old_sha new_sha ref`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PostReceiveLine {
    old_sha: String,
    new_sha: String,
    refname: String,
}

fn parse_lines(body: &str) -> Vec<PostReceiveLine> {
    body.lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let old_sha = parts.next()?.to_string();
            let new_sha = parts.next()?.to_string();
            let refname = parts.next()?.to_string();
            Some(PostReceiveLine { old_sha, new_sha, refname })
        })
        .collect()
}

#[derive(Debug, Serialize)]
struct CommitAuthorCounts {
    #[serde(flatten)]
    by_email: HashMap<String, usize>,
}

/// Computes the range spec per the creation/update rule, enumerates it
/// with `list_commits`, and tallies commits per author email.
async fn author_commit_counts(
    engine: &GitEngine,
    line: &PostReceiveLine,
    all_branches: &[String],
) -> knot_git::Result<CommitAuthorCounts> {
    let branch = line.refname.trim_start_matches("refs/heads/");
    let commits = if line.old_sha == ZERO_SHA {
        let mut revspecs: Vec<String> = vec![line.new_sha.clone()];
        for other in all_branches.iter().filter(|b| b.as_str() != branch) {
            revspecs.push(format!("^{other}"));
        }
        revspecs.push("--not".to_string());
        revspecs.push(format!("^{branch}"));
        engine.list_commits_for_revspecs(&revspecs, MAX_CREATION_COMMITS).await?
    } else {
        let range = format!("{}..{}", line.old_sha, line.new_sha);
        engine.list_commits(&range, 0, MAX_CREATION_COMMITS).await?
    };

    let mut by_email = HashMap::new();
    for commit in commits {
        *by_email.entry(commit.author_email).or_insert(0) += 1;
    }
    Ok(CommitAuthorCounts { by_email })
}

/// `POST /hooks/post-receive` -- body is raw post-receive stdin; headers
/// carry `X-Git-Dir`, `X-Git-User-Did`, `X-Git-User-Handle`.
///
/// Never fails the push: the client side of this call is `git` itself, and
/// a non-zero exit here would abort the user's push after the objects are
/// already written. Every failure past header parsing is logged and
/// swallowed.
async fn post_receive(State(state): State<AppState>, headers: HeaderMap, body: String) -> Result<StatusCode> {
    let git_dir = header(&headers, "x-git-dir")?;
    let user_did = header(&headers, "x-git-user-did")?;
    let user_handle = headers
        .get("x-git-user-handle")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let Ok(repo) = repo_from_git_dir(&git_dir) else {
        tracing::warn!(git_dir, "post-receive: unresolvable X-Git-Dir");
        return Ok(StatusCode::NO_CONTENT);
    };
    let Ok(engine) = open_repo(&state, &repo) else {
        tracing::warn!(repo, "post-receive: failed to open repo");
        return Ok(StatusCode::NO_CONTENT);
    };
    let default_branch = engine.default_branch().await.ok();
    let branch_names: Vec<String> = engine
        .list_branches()
        .await
        .map(|branches| branches.iter().map(|b| b.name.clone()).collect())
        .unwrap_or_default();

    for line in parse_lines(&body) {
        let branch = line.refname.trim_start_matches("refs/heads/");
        let is_default_branch = default_branch.as_deref() == Some(branch);
        let counts = match author_commit_counts(&engine, &line, &branch_names).await {
            Ok(counts) => counts.by_email,
            Err(e) => {
                tracing::warn!(repo, refname = line.refname, error = %e, "post-receive: commit tally failed");
                Default::default()
            }
        };
        let languages = engine.analyze_languages(&line.new_sha).await.ok();

        let payload = json!({
            "repo": repo,
            "ref": line.refname,
            "old_sha": line.old_sha,
            "new_sha": line.new_sha,
            "is_default_branch": is_default_branch,
            "pusher_did": user_did,
            "pusher_handle": user_handle,
            "commits_by_author": counts,
            "languages": languages,
        });
        match state.store.append_event("sh.tangled.git.refUpdate", &payload).await {
            Ok(_) => state.notifier.notify_all(),
            Err(e) => tracing::warn!(repo, refname = line.refname, error = %e, "post-receive: event insertion failed"),
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

fn header(headers: &HeaderMap, name: &str) -> Result<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .ok_or_else(|| ApiError::InvalidRequest(format!("missing header: {name}")))
}

/// `X-Git-Dir` carries the absolute on-disk path; recovers the `<did>/<name>`
/// identifier from its last two components.
fn repo_from_git_dir(git_dir: &str) -> Result<String> {
    let path = std::path::Path::new(git_dir);
    let name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ApiError::InvalidRequest("malformed X-Git-Dir".to_string()))?;
    let did = path
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|s| s.to_str())
        .ok_or_else(|| ApiError::InvalidRequest("malformed X-Git-Dir".to_string()))?;
    let repo = format!("{did}/{name}");
    split_repo(&repo)?;
    Ok(repo)
}
