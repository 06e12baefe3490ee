//! Typed RPC surface under `/xrpc/<nsid>`. Read endpoints take query
//! parameters and need no authentication; mutation endpoints take a JSON
//! body and require a verified `ServiceAuth` bearer establishing
//! [`ActorDid`].

use std::collections::HashMap;

use axum::extract::{Path, Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use knot_git::GitEngine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{ApiError, Result};
use crate::repo_ops::open_repo;
use crate::service_auth::ActorDid;
use crate::state::AppState;

/// `GET /xrpc/<nsid>?repo=<did>/<name>&...`
pub async fn read(
    Path(nsid): Path<String>,
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Response> {
    let repo = param(&params, "repo")?;
    let engine = open_repo(&state, repo)?;
    let rev = params.get("rev").map(String::as_str).unwrap_or("HEAD");

    if nsid == "sh.tangled.repo.archive" {
        let default_prefix = repo.rsplit('/').next().unwrap_or(repo);
        let prefix = params.get("prefix").map(String::as_str).unwrap_or(default_prefix);
        return archive_response(&engine, rev, prefix).await;
    }

    let body = match nsid.as_str() {
        "sh.tangled.repo.tree" => {
            let path = params.get("path").map(String::as_str).unwrap_or("");
            json!(engine.list_tree(rev, path).await?)
        }
        "sh.tangled.repo.log" => {
            let offset = parse_opt(&params, "offset")?.unwrap_or(0);
            let limit = parse_opt(&params, "limit")?.unwrap_or(30);
            let commits = engine.list_commits(rev, offset, limit).await?;
            let total = engine.commit_count(rev).await?;
            json!({ "commits": commits, "total": total })
        }
        "sh.tangled.repo.blob" => {
            let path = param(&params, "path")?;
            json!(BlobResponse::from(engine.file_content(rev, path).await?))
        }
        "sh.tangled.repo.branches" => json!(engine.list_branches().await?),
        "sh.tangled.repo.branch" => {
            let name = param(&params, "name")?;
            let branches = engine.list_branches().await?;
            let branch = branches
                .into_iter()
                .find(|b| b.name == name)
                .ok_or_else(|| ApiError::BranchNotFound(name.to_string()))?;
            json!(branch)
        }
        "sh.tangled.repo.tags" => json!(engine.list_tags().await?),
        "sh.tangled.repo.diff" => json!(engine.diff_commit(rev).await?),
        "sh.tangled.repo.compare" => {
            let base = param(&params, "base")?;
            let head = param(&params, "head")?;
            json!(engine.compare_revs(base, head).await?)
        }
        "sh.tangled.repo.languages" => json!(engine.analyze_languages(rev).await?),
        "sh.tangled.repo.defaultBranch" => json!({ "branch": engine.default_branch().await? }),
        _ => return Err(ApiError::InvalidRequest(format!("unknown nsid: {nsid}"))),
    };
    Ok(Json(body).into_response())
}

/// Streams `git archive` straight from the child process's stdout into the
/// response body instead of buffering the whole tar in memory.
async fn archive_response(engine: &GitEngine, rev: &str, prefix: &str) -> Result<Response> {
    let mut child = knot_git::spawn_archive_stream(engine.path(), rev, prefix).await?;
    let stdout = child.stdout.take().expect("stdout was piped");
    tokio::spawn(async move {
        let _ = child.wait().await;
    });

    let stream = tokio_util::io::ReaderStream::new(stdout);
    let body = axum::body::Body::from_stream(stream);
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/x-tar".to_string()),
            (header::CONTENT_DISPOSITION, format!("attachment; filename=\"{prefix}.tar\"")),
        ],
        body,
    )
        .into_response())
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum BlobResponse {
    Text { content: String },
    Binary { base64: String },
}

impl From<knot_git::FileContent> for BlobResponse {
    fn from(content: knot_git::FileContent) -> Self {
        use base64::Engine;
        match content {
            knot_git::FileContent::Text(s) => BlobResponse::Text { content: s },
            knot_git::FileContent::Binary(b) => BlobResponse::Binary {
                base64: base64::engine::general_purpose::STANDARD.encode(b),
            },
        }
    }
}

#[derive(Deserialize)]
pub struct CreateRepoBody {
    pub name: String,
}

#[derive(Deserialize)]
pub struct SetDefaultBranchBody {
    pub repo: String,
    pub branch: String,
}

#[derive(Deserialize)]
pub struct ForkBody {
    pub source_repo: String,
    pub dest_name: String,
}

#[derive(Deserialize)]
pub struct MergeBody {
    pub repo: String,
    pub patch: String,
    pub target_branch: String,
}

#[derive(Deserialize)]
pub struct HiddenRefBody {
    pub repo: String,
    pub source_url: String,
    pub fork_ref: String,
    pub remote_ref: String,
}

#[derive(Deserialize)]
pub struct ForkSyncBody {
    pub repo: String,
    pub source_url: String,
    pub fork_ref: String,
    pub remote_ref: String,
}

#[derive(Deserialize)]
pub struct ForkStatusBody {
    pub repo: String,
    pub fork_ref: String,
    pub remote_ref: String,
}

#[derive(Deserialize)]
pub struct RepoOnlyBody {
    pub repo: String,
}

/// `POST /xrpc/<nsid>`, ServiceAuth-gated.
pub async fn mutate(
    Path(nsid): Path<String>,
    State(state): State<AppState>,
    actor: ActorDid,
    body: axum::body::Bytes,
) -> Result<Json<Value>> {
    let result = match nsid.as_str() {
        "sh.tangled.repo.create" => {
            let req: CreateRepoBody = parse_body(&body)?;
            create_repo(&state, &actor.0, &req.name).await?
        }
        "sh.tangled.repo.delete" => {
            let req: RepoOnlyBody = parse_body(&body)?;
            delete_repo(&state, &actor.0, &req.repo).await?
        }
        "sh.tangled.repo.setDefaultBranch" => {
            let req: SetDefaultBranchBody = parse_body(&body)?;
            if !state
                .enforcer
                .is_settings_allowed(&actor.0, &state.config.hostname, &req.repo)
                .await?
            {
                return Err(ApiError::AccessControl);
            }
            let engine = open_repo(&state, &req.repo)?;
            engine.set_default_branch(&req.branch).await?;
            json!({ "ok": true })
        }
        "sh.tangled.repo.fork" => {
            let req: ForkBody = parse_body(&body)?;
            let (source_did, source_name) = crate::repo_ops::split_repo(&req.source_repo)?;
            let source_path = state.repo_path(source_did, source_name)?;
            let dest_path = state.repo_path(&actor.0, &req.dest_name)?;
            let engine = GitEngine::fork(&source_path.display().to_string(), dest_path, state.caches.clone()).await?;
            state
                .enforcer
                .add_repo(&actor.0, &state.config.hostname, &format!("{}/{}", actor.0, req.dest_name))
                .await?;
            json!({ "default_branch": engine.default_branch().await.ok() })
        }
        "sh.tangled.repo.merge" => {
            let req: MergeBody = parse_body(&body)?;
            if !state
                .enforcer
                .is_push_allowed(&actor.0, &state.config.hostname, &req.repo)
                .await?
            {
                return Err(ApiError::AccessControl);
            }
            let engine = open_repo(&state, &req.repo)?;
            let identity = knot_git::CommitIdentity {
                name: actor.0.clone(),
                email: format!("{}@{}", actor.0.replace(':', "-"), state.config.hostname),
                message: "merge via RPC".to_string(),
            };
            let sha = engine.merge_apply(&req.patch, &req.target_branch, &identity).await?;
            json!({ "sha": sha })
        }
        "sh.tangled.repo.mergeCheck" => {
            #[derive(Deserialize)]
            struct Body {
                repo: String,
                patch: String,
                target_branch: String,
            }
            let req: Body = parse_body(&body)?;
            let engine = open_repo(&state, &req.repo)?;
            match engine.merge_check(&req.patch, &req.target_branch).await? {
                knot_git::MergeCheckOutcome::Clean => json!({ "is_conflicted": false }),
                knot_git::MergeCheckOutcome::Conflicted(conflicts) => json!({
                    "is_conflicted": true,
                    "conflicts": conflicts,
                    "message": "patch does not apply cleanly",
                }),
            }
        }
        "sh.tangled.repo.hiddenRef" => {
            let req: HiddenRefBody = parse_body(&body)?;
            let engine = open_repo(&state, &req.repo)?;
            engine
                .track_hidden_remote_ref(&req.source_url, &req.fork_ref, &req.remote_ref)
                .await?;
            json!({ "ok": true })
        }
        "sh.tangled.repo.forkSync" => {
            let req: ForkSyncBody = parse_body(&body)?;
            let engine = open_repo(&state, &req.repo)?;
            let status = engine
                .fork_sync(&req.source_url, &req.fork_ref, &req.remote_ref)
                .await?;
            json!(status)
        }
        "sh.tangled.repo.forkStatus" => {
            let req: ForkStatusBody = parse_body(&body)?;
            let engine = open_repo(&state, &req.repo)?;
            let status = engine.fork_status(&req.fork_ref, &req.remote_ref).await?;
            json!(status)
        }
        _ => return Err(ApiError::InvalidRequest(format!("unknown nsid: {nsid}"))),
    };
    Ok(Json(result))
}

async fn create_repo(state: &AppState, owner: &str, name: &str) -> Result<Value> {
    if !knot_core::is_valid_repo_name(name) {
        return Err(ApiError::InvalidRequest(format!("invalid repo name: {name}")));
    }
    if !state.enforcer.is_knot_member(owner, &state.config.hostname).await? {
        return Err(ApiError::AccessControl);
    }
    let path = state.repo_path(owner, name)?;
    let engine = GitEngine::init_bare(path, state.caches.clone()).await?;
    let repo = format!("{owner}/{name}");
    state.enforcer.add_repo(owner, &state.config.hostname, &repo).await?;
    Ok(json!({ "repo": repo, "default_branch": engine.default_branch().await.ok() }))
}

async fn delete_repo(state: &AppState, actor: &str, repo: &str) -> Result<Value> {
    if !state.enforcer.is_repo_delete_allowed(actor, &state.config.hostname, repo).await? {
        return Err(ApiError::AccessControl);
    }
    let (did, name) = crate::repo_ops::split_repo(repo)?;
    let path = state.repo_path(did, name)?;
    tokio::fs::remove_dir_all(&path)
        .await
        .map_err(|e| ApiError::InternalServerError(anyhow::anyhow!(e)))?;
    Ok(json!({ "ok": true }))
}

fn param<'a>(params: &'a HashMap<String, String>, key: &str) -> Result<&'a str> {
    params
        .get(key)
        .map(String::as_str)
        .ok_or_else(|| ApiError::InvalidRequest(format!("missing query param: {key}")))
}

fn parse_opt<T: std::str::FromStr>(params: &HashMap<String, String>, key: &str) -> Result<Option<T>> {
    match params.get(key) {
        Some(v) => v
            .parse()
            .map(Some)
            .map_err(|_| ApiError::InvalidRequest(format!("invalid {key}"))),
        None => Ok(None),
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::InvalidRequest(e.to_string()))
}
