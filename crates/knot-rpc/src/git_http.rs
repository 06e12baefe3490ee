//! Git Smart HTTP, read-only. `info/refs` advertises `git-upload-pack`
//! only; `git-receive-pack` (both the advertisement and the service
//! itself) is rejected with a 403 pointing the caller at SSH, which is
//! the only route that consults the RBAC enforcer before a write.

use std::process::Stdio;

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{ApiError, Result};
use crate::repo_ops::open_repo;
use crate::state::AppState;

const SSH_ONLY_MESSAGE: &str = "push is not permitted over HTTP; use git over SSH\n";

#[derive(Deserialize)]
pub struct InfoRefsQuery {
    service: Option<String>,
}

/// `GET /<did>/<name>/info/refs?service=git-upload-pack`
pub async fn info_refs(
    Path((did, name)): Path<(String, String)>,
    State(state): State<AppState>,
    Query(query): Query<InfoRefsQuery>,
) -> Result<Response> {
    let repo = format!("{did}/{name}");
    let engine = open_repo(&state, &repo)?;

    match query.service.as_deref() {
        Some("git-upload-pack") | None => {
            let output = Command::new("git")
                .current_dir(engine.path())
                .args(["upload-pack", "--stateless-rpc", "--advertise-refs", "."])
                .output()
                .await
                .map_err(|e| ApiError::InternalServerError(anyhow::anyhow!(e)))?;
            if !output.status.success() {
                return Err(ApiError::InternalServerError(anyhow::anyhow!(
                    "git upload-pack --advertise-refs failed: {}",
                    String::from_utf8_lossy(&output.stderr)
                )));
            }
            let mut body = pkt_line(b"# service=git-upload-pack\n");
            body.extend_from_slice(b"0000");
            body.extend_from_slice(&output.stdout);
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/x-git-upload-pack-advertisement")],
                body,
            )
                .into_response())
        }
        Some("git-receive-pack") => Ok(ssh_only_response()),
        Some(_) => Err(ApiError::InvalidRequest("unsupported service".to_string())),
    }
}

/// `POST /<did>/<name>/git-upload-pack`
pub async fn upload_pack(
    Path((did, name)): Path<(String, String)>,
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let repo = format!("{did}/{name}");
    let engine = open_repo(&state, &repo)?;

    let mut args = vec!["upload-pack", "--stateless-rpc"];
    if headers
        .get(header::CONTENT_ENCODING)
        .and_then(|v| v.to_str().ok())
        == Some("gzip")
    {
        return Err(ApiError::InvalidRequest("gzip request bodies are not supported".to_string()));
    }
    args.push(".");

    let mut child = Command::new("git")
        .current_dir(engine.path())
        .args(&args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| ApiError::InternalServerError(anyhow::anyhow!(e)))?;

    {
        let mut stdin = child.stdin.take().expect("stdin was piped");
        stdin
            .write_all(&body)
            .await
            .map_err(|e| ApiError::InternalServerError(anyhow::anyhow!(e)))?;
    }

    let output = child
        .wait_with_output()
        .await
        .map_err(|e| ApiError::InternalServerError(anyhow::anyhow!(e)))?;
    if !output.status.success() {
        return Err(ApiError::InternalServerError(anyhow::anyhow!(
            "git upload-pack failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/x-git-upload-pack-result")],
        output.stdout,
    )
        .into_response())
}

/// `POST /<did>/<name>/git-receive-pack` -- always denied. Writes go
/// through the SSH gateway, which is the only path that checks
/// `push-allowed` before touching the repository.
pub async fn receive_pack() -> Response {
    ssh_only_response()
}

fn ssh_only_response() -> Response {
    (StatusCode::FORBIDDEN, SSH_ONLY_MESSAGE).into_response()
}

fn pkt_line(data: &[u8]) -> Vec<u8> {
    let len = data.len() + 4;
    let mut out = format!("{len:04x}").into_bytes();
    out.extend_from_slice(data);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pkt_line_prefixes_with_its_own_length_in_hex() {
        let line = pkt_line(b"# service=git-upload-pack\n");
        assert_eq!(&line[..4], b"001e");
    }

    #[tokio::test]
    async fn receive_pack_is_always_forbidden() {
        let resp = receive_pack().await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }
}
