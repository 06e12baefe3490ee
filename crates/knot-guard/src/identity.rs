//! Resolves the `<user>` component of a forced command to a DID, before
//! any filesystem path is built from it.

use serde::Deserialize;
use thiserror::Error;

use knot_core::Did;

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("malformed DID: {0}")]
    MalformedDid(#[from] knot_core::Error),
    #[error("failed to resolve handle '{0}': {1}")]
    ResolveFailed(String, String),
}

/// `user` is either a DID (optionally flattened, `-` in place of `:`) or a
/// handle. DIDs are recognised and unflattened locally; anything else is
/// resolved against the appview's handle-resolution endpoint.
pub async fn resolve(client: &reqwest::Client, appview_endpoint: &str, user: &str) -> Result<Did, IdentityError> {
    if user.starts_with("did:") || user.starts_with("did-") {
        return Ok(Did::unflatten(user)?);
    }
    resolve_handle(client, appview_endpoint, user).await
}

async fn resolve_handle(client: &reqwest::Client, appview_endpoint: &str, handle: &str) -> Result<Did, IdentityError> {
    #[derive(Deserialize)]
    struct ResolveResponse {
        did: String,
    }
    let url = format!("{appview_endpoint}/identity/resolve?handle={handle}");
    let resp = client
        .get(&url)
        .send()
        .await
        .map_err(|e| IdentityError::ResolveFailed(handle.to_string(), e.to_string()))?;
    if !resp.status().is_success() {
        return Err(IdentityError::ResolveFailed(handle.to_string(), resp.status().to_string()));
    }
    let body: ResolveResponse = resp
        .json()
        .await
        .map_err(|e| IdentityError::ResolveFailed(handle.to_string(), e.to_string()))?;
    Ok(Did::parse(body.did)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn a_did_shaped_user_is_recognised_without_a_network_call() {
        let client = reqwest::Client::new();
        let did = resolve(&client, "http://unused.invalid", "did:plc:abc").await.unwrap();
        assert_eq!(did.as_str(), "did:plc:abc");
    }

    #[tokio::test]
    async fn a_flattened_did_is_unflattened() {
        let client = reqwest::Client::new();
        let did = resolve(&client, "http://unused.invalid", "did-plc-abc").await.unwrap();
        assert_eq!(did.as_str(), "did:plc:abc");
    }
}
