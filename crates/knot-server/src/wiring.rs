//! Adapters wiring the firehose's [`MessageRouter`] to this binary's
//! concrete repo layout and appview client.

use std::path::PathBuf;

use knot_firehose::{KeyFetcher, RepoLocator, Result as FirehoseResult};

/// Resolves an `at://<did>/<collection>/<rkey>` pull record to the bare
/// repo path under the configured scan root.
pub struct ScanRootRepoLocator {
    scan_root: PathBuf,
}

impl ScanRootRepoLocator {
    pub fn new(scan_root: PathBuf) -> Self {
        Self { scan_root }
    }
}

impl RepoLocator for ScanRootRepoLocator {
    fn repo_path(&self, repo_at_uri: &str) -> Option<PathBuf> {
        let rest = repo_at_uri.strip_prefix("at://")?;
        let mut parts = rest.splitn(3, '/');
        let did = parts.next()?;
        let _collection = parts.next()?;
        let name = parts.next()?;
        knot_core::secure_join_all(&self.scan_root, [did, name]).ok()
    }
}

/// Fetches a newly-admitted DID's public keys from the appview, used to
/// seed the local `public_keys` table.
pub struct AppviewKeyFetcher {
    client: reqwest::Client,
    endpoint: String,
}

impl AppviewKeyFetcher {
    pub fn new(endpoint: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[async_trait::async_trait]
impl KeyFetcher for AppviewKeyFetcher {
    async fn fetch_keys(&self, did: &str) -> FirehoseResult<Vec<String>> {
        #[derive(serde::Deserialize)]
        struct KeysResponse {
            keys: Vec<String>,
        }
        let url = format!("{}/keys/{did}", self.endpoint);
        let resp = match self.client.get(&url).send().await {
            Ok(resp) => resp,
            Err(e) => {
                tracing::warn!(did, error = %e, "failed to fetch keys from appview");
                return Ok(Vec::new());
            }
        };
        if !resp.status().is_success() {
            return Ok(Vec::new());
        }
        match resp.json::<KeysResponse>().await {
            Ok(body) => Ok(body.keys),
            Err(e) => {
                tracing::warn!(did, error = %e, "malformed appview keys response");
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locates_a_repo_from_a_well_formed_at_uri() {
        let locator = ScanRootRepoLocator::new(PathBuf::from("/home/git"));
        let path = locator.repo_path("at://did:plc:abc/sh.tangled.repo/proj").unwrap();
        assert_eq!(path, PathBuf::from("/home/git/did:plc:abc/proj"));
    }

    #[test]
    fn a_malformed_at_uri_resolves_to_nothing() {
        let locator = ScanRootRepoLocator::new(PathBuf::from("/home/git"));
        assert!(locator.repo_path("not-a-uri").is_none());
    }
}
