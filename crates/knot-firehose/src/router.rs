//! Dispatches a single firehose message to the store/auth mutation it
//! describes, and advances the cursor regardless of outcome.

use knot_auth::Enforcer;
use knot_core::Did;
use knot_git::{Caches, GitEngine};
use knot_store::{DidRole, Store};
use std::sync::Arc;

use crate::error::{FirehoseError, Result};
use crate::messages::{FirehoseMessage, FirehoseRecord};
use crate::trigger;

/// Where repos live on disk, so the pull handler can open the right
/// bare repo to compile a pipeline trigger from.
pub trait RepoLocator: Send + Sync {
    fn repo_path(&self, repo_at_uri: &str) -> Option<std::path::PathBuf>;
}

/// Fetches a DID's public keys from the appview, used to seed the local
/// `public_keys` table the first time a DID is admitted to this knot.
#[async_trait::async_trait]
pub trait KeyFetcher: Send + Sync {
    async fn fetch_keys(&self, did: &str) -> Result<Vec<String>>;
}

/// Dispatches firehose messages against the store, the RBAC enforcer, and
/// (for pull records) a git engine opened against the target repo.
pub struct MessageRouter<L, K> {
    store: Store,
    enforcer: Enforcer,
    domain: String,
    caches: Arc<Caches>,
    locator: L,
    keys: K,
}

impl<L, K> MessageRouter<L, K>
where
    L: RepoLocator,
    K: KeyFetcher,
{
    pub fn new(store: Store, enforcer: Enforcer, domain: String, caches: Arc<Caches>, locator: L, keys: K) -> Self {
        Self {
            store,
            enforcer,
            domain,
            caches,
            locator,
            keys,
        }
    }

    /// Handles one message. Handler errors are returned to the caller, who
    /// (per the ingester's contract) logs them and advances the cursor
    /// regardless -- a poison-pill record must never wedge the pipeline.
    pub async fn handle(&self, msg: &FirehoseMessage) -> Result<()> {
        match &msg.record {
            FirehoseRecord::PublicKey { key } => self.handle_public_key(&msg.did, key, msg.time_us).await,
            FirehoseRecord::KnotMember { domain, subject } => {
                self.handle_knot_member(&msg.did, domain, subject, msg.time_us).await
            }
            FirehoseRecord::RepoCollaborator { repo_at_uri, subject } => {
                self.handle_repo_collaborator(&msg.did, repo_at_uri, subject).await
            }
            FirehoseRecord::Pull {
                repo_at_uri,
                source_branch,
            } => self.handle_pull(repo_at_uri, source_branch, msg.time_us).await,
        }
    }

    async fn handle_public_key(&self, did: &str, key: &str, time_us: i64) -> Result<()> {
        let did = Did::parse(did).map_err(|e| FirehoseError::MalformedMessage(e.to_string()))?;
        self.store.insert_public_key(&did, key, time_us).await?;
        Ok(())
    }

    async fn handle_knot_member(&self, asserter: &str, domain: &str, subject: &str, time_us: i64) -> Result<()> {
        if domain != self.domain {
            return Ok(());
        }
        if !self.enforcer.is_server_invite_allowed(asserter, domain).await? {
            return Err(FirehoseError::AccessDenied(format!(
                "{asserter} may not invite members to {domain}"
            )));
        }
        let subject_did = Did::parse(subject).map_err(|e| FirehoseError::MalformedMessage(e.to_string()))?;
        self.enforcer.add_knot_member(subject, domain).await?;
        self.store.add_known_did(&subject_did, DidRole::Member, time_us).await?;
        for key in self.keys.fetch_keys(subject).await? {
            self.store.insert_public_key(&subject_did, &key, time_us).await?;
        }
        Ok(())
    }

    async fn handle_repo_collaborator(&self, asserter: &str, repo_at_uri: &str, subject: &str) -> Result<()> {
        let repo = repo_from_at_uri(repo_at_uri)?;
        if !self
            .enforcer
            .is_collaborator_invite_allowed(asserter, &self.domain, &repo)
            .await?
        {
            return Err(FirehoseError::AccessDenied(format!(
                "{asserter} may not invite collaborators on {repo}"
            )));
        }
        let subject_did = Did::parse(subject).map_err(|e| FirehoseError::MalformedMessage(e.to_string()))?;
        self.enforcer.add_collaborator(subject, &self.domain, &repo).await?;
        self.store.add_known_did(&subject_did, DidRole::Collaborator, 0).await?;
        for key in self.keys.fetch_keys(subject).await? {
            self.store.insert_public_key(&subject_did, &key, 0).await?;
        }
        Ok(())
    }

    async fn handle_pull(&self, repo_at_uri: &str, source_branch: &str, time_us: i64) -> Result<()> {
        let repo = repo_from_at_uri(repo_at_uri)?;
        let Some(path) = self.locator.repo_path(repo_at_uri) else {
            return Ok(());
        };
        let engine = GitEngine::open(path, self.caches.clone())?;
        let Some(compiled) = trigger::compile(&engine, &repo, source_branch).await? else {
            return Ok(());
        };
        let payload = serde_json::to_value(&compiled).map_err(|e| FirehoseError::MalformedMessage(e.to_string()))?;
        self.store.append_event("sh.tangled.pipeline.trigger", &payload).await?;
        let _ = time_us;
        Ok(())
    }
}

fn repo_from_at_uri(at_uri: &str) -> Result<String> {
    // `at://did:plc:xyz/sh.tangled.repo/name` -> `did:plc:xyz/name`
    let rest = at_uri
        .strip_prefix("at://")
        .ok_or_else(|| FirehoseError::MalformedMessage(format!("not an AT-URI: {at_uri}")))?;
    let mut parts = rest.splitn(3, '/');
    let did = parts
        .next()
        .ok_or_else(|| FirehoseError::MalformedMessage(at_uri.to_string()))?;
    let _collection = parts.next();
    let name = parts
        .next()
        .ok_or_else(|| FirehoseError::MalformedMessage(at_uri.to_string()))?;
    Ok(format!("{did}/{name}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_at_uri() {
        let repo = repo_from_at_uri("at://did:plc:abc/sh.tangled.repo/proj").unwrap();
        assert_eq!(repo, "did:plc:abc/proj");
    }

    #[test]
    fn rejects_a_uri_missing_the_at_scheme() {
        assert!(repo_from_at_uri("did:plc:abc/sh.tangled.repo/proj").is_err());
    }

    #[test]
    fn rejects_a_uri_missing_the_record_key() {
        assert!(repo_from_at_uri("at://did:plc:abc/sh.tangled.repo").is_err());
    }

    struct NoRepos;
    impl RepoLocator for NoRepos {
        fn repo_path(&self, _repo_at_uri: &str) -> Option<std::path::PathBuf> {
            None
        }
    }
    struct NoKeys;
    #[async_trait::async_trait]
    impl KeyFetcher for NoKeys {
        async fn fetch_keys(&self, _did: &str) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
    }

    async fn router() -> MessageRouter<NoRepos, NoKeys> {
        let store = Store::open_in_memory().await.unwrap();
        let enforcer = Enforcer::new(store.clone());
        enforcer.add_knot("knot.example").await.unwrap();
        enforcer.add_knot_owner("did:plc:owner", "knot.example").await.unwrap();
        MessageRouter::new(
            store,
            enforcer,
            "knot.example".to_string(),
            Arc::new(Caches::new()),
            NoRepos,
            NoKeys,
        )
    }

    #[tokio::test]
    async fn public_key_record_is_inserted() {
        let r = router().await;
        let msg = FirehoseMessage {
            did: "did:plc:a".into(),
            time_us: 1,
            record: FirehoseRecord::PublicKey {
                key: "ssh-ed25519 AAAA".into(),
            },
        };
        r.handle(&msg).await.unwrap();
        let keys = r.store.public_keys_for(&Did::parse("did:plc:a").unwrap()).await.unwrap();
        assert_eq!(keys.len(), 1);
    }

    #[tokio::test]
    async fn knot_member_record_from_a_non_owner_is_denied() {
        let r = router().await;
        let msg = FirehoseMessage {
            did: "did:plc:stranger".into(),
            time_us: 1,
            record: FirehoseRecord::KnotMember {
                domain: "knot.example".into(),
                subject: "did:plc:new".into(),
            },
        };
        assert!(r.handle(&msg).await.is_err());
        assert!(!r.enforcer.is_knot_member("did:plc:new", "knot.example").await.unwrap());
    }

    #[tokio::test]
    async fn knot_member_record_from_the_owner_admits_the_subject() {
        let r = router().await;
        let msg = FirehoseMessage {
            did: "did:plc:owner".into(),
            time_us: 1,
            record: FirehoseRecord::KnotMember {
                domain: "knot.example".into(),
                subject: "did:plc:new".into(),
            },
        };
        r.handle(&msg).await.unwrap();
        assert!(r.enforcer.is_knot_member("did:plc:new", "knot.example").await.unwrap());
        assert!(r
            .store
            .is_known_did(&Did::parse("did:plc:new").unwrap())
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn repo_collaborator_record_requires_invite_rights() {
        let r = router().await;
        r.enforcer
            .add_repo("did:plc:owner", "knot.example", "did:plc:owner/proj")
            .await
            .unwrap();
        let msg = FirehoseMessage {
            did: "did:plc:stranger".into(),
            time_us: 1,
            record: FirehoseRecord::RepoCollaborator {
                repo_at_uri: "at://did:plc:owner/sh.tangled.repo/proj".into(),
                subject: "did:plc:collab".into(),
            },
        };
        assert!(r.handle(&msg).await.is_err());
    }

    #[tokio::test]
    async fn pull_record_is_a_noop_when_the_repo_cannot_be_located() {
        let r = router().await;
        let msg = FirehoseMessage {
            did: "did:plc:owner".into(),
            time_us: 1,
            record: FirehoseRecord::Pull {
                repo_at_uri: "at://did:plc:owner/sh.tangled.repo/proj".into(),
                source_branch: "main".into(),
            },
        };
        r.handle(&msg).await.unwrap();
    }
}
