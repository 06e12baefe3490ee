//! The RBAC decision engine.
//!
//! The model is kept as data -- policy rows `(sub, dom, obj, act)` and
//! grouping rows `(sub_or_role, parent_role, dom)` -- and matched by a pure
//! function, per the source's own guidance to avoid re-embedding a policy
//! DSL as code. State lives in [`knot_store::Store`]; the enforcer is a thin,
//! stateless wrapper that auto-saves every mutation.

use std::collections::HashSet;

use knot_store::{GroupingRow, PolicyRow, Store};

use crate::actions::{
    ACT_REPO_CREATE, ACT_REPO_DELETE, ACT_REPO_INVITE, ACT_REPO_PUSH, ACT_REPO_SETTINGS,
    ACT_SERVER_INVITE, COLLABORATOR_ACTIONS, REPO_OWNER_ACTIONS, ROLE_SERVER_MEMBER,
    ROLE_SERVER_OWNER,
};
use crate::error::{AuthError, Result};

/// Thin, stateless handle over a [`Store`] implementing the RBAC decision
/// rules described in the enforcer's policy model.
#[derive(Clone, Debug)]
pub struct Enforcer {
    store: Store,
}

impl Enforcer {
    /// Wraps `store` with RBAC semantics.
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Seeds a new knot domain: the owner role inherits member, the owner
    /// may invite at server scope, members may create repos.
    pub async fn add_knot(&self, domain: &str) -> Result<()> {
        self.store
            .add_policy(&policy(ROLE_SERVER_OWNER, domain, domain, ACT_SERVER_INVITE))
            .await?;
        self.store
            .add_policy(&policy(ROLE_SERVER_MEMBER, domain, domain, ACT_REPO_CREATE))
            .await?;
        self.store
            .add_grouping(&grouping(ROLE_SERVER_OWNER, ROLE_SERVER_MEMBER, domain))
            .await?;
        Ok(())
    }

    /// Registers a new repo created by `member`, granting the creator full
    /// repo-scoped rights and the domain owner delete rights.
    pub async fn add_repo(&self, member: &str, domain: &str, repo: &str) -> Result<()> {
        validate_repo(repo)?;
        for act in REPO_OWNER_ACTIONS {
            self.store.add_policy(&policy(member, domain, repo, act)).await?;
        }
        self.store
            .add_policy(&policy(ROLE_SERVER_OWNER, domain, repo, ACT_REPO_DELETE))
            .await?;
        Ok(())
    }

    /// Grants `did` collaborator rights (collaborate, settings, push) on
    /// `repo`.
    pub async fn add_collaborator(&self, did: &str, domain: &str, repo: &str) -> Result<()> {
        for act in COLLABORATOR_ACTIONS {
            self.store.add_policy(&policy(did, domain, repo, act)).await?;
        }
        Ok(())
    }

    /// Removes exactly the three collaborator actions from `did` on `repo`,
    /// and no others.
    pub async fn remove_collaborator(&self, did: &str, domain: &str, repo: &str) -> Result<()> {
        for act in COLLABORATOR_ACTIONS {
            self.store.remove_policy(&policy(did, domain, repo, act)).await?;
        }
        Ok(())
    }

    /// Makes `did` the sole owner of `domain`. Rebinding the existing owner
    /// to itself is a no-op; binding a different DID removes the prior
    /// owner's grouping row (but never the base policy seeds).
    pub async fn add_knot_owner(&self, did: &str, domain: &str) -> Result<()> {
        let current = self.get_users_by_role(domain, ROLE_SERVER_OWNER).await?;
        if current.iter().any(|d| d == did) {
            return Ok(());
        }
        for prior in current {
            self.store
                .remove_grouping(&grouping(&prior, ROLE_SERVER_OWNER, domain))
                .await?;
        }
        self.store.add_grouping(&grouping(did, ROLE_SERVER_OWNER, domain)).await?;
        Ok(())
    }

    /// Adds `did` as a member of `domain`.
    pub async fn add_knot_member(&self, did: &str, domain: &str) -> Result<()> {
        self.store.add_grouping(&grouping(did, ROLE_SERVER_MEMBER, domain)).await?;
        Ok(())
    }

    /// May `sub` admit new members to `domain` (server-scoped `server:invite`)?
    pub async fn is_server_invite_allowed(&self, sub: &str, domain: &str) -> Result<bool> {
        self.is_allowed(sub, domain, domain, ACT_SERVER_INVITE).await
    }

    /// May `sub` push to `repo` in `domain`?
    pub async fn is_push_allowed(&self, sub: &str, domain: &str, repo: &str) -> Result<bool> {
        self.is_allowed(sub, domain, repo, ACT_REPO_PUSH).await
    }

    /// May `sub` change settings on `repo` in `domain`?
    pub async fn is_settings_allowed(&self, sub: &str, domain: &str, repo: &str) -> Result<bool> {
        self.is_allowed(sub, domain, repo, ACT_REPO_SETTINGS).await
    }

    /// May `sub` invite a collaborator onto `repo` in `domain`?
    pub async fn is_collaborator_invite_allowed(
        &self,
        sub: &str,
        domain: &str,
        repo: &str,
    ) -> Result<bool> {
        self.is_allowed(sub, domain, repo, ACT_REPO_INVITE).await
    }

    /// May `sub` delete `repo` in `domain`?
    pub async fn is_repo_delete_allowed(&self, sub: &str, domain: &str, repo: &str) -> Result<bool> {
        self.is_allowed(sub, domain, repo, ACT_REPO_DELETE).await
    }

    /// Is `sub` a member (or owner, by role closure) of `domain`?
    pub async fn is_knot_member(&self, sub: &str, domain: &str) -> Result<bool> {
        let groupings = self.store.groupings_in_domain(domain).await?;
        Ok(closure_reaches(sub, ROLE_SERVER_MEMBER, &groupings))
    }

    /// Every DID-like subject whose grouping closure resolves to `role`
    /// within `domain`.
    pub async fn get_users_by_role(&self, domain: &str, role: &str) -> Result<Vec<String>> {
        let groupings = self.store.groupings_in_domain(domain).await?;
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for row in &groupings {
            if row.sub_or_role.starts_with("did:")
                && seen.insert(row.sub_or_role.clone())
                && closure_reaches(&row.sub_or_role, role, &groupings)
            {
                out.push(row.sub_or_role.clone());
            }
        }
        Ok(out)
    }

    /// Every action `sub` holds on `repo` within `domain`, by direct grant
    /// or role closure.
    pub async fn get_permissions_in_repo(
        &self,
        sub: &str,
        domain: &str,
        repo: &str,
    ) -> Result<Vec<String>> {
        let policies = self.store.policies_in_domain(domain).await?;
        let groupings = self.store.groupings_in_domain(domain).await?;
        let mut acts: Vec<String> = policies
            .iter()
            .filter(|p| p.obj == repo && closure_reaches(sub, &p.sub, &groupings))
            .map(|p| p.act.clone())
            .collect();
        acts.sort();
        acts.dedup();
        Ok(acts)
    }

    async fn is_allowed(&self, sub: &str, domain: &str, obj: &str, act: &str) -> Result<bool> {
        let policies = self.store.policies_in_domain(domain).await?;
        let groupings = self.store.groupings_in_domain(domain).await?;
        Ok(policies
            .iter()
            .any(|p| p.act == act && p.obj == obj && closure_reaches(sub, &p.sub, &groupings)))
    }
}

fn policy(sub: &str, dom: &str, obj: &str, act: &str) -> PolicyRow {
    PolicyRow {
        sub: sub.to_string(),
        dom: dom.to_string(),
        obj: obj.to_string(),
        act: act.to_string(),
    }
}

fn grouping(sub_or_role: &str, parent_role: &str, dom: &str) -> GroupingRow {
    GroupingRow {
        sub_or_role: sub_or_role.to_string(),
        parent_role: parent_role.to_string(),
        dom: dom.to_string(),
    }
}

/// `g(sub, target, dom)`: true if `sub == target`, or `sub` is grouped
/// (directly or transitively, through role-to-role rows) under `target`.
/// Cycle-safe via a visited set.
fn closure_reaches(sub: &str, target: &str, groupings: &[GroupingRow]) -> bool {
    if sub == target {
        return true;
    }
    let mut visited = HashSet::new();
    let mut frontier = vec![sub.to_string()];
    while let Some(node) = frontier.pop() {
        if !visited.insert(node.clone()) {
            continue;
        }
        for row in groupings {
            if row.sub_or_role == node {
                if row.parent_role == target {
                    return true;
                }
                frontier.push(row.parent_role.clone());
            }
        }
    }
    false
}

fn validate_repo(repo: &str) -> Result<()> {
    let Some((owner, name)) = repo.split_once('/') else {
        return Err(AuthError::InvalidRepo(repo.to_string()));
    };
    if !owner.starts_with("did:") || name.is_empty() {
        return Err(AuthError::InvalidRepo(repo.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn enforcer() -> Enforcer {
        Enforcer::new(Store::open_in_memory().await.unwrap())
    }

    #[tokio::test]
    async fn owner_is_a_knot_member_by_closure() {
        let e = enforcer().await;
        e.add_knot("knot.example").await.unwrap();
        e.add_knot_owner("did:plc:owner", "knot.example").await.unwrap();

        assert!(e.is_knot_member("did:plc:owner", "knot.example").await.unwrap());
    }

    #[tokio::test]
    async fn adding_same_owner_twice_is_a_noop() {
        let e = enforcer().await;
        e.add_knot("knot.example").await.unwrap();
        e.add_knot_owner("did:plc:owner", "knot.example").await.unwrap();
        e.add_knot_owner("did:plc:owner", "knot.example").await.unwrap();

        let owners = e.get_users_by_role("knot.example", ROLE_SERVER_OWNER).await.unwrap();
        assert_eq!(owners, vec!["did:plc:owner".to_string()]);
    }

    #[tokio::test]
    async fn rebinding_owner_removes_only_the_grouping_row() {
        let e = enforcer().await;
        e.add_knot("knot.example").await.unwrap();
        e.add_knot_owner("did:plc:first", "knot.example").await.unwrap();
        e.add_knot_owner("did:plc:second", "knot.example").await.unwrap();

        let owners = e.get_users_by_role("knot.example", ROLE_SERVER_OWNER).await.unwrap();
        assert_eq!(owners, vec!["did:plc:second".to_string()]);
        // the base seed rows survive regardless of who holds the grouping
        assert!(e
            .is_push_allowed("did:plc:second", "knot.example", "knot.example")
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn repo_creator_gets_full_rights_and_owner_gets_delete() {
        let e = enforcer().await;
        e.add_knot("knot.example").await.unwrap();
        e.add_knot_owner("did:plc:owner", "knot.example").await.unwrap();
        e.add_repo("did:plc:mem", "knot.example", "did:plc:mem/proj").await.unwrap();

        assert!(e
            .is_push_allowed("did:plc:mem", "knot.example", "did:plc:mem/proj")
            .await
            .unwrap());
        assert!(e
            .is_repo_delete_allowed("did:plc:mem", "knot.example", "did:plc:mem/proj")
            .await
            .unwrap());
        assert!(e
            .is_repo_delete_allowed("did:plc:owner", "knot.example", "did:plc:mem/proj")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn add_repo_rejects_malformed_identifier() {
        let e = enforcer().await;
        let err = e.add_repo("did:plc:mem", "knot.example", "not-a-repo").await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn collaborator_gets_exactly_three_actions_and_removal_strips_only_those() {
        let e = enforcer().await;
        e.add_knot("knot.example").await.unwrap();
        e.add_repo("did:plc:mem", "knot.example", "did:plc:mem/proj").await.unwrap();
        e.add_collaborator("did:plc:collab", "knot.example", "did:plc:mem/proj")
            .await
            .unwrap();

        let perms = e
            .get_permissions_in_repo("did:plc:collab", "knot.example", "did:plc:mem/proj")
            .await
            .unwrap();
        assert_eq!(perms.len(), 3);

        e.remove_collaborator("did:plc:collab", "knot.example", "did:plc:mem/proj")
            .await
            .unwrap();
        let perms = e
            .get_permissions_in_repo("did:plc:collab", "knot.example", "did:plc:mem/proj")
            .await
            .unwrap();
        assert!(perms.is_empty());

        // the repo creator's own rights are untouched
        let owner_perms = e
            .get_permissions_in_repo("did:plc:mem", "knot.example", "did:plc:mem/proj")
            .await
            .unwrap();
        assert_eq!(owner_perms.len(), 6);
    }

    #[tokio::test]
    async fn strangers_are_denied() {
        let e = enforcer().await;
        e.add_knot("knot.example").await.unwrap();
        e.add_repo("did:plc:mem", "knot.example", "did:plc:mem/proj").await.unwrap();

        assert!(!e
            .is_push_allowed("did:plc:other", "knot.example", "did:plc:mem/proj")
            .await
            .unwrap());
    }
}
