//! The `KnownDID` set: DIDs whose activity the knot processes.

use serde::{Deserialize, Serialize};
use sqlx::Row;

use knot_core::Did;

use crate::error::Result;
use crate::pool::Store;

/// Why a DID became known to this knot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DidRole {
    /// Configured at startup as the knot's administrator.
    Owner,
    /// Admitted via a firehose knot-member record.
    Member,
    /// Admitted via a firehose repo-collaborator record.
    Collaborator,
}

impl DidRole {
    fn as_str(self) -> &'static str {
        match self {
            DidRole::Owner => "owner",
            DidRole::Member => "member",
            DidRole::Collaborator => "collaborator",
        }
    }

    fn parse(s: &str) -> Self {
        match s {
            "owner" => DidRole::Owner,
            "collaborator" => DidRole::Collaborator,
            _ => DidRole::Member,
        }
    }
}

impl Store {
    /// Adds a DID to the known set if it is not already present. Known DIDs
    /// are never removed except by explicit tooling, so this is the only
    /// mutator this table needs.
    pub async fn add_known_did(&self, did: &Did, role: DidRole, created_at_us: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO known_dids (did, role, created_at) VALUES (?, ?, ?)
             ON CONFLICT(did) DO NOTHING",
        )
        .bind(did.as_str())
        .bind(role.as_str())
        .bind(created_at_us)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns true if `did` is in the known set.
    pub async fn is_known_did(&self, did: &Did) -> Result<bool> {
        let row = sqlx::query("SELECT 1 FROM known_dids WHERE did = ?")
            .bind(did.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Lists every known DID.
    pub async fn list_known_dids(&self) -> Result<Vec<Did>> {
        let rows = sqlx::query("SELECT did FROM known_dids")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|row| {
                let s: String = row.get("did");
                Did::parse(s).map_err(|e| {
                    crate::error::StoreError::NotFound(format!("corrupt did row: {e}"))
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn add_and_list_known_dids() {
        let store = Store::open_in_memory().await.unwrap();
        let owner = Did::parse("did:plc:owner").unwrap();
        let member = Did::parse("did:plc:member").unwrap();

        store.add_known_did(&owner, DidRole::Owner, 1).await.unwrap();
        store.add_known_did(&member, DidRole::Member, 2).await.unwrap();

        assert!(store.is_known_did(&owner).await.unwrap());
        assert!(store.is_known_did(&member).await.unwrap());
        assert!(!store
            .is_known_did(&Did::parse("did:plc:stranger").unwrap())
            .await
            .unwrap());

        let all = store.list_known_dids().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn adding_same_did_twice_is_idempotent() {
        let store = Store::open_in_memory().await.unwrap();
        let did = Did::parse("did:plc:owner").unwrap();
        store.add_known_did(&did, DidRole::Owner, 1).await.unwrap();
        store.add_known_did(&did, DidRole::Owner, 2).await.unwrap();

        let all = store.list_known_dids().await.unwrap();
        assert_eq!(all.len(), 1);
    }

    #[test]
    fn role_round_trips_through_str() {
        for role in [DidRole::Owner, DidRole::Member, DidRole::Collaborator] {
            assert_eq!(DidRole::parse(role.as_str()), role);
        }
    }
}
