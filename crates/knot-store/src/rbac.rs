//! Raw RBAC policy and grouping rows.
//!
//! This module only persists rows; matching them against a request is
//! `knot-auth`'s job.

use serde::{Deserialize, Serialize};
use sqlx::Row;

use crate::error::Result;
use crate::pool::Store;

/// A single `(sub, dom, obj, act)` permission grant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRow {
    pub sub: String,
    pub dom: String,
    pub obj: String,
    pub act: String,
}

/// A single `(sub_or_role, parent_role, dom)` role-membership row:
/// `sub_or_role` acts as `parent_role` within `dom`. `sub_or_role` may itself
/// be a role name, letting roles inherit from other roles.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupingRow {
    pub sub_or_role: String,
    pub parent_role: String,
    pub dom: String,
}

impl Store {
    /// Adds a policy row, idempotent on the full tuple.
    pub async fn add_policy(&self, row: &PolicyRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO rbac_policies (sub, dom, obj, act) VALUES (?, ?, ?, ?)
             ON CONFLICT(sub, dom, obj, act) DO NOTHING",
        )
        .bind(&row.sub)
        .bind(&row.dom)
        .bind(&row.obj)
        .bind(&row.act)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Removes a policy row.
    pub async fn remove_policy(&self, row: &PolicyRow) -> Result<()> {
        sqlx::query("DELETE FROM rbac_policies WHERE sub = ? AND dom = ? AND obj = ? AND act = ?")
            .bind(&row.sub)
            .bind(&row.dom)
            .bind(&row.obj)
            .bind(&row.act)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All policy rows scoped to `dom`, the working set an enforcer needs to
    /// answer a single request.
    pub async fn policies_in_domain(&self, dom: &str) -> Result<Vec<PolicyRow>> {
        let rows = sqlx::query("SELECT sub, dom, obj, act FROM rbac_policies WHERE dom = ?")
            .bind(dom)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| PolicyRow {
                sub: row.get("sub"),
                dom: row.get("dom"),
                obj: row.get("obj"),
                act: row.get("act"),
            })
            .collect())
    }

    /// Adds a grouping row, idempotent on the full tuple.
    pub async fn add_grouping(&self, row: &GroupingRow) -> Result<()> {
        sqlx::query(
            "INSERT INTO rbac_groupings (sub_or_role, parent_role, dom) VALUES (?, ?, ?)
             ON CONFLICT(sub_or_role, parent_role, dom) DO NOTHING",
        )
        .bind(&row.sub_or_role)
        .bind(&row.parent_role)
        .bind(&row.dom)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Removes a grouping row.
    pub async fn remove_grouping(&self, row: &GroupingRow) -> Result<()> {
        sqlx::query(
            "DELETE FROM rbac_groupings WHERE sub_or_role = ? AND parent_role = ? AND dom = ?",
        )
        .bind(&row.sub_or_role)
        .bind(&row.parent_role)
        .bind(&row.dom)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All grouping rows scoped to `dom`.
    pub async fn groupings_in_domain(&self, dom: &str) -> Result<Vec<GroupingRow>> {
        let rows =
            sqlx::query("SELECT sub_or_role, parent_role, dom FROM rbac_groupings WHERE dom = ?")
                .bind(dom)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows
            .into_iter()
            .map(|row| GroupingRow {
                sub_or_role: row.get("sub_or_role"),
                parent_role: row.get("parent_role"),
                dom: row.get("dom"),
            })
            .collect())
    }

    /// Every grouping row naming `sub_or_role` as a member, across all
    /// domains -- used to answer "what knots/repos is this DID part of".
    pub async fn groupings_for_subject(&self, sub_or_role: &str) -> Result<Vec<GroupingRow>> {
        let rows = sqlx::query(
            "SELECT sub_or_role, parent_role, dom FROM rbac_groupings WHERE sub_or_role = ?",
        )
        .bind(sub_or_role)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| GroupingRow {
                sub_or_role: row.get("sub_or_role"),
                parent_role: row.get("parent_role"),
                dom: row.get("dom"),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(sub: &str, dom: &str, obj: &str, act: &str) -> PolicyRow {
        PolicyRow {
            sub: sub.into(),
            dom: dom.into(),
            obj: obj.into(),
            act: act.into(),
        }
    }

    fn grouping(sub_or_role: &str, parent_role: &str, dom: &str) -> GroupingRow {
        GroupingRow {
            sub_or_role: sub_or_role.into(),
            parent_role: parent_role.into(),
            dom: dom.into(),
        }
    }

    #[tokio::test]
    async fn add_and_remove_policy_is_idempotent_and_reversible() {
        let store = Store::open_in_memory().await.unwrap();
        let p = policy("did:plc:a", "thisknot", "repo", "push");

        store.add_policy(&p).await.unwrap();
        store.add_policy(&p).await.unwrap();
        assert_eq!(store.policies_in_domain("thisknot").await.unwrap().len(), 1);

        store.remove_policy(&p).await.unwrap();
        assert!(store.policies_in_domain("thisknot").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn policies_are_scoped_by_domain() {
        let store = Store::open_in_memory().await.unwrap();
        store
            .add_policy(&policy("did:plc:a", "knot-one", "repo", "push"))
            .await
            .unwrap();
        store
            .add_policy(&policy("did:plc:a", "knot-two", "repo", "push"))
            .await
            .unwrap();

        assert_eq!(store.policies_in_domain("knot-one").await.unwrap().len(), 1);
        assert_eq!(store.policies_in_domain("knot-two").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn groupings_round_trip_by_domain_and_subject() {
        let store = Store::open_in_memory().await.unwrap();
        let g = grouping("did:plc:a", "member", "thisknot");

        store.add_grouping(&g).await.unwrap();
        store.add_grouping(&g).await.unwrap();
        assert_eq!(store.groupings_in_domain("thisknot").await.unwrap().len(), 1);
        assert_eq!(store.groupings_for_subject("did:plc:a").await.unwrap().len(), 1);

        store.remove_grouping(&g).await.unwrap();
        assert!(store.groupings_in_domain("thisknot").await.unwrap().is_empty());
    }
}
