//! SSH public keys associated with known DIDs.

use serde::{Deserialize, Serialize};
use sqlx::Row;

use knot_core::Did;

use crate::error::Result;
use crate::pool::Store;

/// A single OpenSSH-authorized-key line belonging to a DID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey {
    /// Owning DID.
    pub did: String,
    /// The full `authorized_keys`-style line (`ssh-ed25519 AAAA... comment`).
    pub key_text: String,
    /// Insertion timestamp, microseconds since epoch.
    pub created_at: i64,
}

impl Store {
    /// Inserts a public key for `did`, idempotent on `(did, key_text)`.
    pub async fn insert_public_key(&self, did: &Did, key_text: &str, created_at_us: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO public_keys (did, key_text, created_at) VALUES (?, ?, ?)
             ON CONFLICT(did, key_text) DO NOTHING",
        )
        .bind(did.as_str())
        .bind(key_text)
        .bind(created_at_us)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Returns every key belonging to `did`.
    pub async fn public_keys_for(&self, did: &Did) -> Result<Vec<PublicKey>> {
        let rows = sqlx::query(
            "SELECT did, key_text, created_at FROM public_keys WHERE did = ? ORDER BY created_at",
        )
        .bind(did.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| PublicKey {
                did: row.get("did"),
                key_text: row.get("key_text"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    /// Returns every known public key, for `authorized_keys` generation.
    pub async fn all_public_keys(&self) -> Result<Vec<PublicKey>> {
        let rows = sqlx::query("SELECT did, key_text, created_at FROM public_keys ORDER BY did")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| PublicKey {
                did: row.get("did"),
                key_text: row.get("key_text"),
                created_at: row.get("created_at"),
            })
            .collect())
    }

    /// Deletes every key belonging to `did` (cascade on DID removal).
    pub async fn delete_public_keys_for(&self, did: &Did) -> Result<()> {
        sqlx::query("DELETE FROM public_keys WHERE did = ?")
            .bind(did.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
