//! The firehose cursor: a single row storing the last-processed timestamp.

use sqlx::Row;

use crate::error::Result;
use crate::pool::Store;

/// A stored cursor value is discarded and replaced with "now" if it is
/// older than this.
pub const STALE_AFTER_US: i64 = 48 * 60 * 60 * 1_000_000;

impl Store {
    /// Reads the stored cursor. If no row exists, or the stored value is
    /// older than [`STALE_AFTER_US`] relative to `now_us`, returns `now_us`
    /// instead (and does not itself persist that replacement -- the caller
    /// saves the value it actually used once it starts consuming events).
    pub async fn read_cursor(&self, now_us: i64) -> Result<i64> {
        let row = sqlx::query("SELECT value_us FROM cursor WHERE id = 0")
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(now_us);
        };
        let stored: i64 = row.get("value_us");
        if now_us.saturating_sub(stored) > STALE_AFTER_US {
            Ok(now_us)
        } else {
            Ok(stored)
        }
    }

    /// Persists `value_us` as the new cursor, provided it does not move the
    /// cursor backwards.
    pub async fn save_cursor(&self, value_us: i64) -> Result<()> {
        sqlx::query(
            "INSERT INTO cursor (id, value_us) VALUES (0, ?)
             ON CONFLICT(id) DO UPDATE SET value_us = MAX(value_us, excluded.value_us)",
        )
        .bind(value_us)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_cursor_reads_as_now() {
        let store = Store::open_in_memory().await.unwrap();
        assert_eq!(store.read_cursor(1_000).await.unwrap(), 1_000);
    }

    #[tokio::test]
    async fn fresh_cursor_is_returned_unchanged() {
        let store = Store::open_in_memory().await.unwrap();
        store.save_cursor(500).await.unwrap();
        assert_eq!(store.read_cursor(600).await.unwrap(), 500);
    }

    #[tokio::test]
    async fn stale_cursor_is_replaced_with_now() {
        let store = Store::open_in_memory().await.unwrap();
        store.save_cursor(0).await.unwrap();
        let now = STALE_AFTER_US + 1_000_000;
        assert_eq!(store.read_cursor(now).await.unwrap(), now);
    }

    #[tokio::test]
    async fn save_never_moves_cursor_backwards() {
        let store = Store::open_in_memory().await.unwrap();
        store.save_cursor(1_000).await.unwrap();
        store.save_cursor(500).await.unwrap();
        assert_eq!(store.read_cursor(1_000).await.unwrap(), 1_000);
    }

    #[tokio::test]
    async fn monotonicity_across_many_saves() {
        let store = Store::open_in_memory().await.unwrap();
        let mut last = 0i64;
        for v in [100, 50, 300, 200, 400] {
            store.save_cursor(v).await.unwrap();
            let read = store.read_cursor(400).await.unwrap();
            assert!(read >= last);
            last = read;
        }
        assert_eq!(last, 400);
    }
}
