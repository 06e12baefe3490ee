//! The change oplog: every mutation the knot makes to shared state is
//! appended here, keyed by `(rkey, nsid)`, so subscribers can backfill and
//! tail it in a single consistent order.

use serde::{Deserialize, Serialize};
use sqlx::Row;

use knot_core::Tid;

use crate::error::Result;
use crate::pool::Store;

/// A single oplog row, already deserialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Time-ordered record key, also the event's sort key.
    pub rkey: String,
    /// The record's collection, e.g. `sh.tangled.knot.member`.
    pub nsid: String,
    /// The record body, as committed.
    pub payload: serde_json::Value,
    /// Insertion timestamp, microseconds since epoch.
    pub created_us: i64,
}

impl Store {
    /// Appends a new event, minting a fresh [`Tid`] for its `rkey`. Returns
    /// the minted event so the caller can notify subscribers without a
    /// second round-trip.
    pub async fn append_event(&self, nsid: &str, payload: &serde_json::Value) -> Result<Event> {
        let tid = Tid::now();
        let created_us = tid.as_micros() as i64;
        let event = Event {
            rkey: tid.to_string(),
            nsid: nsid.to_string(),
            payload: payload.clone(),
            created_us,
        };
        let body = serde_json::to_string(&event.payload)?;

        sqlx::query(
            "INSERT INTO events (rkey, nsid, event_json, created_us) VALUES (?, ?, ?, ?)",
        )
        .bind(&event.rkey)
        .bind(&event.nsid)
        .bind(body)
        .bind(event.created_us)
        .execute(&self.pool)
        .await?;

        Ok(event)
    }

    /// Returns every event with `created_us > after_us`, ordered oldest
    /// first -- the backfill-then-tail contract the realtime hub relies on.
    pub async fn events_after(&self, after_us: i64, limit: i64) -> Result<Vec<Event>> {
        let rows = sqlx::query(
            "SELECT rkey, nsid, event_json, created_us FROM events
             WHERE created_us > ? ORDER BY created_us ASC LIMIT ?",
        )
        .bind(after_us)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let event_json: String = row.get("event_json");
                Ok(Event {
                    rkey: row.get("rkey"),
                    nsid: row.get("nsid"),
                    payload: serde_json::from_str(&event_json)?,
                    created_us: row.get("created_us"),
                })
            })
            .collect()
    }

    /// Returns the most recent event, if any -- used to seed a fresh
    /// subscriber's cursor at "now" instead of replaying the whole log.
    pub async fn latest_event(&self) -> Result<Option<Event>> {
        let row = sqlx::query(
            "SELECT rkey, nsid, event_json, created_us FROM events
             ORDER BY created_us DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| {
            let event_json: String = row.get("event_json");
            Ok(Event {
                rkey: row.get("rkey"),
                nsid: row.get("nsid"),
                payload: serde_json::from_str(&event_json)?,
                created_us: row.get("created_us"),
            })
        })
        .transpose()
    }
}
