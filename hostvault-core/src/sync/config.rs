//! Sync settings persisted in the local database.

use crate::store::{Result, StoreError};
use rusqlite::OptionalExtension;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Per-device sync settings: identity, relay endpoint, and the summary of
/// the last completed cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncSettings {
    pub owner: Option<Uuid>,
    pub device_id: Option<Uuid>,
    pub device_name: Option<String>,
    pub relay_url: Option<String>,
    /// Ed25519 signing key seed for request auth (32 bytes).
    #[serde(skip_serializing, default)]
    pub device_signing_key: Option<Vec<u8>>,
    pub last_sync_at: Option<i64>,
    pub last_conflicts: u64,
    pub last_failed: u64,
}

impl SyncSettings {
    /// Load settings from the database. Returns defaults if no row exists.
    pub fn load(conn: &rusqlite::Connection) -> Result<Self> {
        let result = conn
            .query_row(
                "SELECT owner, device_id, device_name, relay_url, device_signing_key,
                        last_sync_at, last_conflicts, last_failed
                 FROM sync_state WHERE id = 1",
                [],
                |row| {
                    let owner: Option<String> = row.get(0)?;
                    let device_id: Option<String> = row.get(1)?;
                    Ok(SyncSettings {
                        owner: owner.and_then(|s| Uuid::parse_str(&s).ok()),
                        device_id: device_id.and_then(|s| Uuid::parse_str(&s).ok()),
                        device_name: row.get(2)?,
                        relay_url: row.get(3)?,
                        device_signing_key: row.get(4)?,
                        last_sync_at: row.get(5)?,
                        last_conflicts: row.get::<_, i64>(6)? as u64,
                        last_failed: row.get::<_, i64>(7)? as u64,
                    })
                },
            )
            .optional()
            .map_err(StoreError::Sqlite)?;

        Ok(result.unwrap_or_default())
    }

    /// Save settings to the database (upsert).
    pub fn save(&self, conn: &rusqlite::Connection) -> Result<()> {
        conn.execute(
            "INSERT INTO sync_state (id, owner, device_id, device_name, relay_url,
                                     device_signing_key, last_sync_at, last_conflicts, last_failed)
             VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                owner = excluded.owner,
                device_id = excluded.device_id,
                device_name = excluded.device_name,
                relay_url = excluded.relay_url,
                device_signing_key = excluded.device_signing_key,
                last_sync_at = excluded.last_sync_at,
                last_conflicts = excluded.last_conflicts,
                last_failed = excluded.last_failed",
            rusqlite::params![
                self.owner.map(|u| u.to_string()),
                self.device_id.map(|u| u.to_string()),
                self.device_name,
                self.relay_url,
                self.device_signing_key,
                self.last_sync_at,
                self.last_conflicts as i64,
                self.last_failed as i64,
            ],
        )
        .map_err(StoreError::Sqlite)?;

        Ok(())
    }
}
