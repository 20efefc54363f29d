//! Local session store: durable client-side cache of session profiles.
//!
//! Records are keyed by id and carry the local/server version pair. The
//! store only ever sees sealed credentials; sealing and unsealing happen
//! in the caller layer (see `catalog`).
//!
//! Writes to the same record are serialized through the database mutex,
//! which is what preserves strict `client_version` monotonicity under
//! concurrent callers.

pub mod models;
pub mod schema;

pub use models::{ClientVersion, Page, ServerVersion, SessionProfile, VersionBaseline};
pub use schema::Database;

use crate::crypto::envelope::{CredentialEnvelope, NONCE_LEN};
use crate::crypto::kdf::KeySalt;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in session store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("stale write for {id}: incoming {incoming} is not newer than stored {stored}")]
    StaleWrite {
        id: Uuid,
        stored: ClientVersion,
        incoming: ClientVersion,
    },

    #[error("profile not found: {0}")]
    NotFound(Uuid),

    #[error("profile {0} is not a tombstone")]
    NotTombstoned(Uuid),

    #[error("profile {0} is a tombstone and cannot be mutated")]
    Tombstoned(Uuid),

    #[error("invalid page request: page {page}, size {page_size} (max {max})")]
    InvalidPage { page: u32, page_size: u32, max: u32 },

    #[error("schema version mismatch: expected {expected}, found {found}")]
    SchemaMismatch { expected: i32, found: i32 },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("corrupt record: {0}")]
    Corrupt(String),

    #[error("store lock poisoned")]
    LockPoisoned,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Default upper bound for `list_page` sizes.
pub const DEFAULT_MAX_PAGE_SIZE: u32 = 100;

/// Durable, id-keyed cache of session profiles.
#[derive(Clone)]
pub struct SessionStore {
    db: Arc<Mutex<Database>>,
    max_page_size: u32,
}

impl SessionStore {
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self {
            db,
            max_page_size: DEFAULT_MAX_PAGE_SIZE,
        }
    }

    pub fn with_max_page_size(db: Arc<Mutex<Database>>, max_page_size: u32) -> Self {
        Self { db, max_page_size }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| StoreError::LockPoisoned)
    }

    /// Upsert a profile by id.
    ///
    /// Rejects with [`StoreError::StaleWrite`] unless the incoming
    /// `client_version` strictly exceeds the stored one, so duplicate or
    /// out-of-order local writes (e.g. retried requests) can never clobber
    /// newer state. Tombstones cannot be overwritten.
    pub fn put(&self, profile: &SessionProfile) -> Result<()> {
        let db = self.lock()?;
        let conn = db.conn();

        let existing: Option<(i64, Option<i64>)> = conn
            .query_row(
                "SELECT client_version, deleted_at FROM profiles WHERE id = ?1",
                [profile.id.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        if let Some((stored_version, deleted_at)) = existing {
            if deleted_at.is_some() {
                return Err(StoreError::Tombstoned(profile.id));
            }
            let stored = ClientVersion::new(stored_version as u64);
            if profile.client_version <= stored {
                return Err(StoreError::StaleWrite {
                    id: profile.id,
                    stored,
                    incoming: profile.client_version,
                });
            }
        }

        upsert_profile(conn, profile)
    }

    pub fn get(&self, id: Uuid) -> Result<Option<SessionProfile>> {
        let db = self.lock()?;
        get_profile(db.conn(), id)
    }

    /// List live profiles, 1-based pagination, stable `(created_at, id)`
    /// ordering. Tombstones are excluded; they are internal bookkeeping
    /// until purged, not user-visible records.
    pub fn list_page(&self, page: u32, page_size: u32) -> Result<Page> {
        if page == 0 || page_size == 0 || page_size > self.max_page_size {
            return Err(StoreError::InvalidPage {
                page,
                page_size,
                max: self.max_page_size,
            });
        }

        let db = self.lock()?;
        let conn = db.conn();

        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM profiles WHERE deleted_at IS NULL",
            [],
            |row| row.get(0),
        )?;

        let offset = (page as i64 - 1) * page_size as i64;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM profiles WHERE deleted_at IS NULL
             ORDER BY created_at, id LIMIT ?1 OFFSET ?2",
            PROFILE_COLUMNS
        ))?;
        let profiles = stmt
            .query_map(params![page_size as i64, offset], row_to_profile)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Page {
            profiles,
            total: total as u64,
        })
    }

    /// Soft-delete a profile: set `deleted_at` and bump `client_version`.
    pub fn mark_deleted(&self, id: Uuid, at: i64) -> Result<()> {
        let db = self.lock()?;
        let conn = db.conn();

        let existing: Option<Option<i64>> = conn
            .query_row(
                "SELECT deleted_at FROM profiles WHERE id = ?1",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            None => Err(StoreError::NotFound(id)),
            Some(Some(_)) => Err(StoreError::Tombstoned(id)),
            Some(None) => {
                conn.execute(
                    "UPDATE profiles SET deleted_at = ?1, updated_at = ?1,
                     client_version = client_version + 1 WHERE id = ?2",
                    params![at, id.to_string()],
                )?;
                Ok(())
            }
        }
    }

    /// Permanently remove a tombstoned record.
    pub fn purge(&self, id: Uuid) -> Result<()> {
        let db = self.lock()?;
        let conn = db.conn();

        let existing: Option<Option<i64>> = conn
            .query_row(
                "SELECT deleted_at FROM profiles WHERE id = ?1",
                [id.to_string()],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            None => Err(StoreError::NotFound(id)),
            Some(None) => Err(StoreError::NotTombstoned(id)),
            Some(Some(_)) => {
                conn.execute("DELETE FROM profiles WHERE id = ?1", [id.to_string()])?;
                Ok(())
            }
        }
    }

    // --- Reconciler-side operations ---

    /// Every record for the owner, tombstones included. The reconciler's
    /// view of local state.
    pub fn all_profiles(&self, owner: Uuid) -> Result<Vec<SessionProfile>> {
        let db = self.lock()?;
        let conn = db.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM profiles WHERE owner = ?1 ORDER BY created_at, id",
            PROFILE_COLUMNS
        ))?;
        let profiles = stmt
            .query_map([owner.to_string()], row_to_profile)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(profiles)
    }

    /// Adopt a remote record verbatim, resetting the baseline to the
    /// adopted versions. Bypasses the `StaleWrite` check: adoption is the
    /// reconciler overwriting local state with a resolved winner, not a
    /// local mutation.
    pub fn adopt_remote(&self, remote: &SessionProfile, synced_at: i64) -> Result<()> {
        let db = self.lock()?;
        let conn = db.conn();

        let existing = get_profile(conn, remote.id)?;
        let (client_version, created_at) = match &existing {
            // Keep the local counter so later local edits stay monotonic.
            Some(local) => (local.client_version, local.created_at),
            None => (ClientVersion::UNEDITED, remote.created_at),
        };

        let adopted = SessionProfile {
            client_version,
            baseline: VersionBaseline {
                server: remote.server_version,
                client: client_version,
            },
            last_synced_at: Some(synced_at),
            created_at,
            ..remote.clone()
        };

        upsert_profile(conn, &adopted)
    }

    /// Record a push acknowledgement: the remote authority accepted the
    /// state that had local version `synced_client`.
    pub fn confirm_synced(
        &self,
        id: Uuid,
        server_version: ServerVersion,
        synced_client: ClientVersion,
        synced_at: i64,
    ) -> Result<()> {
        let db = self.lock()?;
        let changed = db.conn().execute(
            "UPDATE profiles SET server_version = ?1, base_server_version = ?1,
             base_client_version = ?2, last_synced_at = ?3 WHERE id = ?4",
            params![
                server_version.get() as i64,
                synced_client.get() as i64,
                synced_at,
                id.to_string()
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    /// Number of records with local changes not yet acknowledged remotely.
    pub fn count_pending(&self, owner: Uuid) -> Result<u64> {
        let db = self.lock()?;
        let count: i64 = db.conn().query_row(
            "SELECT COUNT(*) FROM profiles
             WHERE owner = ?1 AND client_version > base_client_version",
            [owner.to_string()],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Run a closure with the raw connection, serialized with all other
    /// store access. Used for the sync settings row.
    pub fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let db = self.lock()?;
        f(db.conn())
    }
}

const PROFILE_COLUMNS: &str = "id, owner, name, host, port, username, group_name, terminal_type,
     term_columns, term_rows, cred_ciphertext, cred_nonce, cred_key_salt,
     server_version, client_version, base_server_version, base_client_version,
     last_synced_at, created_at, updated_at, deleted_at";

fn get_profile(conn: &Connection, id: Uuid) -> Result<Option<SessionProfile>> {
    conn.query_row(
        &format!("SELECT {} FROM profiles WHERE id = ?1", PROFILE_COLUMNS),
        [id.to_string()],
        row_to_profile,
    )
    .optional()
    .map_err(StoreError::Sqlite)
}

fn upsert_profile(conn: &Connection, p: &SessionProfile) -> Result<()> {
    conn.execute(
        "INSERT INTO profiles (
            id, owner, name, host, port, username, group_name, terminal_type,
            term_columns, term_rows, cred_ciphertext, cred_nonce, cred_key_salt,
            server_version, client_version, base_server_version, base_client_version,
            last_synced_at, created_at, updated_at, deleted_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                  ?15, ?16, ?17, ?18, ?19, ?20, ?21)
        ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            host = excluded.host,
            port = excluded.port,
            username = excluded.username,
            group_name = excluded.group_name,
            terminal_type = excluded.terminal_type,
            term_columns = excluded.term_columns,
            term_rows = excluded.term_rows,
            cred_ciphertext = excluded.cred_ciphertext,
            cred_nonce = excluded.cred_nonce,
            cred_key_salt = excluded.cred_key_salt,
            server_version = excluded.server_version,
            client_version = excluded.client_version,
            base_server_version = excluded.base_server_version,
            base_client_version = excluded.base_client_version,
            last_synced_at = excluded.last_synced_at,
            updated_at = excluded.updated_at,
            deleted_at = excluded.deleted_at",
        params![
            p.id.to_string(),
            p.owner.to_string(),
            p.name,
            p.host,
            p.port as i64,
            p.username,
            p.group_name,
            p.terminal_type,
            p.columns.map(|c| c as i64),
            p.rows.map(|r| r as i64),
            p.credential.ciphertext,
            p.credential.nonce.to_vec(),
            p.credential.key_salt.map(|s| s.as_bytes().to_vec()),
            p.server_version.map(|v| v.get() as i64),
            p.client_version.get() as i64,
            p.baseline.server.map(|v| v.get() as i64),
            p.baseline.client.get() as i64,
            p.last_synced_at,
            p.created_at,
            p.updated_at,
            p.deleted_at,
        ],
    )?;
    Ok(())
}

fn row_to_profile(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionProfile> {
    let parse_uuid = |idx: usize, s: String| {
        Uuid::parse_str(&s).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                idx,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
    };

    let id: String = row.get(0)?;
    let owner: String = row.get(1)?;
    let nonce: Vec<u8> = row.get(11)?;
    let nonce: [u8; NONCE_LEN] = nonce.try_into().map_err(|_| {
        rusqlite::Error::FromSqlConversionFailure(
            11,
            rusqlite::types::Type::Blob,
            "bad nonce length".into(),
        )
    })?;
    let key_salt: Option<Vec<u8>> = row.get(12)?;
    let key_salt = key_salt
        .map(|bytes| {
            KeySalt::from_slice(&bytes).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    12,
                    rusqlite::types::Type::Blob,
                    Box::new(e),
                )
            })
        })
        .transpose()?;

    Ok(SessionProfile {
        id: parse_uuid(0, id)?,
        owner: parse_uuid(1, owner)?,
        name: row.get(2)?,
        host: row.get(3)?,
        port: row.get::<_, i64>(4)? as u16,
        username: row.get(5)?,
        group_name: row.get(6)?,
        terminal_type: row.get(7)?,
        columns: row.get::<_, Option<i64>>(8)?.map(|c| c as u16),
        rows: row.get::<_, Option<i64>>(9)?.map(|r| r as u16),
        credential: CredentialEnvelope {
            ciphertext: row.get(10)?,
            nonce,
            key_salt,
        },
        server_version: row
            .get::<_, Option<i64>>(13)?
            .map(|v| ServerVersion::new(v as u64)),
        client_version: ClientVersion::new(row.get::<_, i64>(14)? as u64),
        baseline: VersionBaseline {
            server: row
                .get::<_, Option<i64>>(15)?
                .map(|v| ServerVersion::new(v as u64)),
            client: ClientVersion::new(row.get::<_, i64>(16)? as u64),
        },
        last_synced_at: row.get(17)?,
        created_at: row.get(18)?,
        updated_at: row.get(19)?,
        deleted_at: row.get(20)?,
    })
}
