//! SQLite schema and connection management for the session store.

use crate::store::{Result, StoreError};
use rusqlite::Connection;
use std::path::Path;

/// Current schema version. Incremented when the schema changes.
pub const CURRENT_SCHEMA_VERSION: i32 = 1;

/// Database connection and schema manager.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open a database at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path).map_err(StoreError::Sqlite)?;
        conn.execute("PRAGMA foreign_keys = ON", [])
            .map_err(StoreError::Sqlite)?;
        let db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    /// Create a new in-memory database for testing.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Sqlite)?;
        conn.execute("PRAGMA foreign_keys = ON", [])
            .map_err(StoreError::Sqlite)?;
        let db = Self { conn };
        db.initialize_schema()?;
        Ok(db)
    }

    fn initialize_schema(&self) -> Result<()> {
        self.create_metadata_table()?;
        self.create_profiles_table()?;
        self.create_sync_state_table()?;
        self.create_indexes()?;
        Ok(())
    }

    fn create_metadata_table(&self) -> Result<()> {
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS db_metadata (
                    id INTEGER PRIMARY KEY CHECK (id = 1),
                    version INTEGER NOT NULL
                );
                INSERT OR IGNORE INTO db_metadata (id, version) VALUES (1, {});",
                CURRENT_SCHEMA_VERSION
            ))
            .map_err(StoreError::Sqlite)?;
        Ok(())
    }

    fn create_profiles_table(&self) -> Result<()> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS profiles (
                id TEXT PRIMARY KEY,
                owner TEXT NOT NULL,
                name TEXT NOT NULL,
                host TEXT NOT NULL,
                port INTEGER NOT NULL,
                username TEXT NOT NULL,
                group_name TEXT,
                terminal_type TEXT,
                term_columns INTEGER,
                term_rows INTEGER,
                cred_ciphertext BLOB NOT NULL,
                cred_nonce BLOB NOT NULL,
                cred_key_salt BLOB,
                server_version INTEGER,
                client_version INTEGER NOT NULL,
                base_server_version INTEGER,
                base_client_version INTEGER NOT NULL DEFAULT 0,
                last_synced_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                deleted_at INTEGER
            )",
                [],
            )
            .map_err(StoreError::Sqlite)?;
        Ok(())
    }

    fn create_sync_state_table(&self) -> Result<()> {
        self.conn
            .execute(
                "CREATE TABLE IF NOT EXISTS sync_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                owner TEXT,
                device_id TEXT,
                device_name TEXT,
                relay_url TEXT,
                device_signing_key BLOB,
                last_sync_at INTEGER,
                last_conflicts INTEGER NOT NULL DEFAULT 0,
                last_failed INTEGER NOT NULL DEFAULT 0
            )",
                [],
            )
            .map_err(StoreError::Sqlite)?;
        Ok(())
    }

    fn create_indexes(&self) -> Result<()> {
        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_profiles_owner ON profiles(owner)",
            "CREATE INDEX IF NOT EXISTS idx_profiles_order ON profiles(created_at, id)",
            "CREATE INDEX IF NOT EXISTS idx_profiles_deleted ON profiles(deleted_at)",
        ];
        for sql in &indexes {
            self.conn.execute(sql, []).map_err(StoreError::Sqlite)?;
        }
        Ok(())
    }

    /// Validate the stored schema version against this build.
    pub fn validate_schema_version(&self) -> Result<()> {
        let version: i32 = self
            .conn
            .query_row("SELECT version FROM db_metadata WHERE id = 1", [], |row| {
                row.get(0)
            })
            .map_err(StoreError::Sqlite)?;

        if version != CURRENT_SCHEMA_VERSION {
            return Err(StoreError::SchemaMismatch {
                expected: CURRENT_SCHEMA_VERSION,
                found: version,
            });
        }
        Ok(())
    }

    /// Get a reference to the underlying connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_database_has_expected_tables() {
        let db = Database::in_memory().unwrap();

        let table_names: Vec<String> = db
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(table_names.contains(&"db_metadata".to_string()));
        assert!(table_names.contains(&"profiles".to_string()));
        assert!(table_names.contains(&"sync_state".to_string()));

        let index_names: Vec<String> = db
            .conn
            .prepare("SELECT name FROM sqlite_master WHERE type='index' AND name LIKE 'idx_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        assert!(index_names.contains(&"idx_profiles_order".to_string()));
    }

    #[test]
    fn schema_version_validates() {
        let db = Database::in_memory().unwrap();
        assert!(db.validate_schema_version().is_ok());
    }
}
