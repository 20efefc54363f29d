//! Profile catalog - coordinates the codec and the session store.
//!
//! The store only ever holds sealed envelopes and the codec never touches
//! persistence; this facade is the seam where user edits meet both.
//! Decrypted secrets exist only inside a call, wrapped in
//! [`PlaintextSecret`].

use crate::crypto::{seal, unseal, KdfParams, PlaintextSecret};
use crate::store::{ClientVersion, Page, SessionProfile, SessionStore, StoreError, VersionBaseline};
use crate::Result;
use uuid::Uuid;

/// Fields for a profile being created.
#[derive(Debug, Clone)]
pub struct NewProfile {
    pub owner: Uuid,
    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub group_name: Option<String>,
    pub terminal_type: Option<String>,
    pub columns: Option<u16>,
    pub rows: Option<u16>,
}

/// Metadata changes for an existing profile. `None` leaves a field as-is.
#[derive(Debug, Clone, Default)]
pub struct ProfileEdit {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub group_name: Option<String>,
    pub terminal_type: Option<String>,
    pub columns: Option<u16>,
    pub rows: Option<u16>,
}

/// User-facing operations over the profile catalog.
pub struct ProfileCatalog {
    store: SessionStore,
    kdf: KdfParams,
}

impl ProfileCatalog {
    pub fn new(store: SessionStore) -> Self {
        Self {
            store,
            kdf: KdfParams::default(),
        }
    }

    pub fn with_kdf_params(store: SessionStore, kdf: KdfParams) -> Self {
        Self { store, kdf }
    }

    /// Create a profile: seal the secret, assign an id, persist with the
    /// initial client version.
    pub fn create_profile(
        &self,
        new: NewProfile,
        secret: &[u8],
        passphrase: &[u8],
    ) -> Result<SessionProfile> {
        let credential = seal(secret, passphrase, None, &self.kdf)?;
        let now = chrono::Utc::now().timestamp();

        let profile = SessionProfile {
            id: Uuid::new_v4(),
            owner: new.owner,
            name: new.name,
            host: new.host,
            port: new.port,
            username: new.username,
            group_name: new.group_name,
            terminal_type: new.terminal_type,
            columns: new.columns,
            rows: new.rows,
            credential,
            server_version: None,
            client_version: ClientVersion::INITIAL,
            baseline: VersionBaseline::default(),
            last_synced_at: None,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };

        self.store.put(&profile)?;
        Ok(profile)
    }

    /// Apply metadata changes, bumping the client version.
    pub fn update_profile(&self, id: Uuid, edit: ProfileEdit) -> Result<SessionProfile> {
        let mut profile = self.require(id)?;

        if let Some(name) = edit.name {
            profile.name = name;
        }
        if let Some(host) = edit.host {
            profile.host = host;
        }
        if let Some(port) = edit.port {
            profile.port = port;
        }
        if let Some(username) = edit.username {
            profile.username = username;
        }
        if let Some(group_name) = edit.group_name {
            profile.group_name = Some(group_name);
        }
        if let Some(terminal_type) = edit.terminal_type {
            profile.terminal_type = Some(terminal_type);
        }
        if let Some(columns) = edit.columns {
            profile.columns = Some(columns);
        }
        if let Some(rows) = edit.rows {
            profile.rows = Some(rows);
        }

        profile.client_version = profile.client_version.next();
        profile.updated_at = chrono::Utc::now().timestamp();
        self.store.put(&profile)?;
        Ok(profile)
    }

    /// Replace the sealed secret, reusing the profile's durable salt so
    /// the derived key stays stable.
    pub fn change_secret(
        &self,
        id: Uuid,
        secret: &[u8],
        passphrase: &[u8],
    ) -> Result<SessionProfile> {
        let mut profile = self.require(id)?;

        profile.credential = seal(secret, passphrase, profile.credential.key_salt, &self.kdf)?;
        profile.client_version = profile.client_version.next();
        profile.updated_at = chrono::Utc::now().timestamp();
        self.store.put(&profile)?;
        Ok(profile)
    }

    /// Decrypt a profile's secret. Authentication failures surface as-is;
    /// there is no fallback to an empty credential.
    pub fn reveal_secret(&self, id: Uuid, passphrase: &[u8]) -> Result<PlaintextSecret> {
        let profile = self.require(id)?;
        Ok(unseal(&profile.credential, passphrase, &self.kdf)?)
    }

    /// Soft-delete a profile.
    pub fn delete_profile(&self, id: Uuid) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        self.store.mark_deleted(id, now)?;
        Ok(())
    }

    pub fn get(&self, id: Uuid) -> Result<Option<SessionProfile>> {
        Ok(self.store.get(id)?)
    }

    pub fn list_page(&self, page: u32, page_size: u32) -> Result<Page> {
        Ok(self.store.list_page(page, page_size)?)
    }

    fn require(&self, id: Uuid) -> Result<SessionProfile> {
        let profile = self
            .store
            .get(id)?
            .ok_or(StoreError::NotFound(id))?;
        if profile.is_tombstone() {
            return Err(StoreError::Tombstoned(id).into());
        }
        Ok(profile)
    }
}
