//! Session profile entity and tagged version counters.

use crate::crypto::CredentialEnvelope;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Version counter assigned by the remote authority on every accepted
/// write. Tagged so it cannot be compared against a [`ClientVersion`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ServerVersion(u64);

impl ServerVersion {
    pub fn new(v: u64) -> Self {
        Self(v)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Version counter assigned locally on every local mutation. Independent
/// of [`ServerVersion`]; the type tag keeps the two from being
/// cross-compared by accident.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct ClientVersion(u64);

impl ClientVersion {
    /// Version of a record that has never been locally edited (e.g. one
    /// adopted verbatim from the remote side).
    pub const UNEDITED: Self = Self(0);

    /// Version assigned on first local save.
    pub const INITIAL: Self = Self(1);

    pub fn new(v: u64) -> Self {
        Self(v)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// The next version after a local mutation.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl std::fmt::Display for ClientVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "c{}", self.0)
    }
}

/// The version pair recorded at the last successful reconciliation.
///
/// `local changed since sync` ⇔ `client_version > baseline.client`;
/// `remote changed since sync` ⇔ `remote server_version > baseline.server`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct VersionBaseline {
    pub server: Option<ServerVersion>,
    pub client: ClientVersion,
}

/// A saved SSH connection configuration plus its sealed credential.
///
/// The canonical entity of the catalog. `credential` is opaque to
/// everything except the codec; the store persists it sealed and the
/// gateway transports it sealed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionProfile {
    /// Opaque unique identifier, assigned at creation, immutable.
    pub id: Uuid,

    /// Owning user, immutable after creation.
    pub owner: Uuid,

    pub name: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub group_name: Option<String>,
    pub terminal_type: Option<String>,
    pub columns: Option<u16>,
    pub rows: Option<u16>,

    /// The sealed authentication payload.
    pub credential: CredentialEnvelope,

    /// Remote-authority version; `None` for a record never yet synced.
    pub server_version: Option<ServerVersion>,

    /// Local mutation counter.
    pub client_version: ClientVersion,

    /// Versions recorded at the last successful reconciliation. Local
    /// bookkeeping, never sent over the wire.
    #[serde(skip, default)]
    pub baseline: VersionBaseline,

    /// Timestamp of the last successful reconciliation involving this
    /// record; `None` if never synced.
    pub last_synced_at: Option<i64>,

    pub created_at: i64,
    pub updated_at: i64,

    /// Presence marks the record a tombstone.
    pub deleted_at: Option<i64>,
}

impl SessionProfile {
    /// Whether this record is a soft-deleted tombstone.
    pub fn is_tombstone(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Whether this record has local edits not yet acknowledged by the
    /// remote authority.
    pub fn has_local_changes(&self) -> bool {
        self.client_version > self.baseline.client
    }

    /// Whether `remote_version` is ahead of what this record last synced
    /// against.
    pub fn remote_advanced(&self, remote_version: Option<ServerVersion>) -> bool {
        match (remote_version, self.baseline.server) {
            (Some(remote), Some(base)) => remote > base,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

/// One page of profiles plus the total record count.
#[derive(Debug, Clone)]
pub struct Page {
    pub profiles: Vec<SessionProfile>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::envelope::CredentialEnvelope;

    fn envelope_fixture() -> CredentialEnvelope {
        CredentialEnvelope {
            ciphertext: vec![0xAA; 24],
            nonce: [7u8; 12],
            key_salt: None,
        }
    }

    fn profile_fixture() -> SessionProfile {
        SessionProfile {
            id: Uuid::new_v4(),
            owner: Uuid::new_v4(),
            name: "build box".to_string(),
            host: "build.internal".to_string(),
            port: 22,
            username: "deploy".to_string(),
            group_name: None,
            terminal_type: Some("xterm-256color".to_string()),
            columns: Some(120),
            rows: Some(40),
            credential: envelope_fixture(),
            server_version: None,
            client_version: ClientVersion::INITIAL,
            baseline: VersionBaseline::default(),
            last_synced_at: None,
            created_at: 1_700_000_000,
            updated_at: 1_700_000_000,
            deleted_at: None,
        }
    }

    #[test]
    fn client_version_progression() {
        assert_eq!(ClientVersion::UNEDITED.next(), ClientVersion::INITIAL);
        assert_eq!(ClientVersion::new(3).next(), ClientVersion::new(4));
    }

    #[test]
    fn unsynced_profile_has_local_changes() {
        let profile = profile_fixture();
        assert!(profile.has_local_changes());
        assert!(!profile.is_tombstone());
    }

    #[test]
    fn baseline_detects_remote_advance() {
        let mut profile = profile_fixture();
        profile.baseline.server = Some(ServerVersion::new(3));

        assert!(!profile.remote_advanced(Some(ServerVersion::new(3))));
        assert!(profile.remote_advanced(Some(ServerVersion::new(4))));
        assert!(!profile.remote_advanced(None));
    }

    #[test]
    fn never_synced_baseline_treats_any_remote_version_as_advance() {
        let profile = profile_fixture();
        assert!(profile.remote_advanced(Some(ServerVersion::new(1))));
    }

    #[test]
    fn baseline_is_not_serialized() {
        let mut profile = profile_fixture();
        profile.baseline = VersionBaseline {
            server: Some(ServerVersion::new(9)),
            client: ClientVersion::new(9),
        };

        let json = serde_json::to_string(&profile).unwrap();
        let back: SessionProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back.baseline, VersionBaseline::default());
    }
}
