//! Merge decisions for one record id across the local/remote pair.
//!
//! Pure decision logic, no IO: the engine feeds it the local record, the
//! remote record, and gets back what to do. Which side "changed" is
//! judged against the version baseline recorded at the last successful
//! reconciliation, not against raw counters — the two counters are
//! independent and never compared to each other.

use crate::store::SessionProfile;
use crate::sync::models::{ConflictReason, ConflictWinner};

/// What the engine should do for one record id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// Neither side changed since the baseline.
    Noop,
    /// Local-only record, never synced: create it remotely.
    PushCreate,
    /// Local advanced, remote did not: update remotely.
    PushUpdate,
    /// Local tombstone not yet acknowledged remotely.
    PushDelete,
    /// Remote advanced, local did not: overwrite the local copy.
    AdoptRemote,
    /// Remote tombstone for an id never seen locally: record it silently,
    /// without surfacing a user-visible deletion.
    AdoptRemoteTombstone,
    /// Both sides advanced since the baseline.
    Conflict {
        winner: ConflictWinner,
        reason: ConflictReason,
    },
}

/// Classify one record id given its local and remote state.
pub fn classify(
    local: Option<&SessionProfile>,
    remote: Option<&SessionProfile>,
) -> MergeDecision {
    match (local, remote) {
        (None, None) => MergeDecision::Noop,

        (None, Some(remote)) => {
            if remote.is_tombstone() {
                MergeDecision::AdoptRemoteTombstone
            } else {
                MergeDecision::AdoptRemote
            }
        }

        (Some(local), None) => {
            if local.is_tombstone() {
                // Nothing remote to delete; the purge pass collects it.
                MergeDecision::Noop
            } else {
                // Covers both the never-synced record and the rare case
                // of a synced record the remote side no longer lists
                // (remote purge completed); re-create from the live
                // local copy.
                MergeDecision::PushCreate
            }
        }

        (Some(local), Some(remote)) => {
            let local_changed = local.has_local_changes();
            let remote_changed = local.remote_advanced(remote.server_version);

            match (local_changed, remote_changed) {
                (false, false) => MergeDecision::Noop,
                (true, false) => {
                    if local.is_tombstone() {
                        MergeDecision::PushDelete
                    } else {
                        MergeDecision::PushUpdate
                    }
                }
                (false, true) => MergeDecision::AdoptRemote,
                (true, true) => {
                    let (winner, reason) = resolve(local, remote);
                    MergeDecision::Conflict { winner, reason }
                }
            }
        }
    }
}

/// Resolve a true conflict: both sides advanced since the baseline.
///
/// A tombstone beats a concurrent live edit regardless of timestamps —
/// deletion is sticky, so a removed profile cannot resurrect with stale
/// credentials. Otherwise last-writer-wins on `updated_at`, ties going to
/// the remote copy (the convergence point for all clients).
pub fn resolve(local: &SessionProfile, remote: &SessionProfile) -> (ConflictWinner, ConflictReason) {
    match (local.is_tombstone(), remote.is_tombstone()) {
        (true, false) => (ConflictWinner::Local, ConflictReason::StickyTombstone),
        (false, true) => (ConflictWinner::Remote, ConflictReason::StickyTombstone),
        _ => {
            if local.updated_at > remote.updated_at {
                (ConflictWinner::Local, ConflictReason::NewerTimestamp)
            } else if local.updated_at < remote.updated_at {
                (ConflictWinner::Remote, ConflictReason::NewerTimestamp)
            } else {
                (ConflictWinner::Remote, ConflictReason::RemoteTieBreak)
            }
        }
    }
}

/// Whether a local tombstone may be garbage-collected.
///
/// True once both sides report the same `deleted_at`, or when there is no
/// remote side left to acknowledge it: either the record never synced, or
/// the remote authority already purged its own tombstone.
pub fn purgeable(local: &SessionProfile, remote: Option<&SessionProfile>) -> bool {
    if !local.is_tombstone() {
        return false;
    }
    match remote {
        None => true,
        Some(remote) => remote.deleted_at == local.deleted_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CredentialEnvelope;
    use crate::store::{ClientVersion, ServerVersion, SessionProfile, VersionBaseline};
    use uuid::Uuid;

    fn base_profile() -> SessionProfile {
        SessionProfile {
            id: Uuid::new_v4(),
            owner: Uuid::new_v4(),
            name: "web-1".to_string(),
            host: "web-1.example.net".to_string(),
            port: 22,
            username: "admin".to_string(),
            group_name: None,
            terminal_type: None,
            columns: None,
            rows: None,
            credential: CredentialEnvelope {
                ciphertext: vec![1, 2, 3],
                nonce: [0u8; 12],
                key_salt: None,
            },
            server_version: None,
            client_version: ClientVersion::INITIAL,
            baseline: VersionBaseline::default(),
            last_synced_at: None,
            created_at: 1000,
            updated_at: 1000,
            deleted_at: None,
        }
    }

    /// A record both sides agree on at server version `sv`, local
    /// counter `cv`, with the baseline matching (nothing changed since
    /// the last sync).
    fn synced_pair(sv: u64, cv: u64) -> (SessionProfile, SessionProfile) {
        let mut local = base_profile();
        local.server_version = Some(ServerVersion::new(sv));
        local.client_version = ClientVersion::new(cv);
        local.baseline = VersionBaseline {
            server: Some(ServerVersion::new(sv)),
            client: ClientVersion::new(cv),
        };
        local.last_synced_at = Some(2000);

        let mut remote = local.clone();
        remote.baseline = VersionBaseline::default();
        (local, remote)
    }

    fn edited_local(local: &SessionProfile, at: i64) -> SessionProfile {
        let mut edited = local.clone();
        edited.client_version = edited.client_version.next();
        edited.updated_at = at;
        edited.name = "local-edit".to_string();
        edited
    }

    fn edited_remote(remote: &SessionProfile, at: i64) -> SessionProfile {
        let mut edited = remote.clone();
        edited.server_version =
            Some(ServerVersion::new(edited.server_version.unwrap().get() + 1));
        edited.updated_at = at;
        edited.host = "moved.example.net".to_string();
        edited
    }

    // --- Classification ---

    #[test]
    fn local_only_unsynced_is_push_create() {
        let local = base_profile();
        assert_eq!(classify(Some(&local), None), MergeDecision::PushCreate);
    }

    #[test]
    fn remote_only_live_is_adopt() {
        let (_, remote) = synced_pair(1, 0);
        assert_eq!(classify(None, Some(&remote)), MergeDecision::AdoptRemote);
    }

    #[test]
    fn remote_only_tombstone_is_silent_adoption() {
        let (_, mut remote) = synced_pair(2, 0);
        remote.deleted_at = Some(3000);
        assert_eq!(
            classify(None, Some(&remote)),
            MergeDecision::AdoptRemoteTombstone
        );
    }

    #[test]
    fn unchanged_pair_is_noop() {
        let (local, remote) = synced_pair(3, 2);
        assert_eq!(classify(Some(&local), Some(&remote)), MergeDecision::Noop);
    }

    #[test]
    fn local_advance_is_push_update() {
        let (local, remote) = synced_pair(3, 2);
        let local = edited_local(&local, 2500);
        assert_eq!(
            classify(Some(&local), Some(&remote)),
            MergeDecision::PushUpdate
        );
    }

    #[test]
    fn local_tombstone_advance_is_push_delete() {
        let (mut local, remote) = synced_pair(3, 2);
        local.client_version = local.client_version.next();
        local.deleted_at = Some(2500);
        local.updated_at = 2500;
        assert_eq!(
            classify(Some(&local), Some(&remote)),
            MergeDecision::PushDelete
        );
    }

    #[test]
    fn remote_advance_is_adopt() {
        let (local, remote) = synced_pair(3, 2);
        let remote = edited_remote(&remote, 2500);
        assert_eq!(
            classify(Some(&local), Some(&remote)),
            MergeDecision::AdoptRemote
        );
    }

    #[test]
    fn remote_tombstone_on_known_record_is_plain_adoption() {
        let (local, remote) = synced_pair(3, 2);
        let mut remote = edited_remote(&remote, 2500);
        remote.deleted_at = Some(2500);
        // Known record: the deletion is user-visible, not the silent path.
        assert_eq!(
            classify(Some(&local), Some(&remote)),
            MergeDecision::AdoptRemote
        );
    }

    #[test]
    fn never_synced_local_against_remote_record_counts_both_sides_changed() {
        // Same id created independently on both sides.
        let local = base_profile();
        let mut remote = local.clone();
        remote.server_version = Some(ServerVersion::new(1));
        remote.client_version = ClientVersion::UNEDITED;
        remote.updated_at = 5000;

        assert!(matches!(
            classify(Some(&local), Some(&remote)),
            MergeDecision::Conflict { .. }
        ));
    }

    // --- Conflict resolution ---

    #[test]
    fn later_updated_at_wins() {
        let (local, remote) = synced_pair(3, 2);
        let local = edited_local(&local, 2505);
        let remote = edited_remote(&remote, 2510);

        let decision = classify(Some(&local), Some(&remote));
        assert_eq!(
            decision,
            MergeDecision::Conflict {
                winner: ConflictWinner::Remote,
                reason: ConflictReason::NewerTimestamp
            }
        );

        // Mirror image: local is later.
        let local_late = edited_local(&local, 2520);
        assert_eq!(
            classify(Some(&local_late), Some(&remote)),
            MergeDecision::Conflict {
                winner: ConflictWinner::Local,
                reason: ConflictReason::NewerTimestamp
            }
        );
    }

    #[test]
    fn equal_updated_at_prefers_remote() {
        let (local, remote) = synced_pair(3, 2);
        let local = edited_local(&local, 2500);
        let remote = edited_remote(&remote, 2500);

        assert_eq!(
            classify(Some(&local), Some(&remote)),
            MergeDecision::Conflict {
                winner: ConflictWinner::Remote,
                reason: ConflictReason::RemoteTieBreak
            }
        );
    }

    #[test]
    fn resolution_is_deterministic() {
        let (local, remote) = synced_pair(3, 2);
        let local = edited_local(&local, 2505);
        let remote = edited_remote(&remote, 2510);

        let first = resolve(&local, &remote);
        for _ in 0..10 {
            assert_eq!(resolve(&local, &remote), first);
        }
    }

    #[test]
    fn older_local_tombstone_beats_newer_remote_edit() {
        let (mut local, remote) = synced_pair(3, 2);
        local.client_version = local.client_version.next();
        local.deleted_at = Some(2100);
        local.updated_at = 2100;
        let remote = edited_remote(&remote, 9999);

        assert_eq!(
            classify(Some(&local), Some(&remote)),
            MergeDecision::Conflict {
                winner: ConflictWinner::Local,
                reason: ConflictReason::StickyTombstone
            }
        );
    }

    #[test]
    fn older_remote_tombstone_beats_newer_local_edit() {
        let (local, remote) = synced_pair(3, 2);
        let local = edited_local(&local, 9999);
        let mut remote = edited_remote(&remote, 2100);
        remote.deleted_at = Some(2100);

        assert_eq!(
            classify(Some(&local), Some(&remote)),
            MergeDecision::Conflict {
                winner: ConflictWinner::Remote,
                reason: ConflictReason::StickyTombstone
            }
        );
    }

    #[test]
    fn both_tombstones_fall_back_to_timestamps() {
        let (mut local, remote) = synced_pair(3, 2);
        local.client_version = local.client_version.next();
        local.deleted_at = Some(2100);
        local.updated_at = 2100;
        let mut remote = edited_remote(&remote, 2100);
        remote.deleted_at = Some(2050);

        assert_eq!(
            resolve(&local, &remote),
            (ConflictWinner::Remote, ConflictReason::RemoteTieBreak)
        );
    }

    // --- Tombstone purge ---

    #[test]
    fn live_record_never_purgeable() {
        let (local, remote) = synced_pair(3, 2);
        assert!(!purgeable(&local, Some(&remote)));
        assert!(!purgeable(&local, None));
    }

    #[test]
    fn tombstone_purgeable_once_both_sides_agree() {
        let (mut local, mut remote) = synced_pair(3, 2);
        local.deleted_at = Some(2100);
        remote.deleted_at = Some(2100);
        assert!(purgeable(&local, Some(&remote)));
    }

    #[test]
    fn tombstone_not_purgeable_while_remote_is_live() {
        let (mut local, remote) = synced_pair(3, 2);
        local.deleted_at = Some(2100);
        assert!(!purgeable(&local, Some(&remote)));
    }

    #[test]
    fn tombstone_not_purgeable_on_deleted_at_mismatch() {
        let (mut local, mut remote) = synced_pair(3, 2);
        local.deleted_at = Some(2100);
        remote.deleted_at = Some(2200);
        assert!(!purgeable(&local, Some(&remote)));
    }

    #[test]
    fn unsynced_tombstone_purgeable_without_remote() {
        let mut local = base_profile();
        local.deleted_at = Some(2100);
        assert!(purgeable(&local, None));
    }
}
