//! Sync data models: wire format, merge reporting, and status.

use crate::crypto::CredentialEnvelope;
use crate::store::SessionProfile;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One page of remote records, as returned by the gateway's `list`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemotePage {
    pub data: Vec<SessionProfile>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl RemotePage {
    /// Whether more pages follow this one.
    pub fn has_more(&self) -> bool {
        (self.page as u64) * (self.page_size as u64) < self.total
    }
}

/// Partial update pushed to the remote authority. Credentials travel
/// sealed; there is no plaintext field to forget to strip.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub group_name: Option<String>,
    pub terminal_type: Option<String>,
    pub columns: Option<u16>,
    pub rows: Option<u16>,
    pub credential: Option<CredentialEnvelope>,
    pub updated_at: i64,
}

impl ProfilePatch {
    /// Full-snapshot patch from a local record. The reconciler always
    /// pushes whole records; field-level patches are a transport
    /// optimization the merge algorithm does not rely on.
    pub fn from_profile(profile: &SessionProfile) -> Self {
        Self {
            name: Some(profile.name.clone()),
            host: Some(profile.host.clone()),
            port: Some(profile.port),
            username: Some(profile.username.clone()),
            group_name: profile.group_name.clone(),
            terminal_type: profile.terminal_type.clone(),
            columns: profile.columns,
            rows: profile.rows,
            credential: Some(profile.credential.clone()),
            updated_at: profile.updated_at,
        }
    }
}

/// Which side of a conflict won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictWinner {
    Local,
    Remote,
}

/// Why the winning side won.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    /// Later `updated_at`.
    NewerTimestamp,
    /// Equal `updated_at`; the remote authority is the tie-break source
    /// of truth.
    RemoteTieBreak,
    /// A tombstone beat a concurrent live edit regardless of timestamp.
    StickyTombstone,
}

/// One conflict resolved during a cycle, for observability.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedConflict {
    pub id: Uuid,
    pub winner: ConflictWinner,
    pub reason: ConflictReason,
}

/// A record that failed to reconcile and was skipped; retried next cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedRecord {
    pub id: Uuid,
    pub cause: String,
}

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncReport {
    pub adopted: Vec<Uuid>,
    pub pushed_creates: Vec<Uuid>,
    pub pushed_updates: Vec<Uuid>,
    pub pushed_deletes: Vec<Uuid>,
    pub purged: Vec<Uuid>,
    pub conflicts: Vec<ResolvedConflict>,
    pub failed: Vec<FailedRecord>,
    pub completed_at: i64,
}

impl SyncReport {
    /// Whether every record reconciled cleanly.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Total records touched by the cycle.
    pub fn touched(&self) -> usize {
        self.adopted.len()
            + self.pushed_creates.len()
            + self.pushed_updates.len()
            + self.pushed_deletes.len()
    }
}

/// Result of a sync trigger.
#[derive(Debug, Clone)]
pub enum SyncOutcome {
    /// A cycle ran to completion (possibly with per-record failures in
    /// the report).
    Completed(SyncReport),
    /// Another cycle was already in flight; this trigger was coalesced
    /// into a deferred re-run.
    Deferred,
}

/// Read-only sync state for display. Exposed as a query, never a
/// mutation path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatus {
    pub last_sync_at: Option<i64>,
    pub pending_changes: u64,
    pub conflicts_last_cycle: u64,
    pub failed_last_cycle: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_page_has_more() {
        let page = |page, page_size, total| RemotePage {
            data: vec![],
            total,
            page,
            page_size,
        };
        assert!(page(1, 50, 120).has_more());
        assert!(page(2, 50, 120).has_more());
        assert!(!page(3, 50, 120).has_more());
        assert!(!page(1, 50, 0).has_more());
        assert!(!page(1, 50, 50).has_more());
    }

    #[test]
    fn report_cleanliness() {
        let mut report = SyncReport::default();
        assert!(report.is_clean());

        report.failed.push(FailedRecord {
            id: Uuid::new_v4(),
            cause: "store: stale write".to_string(),
        });
        assert!(!report.is_clean());
    }
}
