//! Sync engine: orchestrates the pull/merge/push/purge cycle.
//!
//! A cycle fetches the complete remote snapshot before touching the
//! store, so a transport failure mid-fetch leaves local state exactly as
//! it was. Per-record failures are recorded and skipped; they never abort
//! the batch. At most one cycle is in flight at a time; triggers that
//! arrive mid-cycle are coalesced into a single deferred re-run.

use crate::store::{SessionProfile, SessionStore, StoreError};
use crate::sync::config::SyncSettings;
use crate::sync::gateway::{GatewayError, SyncGateway};
use crate::sync::models::{
    ConflictWinner, FailedRecord, ProfilePatch, ResolvedConflict, SyncOutcome, SyncReport,
    SyncStatus,
};
use crate::sync::reconciler::{classify, purgeable, MergeDecision};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Errors that abort or summarize a reconciliation cycle.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("partial batch failure: {} record(s) failed", .0.len())]
    PartialBatchFailure(Vec<FailedRecord>),
}

impl SyncReport {
    /// Strict view of a completed cycle: per-record failures become a
    /// [`ReconcileError::PartialBatchFailure`] for callers that want to
    /// retry rather than inspect the report.
    pub fn into_result(self) -> Result<SyncReport, ReconcileError> {
        if self.failed.is_empty() {
            Ok(self)
        } else {
            Err(ReconcileError::PartialBatchFailure(self.failed))
        }
    }
}

/// Reconciles the local session store against the remote authority.
pub struct SyncEngine {
    gateway: Arc<dyn SyncGateway>,
    store: SessionStore,
    owner: Uuid,
    page_size: u32,
    in_flight: AtomicBool,
    rerun_requested: AtomicBool,
}

impl SyncEngine {
    pub fn new(gateway: Arc<dyn SyncGateway>, store: SessionStore, owner: Uuid) -> Self {
        Self {
            gateway,
            store,
            owner,
            page_size: 50,
            in_flight: AtomicBool::new(false),
            rerun_requested: AtomicBool::new(false),
        }
    }

    /// Trigger a reconciliation.
    ///
    /// If a cycle is already running the trigger is coalesced: the
    /// running cycle re-runs once after it finishes, and this call
    /// returns [`SyncOutcome::Deferred`] immediately.
    pub async fn sync(&self) -> Result<SyncOutcome, ReconcileError> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            self.rerun_requested.store(true, Ordering::SeqCst);
            return Ok(SyncOutcome::Deferred);
        }

        let result = self.run_until_settled().await;
        self.in_flight.store(false, Ordering::SeqCst);
        result.map(SyncOutcome::Completed)
    }

    async fn run_until_settled(&self) -> Result<SyncReport, ReconcileError> {
        loop {
            let report = self.run_cycle().await?;
            if !self.rerun_requested.swap(false, Ordering::SeqCst) {
                return Ok(report);
            }
            debug!("coalesced trigger pending, running another cycle");
        }
    }

    /// Read-only sync state for display.
    pub fn status(&self) -> Result<SyncStatus, ReconcileError> {
        let pending = self.store.count_pending(self.owner)?;
        let settings = self.store.with_conn(SyncSettings::load)?;
        Ok(SyncStatus {
            last_sync_at: settings.last_sync_at,
            pending_changes: pending,
            conflicts_last_cycle: settings.last_conflicts,
            failed_last_cycle: settings.last_failed,
        })
    }

    async fn run_cycle(&self) -> Result<SyncReport, ReconcileError> {
        let now = chrono::Utc::now().timestamp();
        let mut report = SyncReport {
            completed_at: now,
            ..Default::default()
        };

        // Complete remote snapshot first; nothing local is touched until
        // every page is in hand.
        let mut remote = self.fetch_remote().await?;

        let locals: HashMap<Uuid, SessionProfile> = self
            .store
            .all_profiles(self.owner)?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let ids: BTreeSet<Uuid> = locals.keys().chain(remote.keys()).copied().collect();

        // Resolve each record independently. Version conflicts from the
        // push path are retried once against fresh remote state; other
        // per-record errors are recorded and skipped.
        let mut conflicted: Vec<Uuid> = Vec::new();
        for id in &ids {
            let decision = classify(locals.get(id), remote.get(id));
            match self
                .apply_decision(*id, decision, locals.get(id), remote.get(id), now, &mut report)
                .await
            {
                Ok(()) => {}
                Err(ReconcileError::Gateway(GatewayError::Transport(msg))) => {
                    return Err(GatewayError::Transport(msg).into());
                }
                Err(ReconcileError::Gateway(GatewayError::Timeout)) => {
                    return Err(GatewayError::Timeout.into());
                }
                Err(ReconcileError::Gateway(GatewayError::VersionConflict { .. })) => {
                    conflicted.push(*id);
                }
                Err(e) => report.failed.push(FailedRecord {
                    id: *id,
                    cause: e.to_string(),
                }),
            }
        }

        if !conflicted.is_empty() {
            debug!(count = conflicted.len(), "re-resolving after version conflicts");
            let fresh = self.fetch_remote().await?;
            for id in conflicted {
                report.conflicts.retain(|c| c.id != id);
                let local = self.store.get(id)?;
                let decision = classify(local.as_ref(), fresh.get(&id));
                match self
                    .apply_decision(id, decision, local.as_ref(), fresh.get(&id), now, &mut report)
                    .await
                {
                    Ok(()) => {}
                    Err(ReconcileError::Gateway(GatewayError::Transport(msg))) => {
                        return Err(GatewayError::Transport(msg).into());
                    }
                    Err(ReconcileError::Gateway(GatewayError::Timeout)) => {
                        return Err(GatewayError::Timeout.into());
                    }
                    Err(e) => report.failed.push(FailedRecord {
                        id,
                        cause: e.to_string(),
                    }),
                }
            }
            remote.extend(fresh);
        }

        // Tombstone garbage collection: a separate pass, never
        // interleaved with conflict resolution.
        for local in self.store.all_profiles(self.owner)? {
            if purgeable(&local, remote.get(&local.id)) {
                match self.store.purge(local.id) {
                    Ok(()) => report.purged.push(local.id),
                    Err(e) => report.failed.push(FailedRecord {
                        id: local.id,
                        cause: e.to_string(),
                    }),
                }
            }
        }

        self.store.with_conn(|conn| {
            let mut settings = SyncSettings::load(conn)?;
            settings.owner = Some(self.owner);
            settings.last_sync_at = Some(now);
            settings.last_conflicts = report.conflicts.len() as u64;
            settings.last_failed = report.failed.len() as u64;
            settings.save(conn)
        })?;

        if report.failed.is_empty() {
            info!(
                adopted = report.adopted.len(),
                pushed = report.pushed_creates.len()
                    + report.pushed_updates.len()
                    + report.pushed_deletes.len(),
                conflicts = report.conflicts.len(),
                purged = report.purged.len(),
                "sync cycle complete"
            );
        } else {
            warn!(
                failed = report.failed.len(),
                "sync cycle complete with per-record failures"
            );
        }

        Ok(report)
    }

    async fn fetch_remote(&self) -> Result<HashMap<Uuid, SessionProfile>, ReconcileError> {
        let mut map = HashMap::new();
        let mut page = 1u32;
        loop {
            let result = self.gateway.list(self.owner, page, self.page_size).await?;
            let has_more = result.has_more();
            if result.data.is_empty() && has_more {
                return Err(GatewayError::InvalidResponse(
                    "empty page with more records claimed".to_string(),
                )
                .into());
            }
            for profile in result.data {
                map.insert(profile.id, profile);
            }
            if !has_more {
                break;
            }
            page += 1;
        }
        Ok(map)
    }

    async fn apply_decision(
        &self,
        id: Uuid,
        decision: MergeDecision,
        local: Option<&SessionProfile>,
        remote: Option<&SessionProfile>,
        now: i64,
        report: &mut SyncReport,
    ) -> Result<(), ReconcileError> {
        match decision {
            MergeDecision::Noop => Ok(()),

            MergeDecision::AdoptRemote | MergeDecision::AdoptRemoteTombstone => {
                let remote = remote.expect("adopt decision without remote record");
                self.store.adopt_remote(remote, now)?;
                report.adopted.push(id);
                Ok(())
            }

            MergeDecision::PushCreate => {
                let local = local.expect("push decision without local record");
                self.push_create(local, now, report).await
            }

            MergeDecision::PushUpdate => {
                let local = local.expect("push decision without local record");
                let remote = remote.expect("push update without remote record");
                self.push_update(local, remote_version(remote)?, now, report)
                    .await
            }

            MergeDecision::PushDelete => {
                let local = local.expect("push decision without local record");
                let remote = remote.expect("push delete without remote record");
                self.push_delete(local, remote_version(remote)?, now, report)
                    .await
            }

            MergeDecision::Conflict { winner, reason } => {
                report.conflicts.push(ResolvedConflict { id, winner, reason });
                let local = local.expect("conflict without local record");
                let remote = remote.expect("conflict without remote record");
                match winner {
                    ConflictWinner::Remote => {
                        self.store.adopt_remote(remote, now)?;
                        report.adopted.push(id);
                        Ok(())
                    }
                    ConflictWinner::Local => {
                        if local.is_tombstone() {
                            self.push_delete(local, remote_version(remote)?, now, report)
                                .await
                        } else {
                            self.push_update(local, remote_version(remote)?, now, report)
                                .await
                        }
                    }
                }
            }
        }
    }

    async fn push_create(
        &self,
        local: &SessionProfile,
        now: i64,
        report: &mut SyncReport,
    ) -> Result<(), ReconcileError> {
        let mut outgoing = local.clone();
        outgoing.server_version = None;

        let created = self.gateway.create(self.owner, &outgoing).await?;
        let assigned = created.server_version.ok_or_else(|| {
            GatewayError::InvalidResponse("create response missing server_version".to_string())
        })?;

        self.store
            .confirm_synced(local.id, assigned, local.client_version, now)?;
        report.pushed_creates.push(local.id);
        Ok(())
    }

    async fn push_update(
        &self,
        local: &SessionProfile,
        expected: crate::store::ServerVersion,
        now: i64,
        report: &mut SyncReport,
    ) -> Result<(), ReconcileError> {
        let patch = ProfilePatch::from_profile(local);
        let updated = self.gateway.update(local.id, &patch, expected).await?;
        let assigned = updated.server_version.ok_or_else(|| {
            GatewayError::InvalidResponse("update response missing server_version".to_string())
        })?;

        self.store
            .confirm_synced(local.id, assigned, local.client_version, now)?;
        report.pushed_updates.push(local.id);
        Ok(())
    }

    async fn push_delete(
        &self,
        local: &SessionProfile,
        expected: crate::store::ServerVersion,
        now: i64,
        report: &mut SyncReport,
    ) -> Result<(), ReconcileError> {
        let deleted_at = local
            .deleted_at
            .expect("push delete for a record without deleted_at");
        let assigned = self
            .gateway
            .soft_delete(local.id, expected, deleted_at)
            .await?;

        self.store
            .confirm_synced(local.id, assigned, local.client_version, now)?;
        report.pushed_deletes.push(local.id);
        Ok(())
    }
}

fn remote_version(remote: &SessionProfile) -> Result<crate::store::ServerVersion, ReconcileError> {
    remote.server_version.ok_or_else(|| {
        GatewayError::InvalidResponse("remote record missing server_version".to_string()).into()
    })
}
