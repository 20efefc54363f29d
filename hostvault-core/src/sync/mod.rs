//! Offline sync for the session profile catalog.
//!
//! - Baseline-version change detection (independent client/server counters)
//! - Last-write-wins conflict resolution with sticky tombstones
//! - Tombstone garbage collection after bilateral acknowledgement
//! - Ed25519 device identity and request signing
//! - Partial-failure batches: one bad record never aborts a cycle

pub mod auth;
pub mod config;
pub mod engine;
pub mod gateway;
pub mod models;
pub mod reconciler;

pub use config::SyncSettings;
pub use engine::{ReconcileError, SyncEngine};
pub use gateway::{GatewayError, HttpGateway, SyncGateway};
pub use models::{
    ConflictReason, ConflictWinner, FailedRecord, ProfilePatch, RemotePage, ResolvedConflict,
    SyncOutcome, SyncReport, SyncStatus,
};
pub use reconciler::MergeDecision;
