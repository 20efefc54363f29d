//! hostvault core library
//!
//! Offline-capable catalog of SSH session profiles with encrypted
//! credentials: the envelope codec, the local session store, and the
//! sync reconciler against a remote authority.

pub mod catalog;
pub mod crypto;
pub mod platform;
pub mod store;
pub mod sync;

pub use catalog::{NewProfile, ProfileCatalog, ProfileEdit};
pub use crypto::{
    seal, unseal, CodecError, CredentialEnvelope, KdfParams, KeySalt, PlaintextSecret,
};
pub use platform::{ensure_data_dir, get_data_dir, get_default_catalog_path};
pub use store::{
    ClientVersion, Database, Page, ServerVersion, SessionProfile, SessionStore, StoreError,
    VersionBaseline,
};
pub use sync::{
    GatewayError, HttpGateway, ReconcileError, SyncEngine, SyncGateway, SyncOutcome, SyncReport,
    SyncSettings, SyncStatus,
};

use thiserror::Error;

/// Result type for catalog operations.
pub type Result<T> = std::result::Result<T, HostVaultError>;

/// General error type spanning the subsystem taxonomies.
#[derive(Error, Debug)]
pub enum HostVaultError {
    #[error("codec error: {0}")]
    Codec(#[from] crypto::CodecError),

    #[error("store error: {0}")]
    Store(#[from] store::StoreError),

    #[error("gateway error: {0}")]
    Gateway(#[from] sync::GatewayError),

    #[error("reconcile error: {0}")]
    Reconcile(#[from] sync::ReconcileError),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
