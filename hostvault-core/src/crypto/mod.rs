//! Credential envelope codec.
//!
//! This module provides:
//! - Argon2id key derivation from passphrase + per-profile salt
//! - AES-256-GCM seal/unseal of credential secrets
//! - Zeroizing containers for transient plaintext

pub mod envelope;
pub mod kdf;
pub mod zero;

pub use envelope::{seal, unseal, CredentialEnvelope};
pub use kdf::{derive_credential_key, KdfParams, KeySalt};
pub use zero::PlaintextSecret;

use thiserror::Error;

/// Errors that can occur in codec operations.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("Key derivation failed: {0}")]
    KeyDerivationFailed(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Authentication failed - envelope may have been tampered with")]
    AuthenticationFailed,
}

/// Result type for codec operations.
pub type Result<T> = std::result::Result<T, CodecError>;
