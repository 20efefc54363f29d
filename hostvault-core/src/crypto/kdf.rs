//! Argon2id key derivation for credential sealing.
//!
//! Each profile's credential is sealed under a key derived from the user's
//! passphrase and a per-profile salt. The salt is durable (stored in the
//! envelope) so the same passphrase re-derives the same key on any device;
//! the derivation parameters are a codec-wide contract, not part of the
//! envelope.

use crate::crypto::{CodecError, Result};
use argon2::{Algorithm, Argon2, Params, Version};
use serde::{Deserialize, Serialize};

/// Length of a key-derivation salt in bytes.
pub const SALT_LEN: usize = 16;

/// A per-profile key-derivation salt.
///
/// Generated once when a profile's credential is first sealed, then reused
/// for every re-seal so the derived key stays stable across edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySalt([u8; SALT_LEN]);

impl KeySalt {
    /// Generate a fresh random salt.
    pub fn generate() -> Self {
        Self(rand::random())
    }

    pub fn from_bytes(bytes: [u8; SALT_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a salt from a raw slice, e.g. a database column.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let arr: [u8; SALT_LEN] = bytes.try_into().map_err(|_| {
            CodecError::KeyDerivationFailed(format!(
                "salt must be {} bytes, got {}",
                SALT_LEN,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    pub fn as_bytes(&self) -> &[u8; SALT_LEN] {
        &self.0
    }
}

/// Parameters for Argon2id key derivation.
///
/// Defaults are interactive-grade (sealing happens on every credential
/// edit), unlike a once-per-unlock master key derivation which would use
/// heavier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB.
    pub mem_cost: u32,

    /// Time cost (number of iterations).
    pub time_cost: u32,

    /// Parallelism (number of lanes).
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            mem_cost: 19_456, // 19 MiB
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl KdfParams {
    /// Verify that parameters are within acceptable ranges.
    pub fn validate(&self) -> Result<()> {
        if self.mem_cost < 8_192 {
            return Err(CodecError::KeyDerivationFailed(
                "memory cost too low (minimum: 8 MiB)".to_string(),
            ));
        }
        if self.time_cost < 1 {
            return Err(CodecError::KeyDerivationFailed(
                "time cost too low (minimum: 1)".to_string(),
            ));
        }
        if self.parallelism < 1 {
            return Err(CodecError::KeyDerivationFailed(
                "parallelism too low (minimum: 1)".to_string(),
            ));
        }
        Ok(())
    }

    /// Reduced-cost parameters for tests.
    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        Self {
            mem_cost: 8_192,
            time_cost: 1,
            parallelism: 1,
        }
    }
}

/// Derive a 256-bit sealing key from a passphrase and salt.
///
/// Deterministic: the same passphrase, salt, and parameters always produce
/// the same key. All failures map to `CodecError::KeyDerivationFailed`.
pub fn derive_credential_key(
    passphrase: &[u8],
    salt: &KeySalt,
    params: &KdfParams,
) -> Result<[u8; 32]> {
    params.validate()?;

    let argon_params = Params::new(params.mem_cost, params.time_cost, params.parallelism, Some(32))
        .map_err(|e| CodecError::KeyDerivationFailed(format!("invalid parameters: {}", e)))?;

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut key = [0u8; 32];
    argon2
        .hash_password_into(passphrase, salt.as_bytes(), &mut key)
        .map_err(|e| CodecError::KeyDerivationFailed(format!("derivation failed: {}", e)))?;

    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_same_key() {
        let salt = KeySalt::generate();
        let params = KdfParams::for_tests();

        let key1 = derive_credential_key(b"passphrase", &salt, &params).unwrap();
        let key2 = derive_credential_key(b"passphrase", &salt, &params).unwrap();
        assert_eq!(key1, key2);
    }

    #[test]
    fn different_passphrase_different_key() {
        let salt = KeySalt::generate();
        let params = KdfParams::for_tests();

        let key1 = derive_credential_key(b"passphrase", &salt, &params).unwrap();
        let key2 = derive_credential_key(b"other", &salt, &params).unwrap();
        assert_ne!(key1, key2);
    }

    #[test]
    fn different_salt_different_key() {
        let params = KdfParams::for_tests();

        let key1 = derive_credential_key(b"passphrase", &KeySalt::generate(), &params).unwrap();
        let key2 = derive_credential_key(b"passphrase", &KeySalt::generate(), &params).unwrap();
        assert_ne!(key1, key2);
    }

    #[test]
    fn malformed_salt_slice_rejected() {
        assert!(KeySalt::from_slice(&[0u8; 7]).is_err());
        assert!(KeySalt::from_slice(&[0u8; 16]).is_ok());
    }

    #[test]
    fn params_validation() {
        let mut params = KdfParams::default();
        assert!(params.validate().is_ok());

        params.mem_cost = 100;
        assert!(params.validate().is_err());

        params = KdfParams::default();
        params.time_cost = 0;
        assert!(params.validate().is_err());

        params = KdfParams::default();
        params.parallelism = 0;
        assert!(params.validate().is_err());
    }
}
