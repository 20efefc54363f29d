//! Credential envelope: AES-256-GCM sealing of a profile's secret.
//!
//! The envelope is the only form a credential takes at rest and on the
//! wire: `{ ciphertext, nonce, key_salt }`. The sealing key is derived
//! from the user's passphrase and the envelope's salt (see `kdf`), so the
//! envelope is self-contained apart from the passphrase itself.
//!
//! Every seal generates a fresh random nonce, even for unchanged
//! plaintext, so ciphertext bytes are useless as an equality test for
//! "credential unchanged". Callers that need change detection compare
//! decrypted material.

use crate::crypto::kdf::{derive_credential_key, KdfParams, KeySalt};
use crate::crypto::zero::PlaintextSecret;
use crate::crypto::{CodecError, Result};
use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Nonce length for AES-256-GCM (96 bits).
pub const NONCE_LEN: usize = 12;

/// A sealed credential: ciphertext plus the material needed to re-derive
/// the sealing key (minus the passphrase).
///
/// Opaque to every layer except this module. The store persists it as-is,
/// the gateway transports it as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEnvelope {
    /// AES-256-GCM ciphertext with the 16-byte auth tag appended.
    #[serde(with = "base64_bytes")]
    pub ciphertext: Vec<u8>,

    /// Unique nonce for this seal (12 bytes).
    pub nonce: [u8; NONCE_LEN],

    /// Key-derivation salt. Present on every envelope this codec
    /// produces; absent only in records from clients that have not yet
    /// sealed a credential.
    pub key_salt: Option<KeySalt>,
}

/// Seal a credential secret under a passphrase-derived key.
///
/// Generates a fresh random nonce on every call. If `existing_salt` is
/// given (the profile already has a durable salt) it is reused so the
/// derived key stays stable; otherwise a fresh salt is generated and
/// becomes part of the envelope.
pub fn seal(
    plaintext: &[u8],
    passphrase: &[u8],
    existing_salt: Option<KeySalt>,
    params: &KdfParams,
) -> Result<CredentialEnvelope> {
    if plaintext.is_empty() {
        return Err(CodecError::EncryptionFailed(
            "cannot seal an empty secret".to_string(),
        ));
    }

    let salt = existing_salt.unwrap_or_else(KeySalt::generate);
    let mut key = derive_credential_key(passphrase, &salt, params)?;

    let cipher = Aes256Gcm::new((&key).into());
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
    let nonce_bytes: [u8; NONCE_LEN] = nonce.into();

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CodecError::EncryptionFailed(format!("{}", e)));
    key.zeroize();

    Ok(CredentialEnvelope {
        ciphertext: ciphertext?,
        nonce: nonce_bytes,
        key_salt: Some(salt),
    })
}

/// Unseal a credential envelope.
///
/// Re-derives the key from the envelope's salt and decrypts. Any tag
/// verification failure (wrong passphrase, corrupted ciphertext,
/// tampering) surfaces as `CodecError::AuthenticationFailed` — never as
/// garbage plaintext.
pub fn unseal(
    envelope: &CredentialEnvelope,
    passphrase: &[u8],
    params: &KdfParams,
) -> Result<PlaintextSecret> {
    let salt = envelope.key_salt.ok_or_else(|| {
        CodecError::KeyDerivationFailed("envelope has no key salt".to_string())
    })?;

    let mut key = derive_credential_key(passphrase, &salt, params)?;

    let cipher = Aes256Gcm::new((&key).into());
    let nonce = Nonce::from(envelope.nonce);

    let plaintext = cipher
        .decrypt(&nonce, envelope.ciphertext.as_slice())
        .map_err(|_| CodecError::AuthenticationFailed);
    key.zeroize();

    Ok(PlaintextSecret::new(plaintext?))
}

/// Base64 serde for binary fields in JSON.
mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> KdfParams {
        KdfParams::for_tests()
    }

    #[test]
    fn seal_unseal_roundtrip() {
        let envelope = seal(b"id_ed25519 passphrase", b"vault pass", None, &params()).unwrap();
        let secret = unseal(&envelope, b"vault pass", &params()).unwrap();
        assert_eq!(secret.expose(), b"id_ed25519 passphrase");
    }

    #[test]
    fn fresh_salt_generated_when_absent() {
        let envelope = seal(b"secret", b"pass", None, &params()).unwrap();
        assert!(envelope.key_salt.is_some());
    }

    #[test]
    fn existing_salt_is_reused() {
        let salt = KeySalt::generate();
        let envelope = seal(b"secret", b"pass", Some(salt), &params()).unwrap();
        assert_eq!(envelope.key_salt, Some(salt));
    }

    #[test]
    fn resealing_produces_new_nonce_and_ciphertext() {
        let salt = KeySalt::generate();
        let env1 = seal(b"same secret", b"pass", Some(salt), &params()).unwrap();
        let env2 = seal(b"same secret", b"pass", Some(salt), &params()).unwrap();

        assert_ne!(env1.nonce, env2.nonce);
        assert_ne!(env1.ciphertext, env2.ciphertext);

        assert_eq!(
            unseal(&env1, b"pass", &params()).unwrap(),
            unseal(&env2, b"pass", &params()).unwrap()
        );
    }

    #[test]
    fn wrong_passphrase_fails_authentication() {
        let envelope = seal(b"secret", b"right", None, &params()).unwrap();
        let err = unseal(&envelope, b"wrong", &params()).unwrap_err();
        assert!(matches!(err, CodecError::AuthenticationFailed));
    }

    #[test]
    fn tampered_ciphertext_fails_authentication() {
        let mut envelope = seal(b"secret", b"pass", None, &params()).unwrap();
        envelope.ciphertext[0] ^= 0x01;
        let err = unseal(&envelope, b"pass", &params()).unwrap_err();
        assert!(matches!(err, CodecError::AuthenticationFailed));
    }

    #[test]
    fn tampered_auth_tag_fails_authentication() {
        let mut envelope = seal(b"secret", b"pass", None, &params()).unwrap();
        let last = envelope.ciphertext.len() - 1;
        envelope.ciphertext[last] ^= 0x80;
        let err = unseal(&envelope, b"pass", &params()).unwrap_err();
        assert!(matches!(err, CodecError::AuthenticationFailed));
    }

    #[test]
    fn tampered_nonce_fails_authentication() {
        let mut envelope = seal(b"secret", b"pass", None, &params()).unwrap();
        envelope.nonce[3] ^= 0xFF;
        let err = unseal(&envelope, b"pass", &params()).unwrap_err();
        assert!(matches!(err, CodecError::AuthenticationFailed));
    }

    #[test]
    fn missing_salt_is_a_derivation_error() {
        let mut envelope = seal(b"secret", b"pass", None, &params()).unwrap();
        envelope.key_salt = None;
        let err = unseal(&envelope, b"pass", &params()).unwrap_err();
        assert!(matches!(err, CodecError::KeyDerivationFailed(_)));
    }

    #[test]
    fn empty_secret_rejected() {
        assert!(seal(b"", b"pass", None, &params()).is_err());
    }

    #[test]
    fn envelope_json_roundtrip() {
        let envelope = seal(b"secret", b"pass", None, &params()).unwrap();
        let json = serde_json::to_string(&envelope).unwrap();
        let back: CredentialEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(envelope, back);

        // Ciphertext travels as base64, not a byte array.
        assert!(json.contains("\"ciphertext\":\""));
    }
}
