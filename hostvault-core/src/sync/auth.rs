//! Request signing and auth header formatting for the sync gateway.

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Format the canonical string-to-sign for a request.
///
/// ```text
/// {METHOD}\n{PATH}\n{TIMESTAMP}\n{NONCE}\n{SHA256(BODY)}
/// ```
pub fn canonical_string(
    method: &str,
    path: &str,
    timestamp: i64,
    nonce: &str,
    body: &[u8],
) -> String {
    let body_hash = hex::encode(Sha256::digest(body));
    format!(
        "{}\n{}\n{}\n{}\n{}",
        method, path, timestamp, nonce, body_hash
    )
}

/// Sign a request with the device's Ed25519 signing key.
pub fn sign_request(
    signing_key: &SigningKey,
    method: &str,
    path: &str,
    timestamp: i64,
    nonce: &str,
    body: &[u8],
) -> Vec<u8> {
    let message = canonical_string(method, path, timestamp, nonce, body);
    signing_key.sign(message.as_bytes()).to_bytes().to_vec()
}

/// Format the Authorization header value.
///
/// ```text
/// HostVault-Ed25519 <device_id>:<timestamp>:<nonce>:<base64(signature)>
/// ```
pub fn format_auth_header(
    device_id: &Uuid,
    timestamp: i64,
    nonce: &str,
    signature: &[u8],
) -> String {
    format!(
        "HostVault-Ed25519 {}:{}:{}:{}",
        device_id,
        timestamp,
        nonce,
        STANDARD.encode(signature)
    )
}

/// Generate a fresh 32-byte Ed25519 seed for a new device identity.
pub fn generate_device_seed() -> [u8; 32] {
    use rand::RngCore;
    let mut seed = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut seed);
    seed
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signature, Verifier};
    use rand::RngCore;

    fn test_key() -> SigningKey {
        let mut secret = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut secret);
        SigningKey::from_bytes(&secret)
    }

    #[test]
    fn signature_verifies_against_canonical_string() {
        let key = test_key();
        let sig = sign_request(&key, "POST", "/api/v1/profiles", 1_700_000_000, "n-1", b"{}");

        let message = canonical_string("POST", "/api/v1/profiles", 1_700_000_000, "n-1", b"{}");
        let signature = Signature::from_bytes(&sig.try_into().unwrap());
        assert!(key
            .verifying_key()
            .verify(message.as_bytes(), &signature)
            .is_ok());
    }

    #[test]
    fn body_change_breaks_signature() {
        let key = test_key();
        let sig = sign_request(&key, "POST", "/p", 1, "n", b"original");

        let message = canonical_string("POST", "/p", 1, "n", b"tampered");
        let signature = Signature::from_bytes(&sig.try_into().unwrap());
        assert!(key
            .verifying_key()
            .verify(message.as_bytes(), &signature)
            .is_err());
    }

    #[test]
    fn auth_header_format() {
        let device_id = Uuid::new_v4();
        let header = format_auth_header(&device_id, 42, "nonce-x", &[1, 2, 3]);
        assert!(header.starts_with("HostVault-Ed25519 "));
        assert!(header.contains(&device_id.to_string()));
        assert!(header.contains(":42:nonce-x:"));
    }
}
