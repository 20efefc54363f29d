//! Zeroizing container for decrypted credential material.
//!
//! A credential secret exists in plaintext only between `unseal` and the
//! moment the caller is done with it. `PlaintextSecret` keeps that window
//! explicit: the buffer is wiped when dropped and equality checks are
//! constant-time.

use subtle::ConstantTimeEq;
use zeroize::ZeroizeOnDrop;

/// A decrypted credential secret, zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct PlaintextSecret {
    bytes: Vec<u8>,
}

impl PlaintextSecret {
    /// Wrap raw secret bytes.
    pub fn new(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    /// Wrap a secret string (passwords, key passphrases).
    pub fn from_string(s: String) -> Self {
        Self {
            bytes: s.into_bytes(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Borrow the secret bytes. Callers must not copy them into
    /// longer-lived storage.
    pub fn expose(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<Vec<u8>> for PlaintextSecret {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&str> for PlaintextSecret {
    fn from(s: &str) -> Self {
        Self::from_string(s.to_string())
    }
}

impl PartialEq for PlaintextSecret {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for PlaintextSecret {}

impl std::fmt::Debug for PlaintextSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the contents, not even length-prefixed.
        f.write_str("PlaintextSecret([redacted])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_and_exposes_bytes() {
        let secret = PlaintextSecret::new(vec![1, 2, 3]);
        assert_eq!(secret.expose(), &[1, 2, 3]);
        assert_eq!(secret.len(), 3);
        assert!(!secret.is_empty());
    }

    #[test]
    fn equality_is_by_content() {
        let a = PlaintextSecret::from("hunter2");
        let b = PlaintextSecret::from("hunter2");
        let c = PlaintextSecret::from("hunter3");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn debug_output_is_redacted() {
        let secret = PlaintextSecret::from("super secret");
        let rendered = format!("{:?}", secret);
        assert!(!rendered.contains("super secret"));
    }
}
