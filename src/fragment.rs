//! What each carrier holds: one share of the data key plus a copy of the
//! sealed envelope.

use bincode::Options;
use serde::{Deserialize, Serialize};

use crate::crypto::{AeadCipher, Ciphertext};
use crate::error::{FractureError, FractureResult};
use crate::sharing::Share;

/// Upper bound on an encoded fragment. Bounds allocation when decoding
/// whatever happens to sit in a carrier's low bits.
pub const MAX_FRAGMENT_LEN: u64 = 16 * 1024 * 1024;

/// Carrier payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fragment {
    /// Share of the data key
    pub share: Share,
    /// Cipher that sealed the envelope
    pub cipher: AeadCipher,
    /// nonce || ciphertext of the vault bytes under the data key
    pub envelope: Vec<u8>,
}

fn codec() -> impl Options {
    bincode::DefaultOptions::new().with_limit(MAX_FRAGMENT_LEN)
}

impl Fragment {
    pub fn new(share: Share, envelope: &Ciphertext) -> Self {
        Self {
            share,
            cipher: envelope.cipher,
            envelope: envelope.to_bytes(),
        }
    }

    pub fn to_bytes(&self) -> FractureResult<Vec<u8>> {
        Ok(codec().serialize(self)?)
    }

    pub fn from_bytes(data: &[u8]) -> FractureResult<Self> {
        codec()
            .deserialize(data)
            .map_err(|e| {
                FractureError::CorruptedPayload(format!("fragment does not decode: {}", e))
            })
    }

    /// The sealed envelope as a ciphertext value
    pub fn envelope(&self) -> FractureResult<Ciphertext> {
        Ciphertext::from_bytes(self.cipher, &self.envelope)
    }

    /// Whether two fragments can belong to the same distribution
    pub fn is_compatible_with(&self, other: &Fragment) -> bool {
        self.share.bundle_id == other.share.bundle_id
            && self.share.threshold == other.share.threshold
            && self.share.total == other.share.total
            && self.cipher == other.cipher
            && self.envelope == other.envelope
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{encrypt, SymmetricKey};
    use crate::sharing::split;
    use uuid::Uuid;

    fn sample(bundle_id: Uuid) -> Vec<Fragment> {
        let key = SymmetricKey::generate();
        let envelope = encrypt(AeadCipher::default(), &key, b"vault bytes", b"aad").unwrap();
        split(key.expose(), 2, 3, bundle_id)
            .unwrap()
            .into_iter()
            .map(|share| Fragment::new(share, &envelope))
            .collect()
    }

    #[test]
    fn test_bytes_roundtrip() {
        let fragments = sample(Uuid::new_v4());
        let bytes = fragments[1].to_bytes().unwrap();
        let decoded = Fragment::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, fragments[1]);
        assert_eq!(decoded.envelope().unwrap().cipher, AeadCipher::XChaCha20Poly1305);
    }

    #[test]
    fn test_garbage_is_corrupted_payload() {
        assert!(matches!(
            Fragment::from_bytes(&[0xFF; 7]),
            Err(FractureError::CorruptedPayload(_))
        ));

        let mut bytes = sample(Uuid::new_v4())[0].to_bytes().unwrap();
        bytes.push(0);
        assert!(Fragment::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_compatibility() {
        let a = sample(Uuid::new_v4());
        assert!(a[0].is_compatible_with(&a[2]));

        let b = sample(Uuid::new_v4());
        assert!(!a[0].is_compatible_with(&b[0]));

        let mut tampered = a[1].clone();
        tampered.envelope[0] ^= 1;
        assert!(!a[0].is_compatible_with(&tampered));
    }
}
