//! Fractured Key - Cryptographic Core
//!
//! Argon2id for the master password, AEAD for both envelope layers.

pub mod aead;
pub mod kdf;
pub mod keys;

pub use aead::{decrypt, encrypt, AeadCipher, Ciphertext};
pub use kdf::{derive, KdfParams, Salt, SALT_LEN};
pub use keys::{DerivedKey, SymmetricKey, KEY_LEN};

use uuid::Uuid;

/// Domain prefix for every associated-data string
const AAD_PREFIX: &[u8] = b"fractured-key/v1/";

/// Layer labels for associated data
pub mod layers {
    /// Password layer: bundle encrypted under the derived key
    pub const VAULT: &str = "vault";
    /// Data-key layer: vault ciphertext encrypted under the split key
    pub const ENVELOPE: &str = "envelope";
    /// Single-file sealed blob
    pub const SEALED: &str = "sealed";
}

/// Associated data binding a ciphertext to its vault and share layout.
///
/// A ciphertext lifted from one vault fails authentication in any other.
pub fn associated_data(layer: &str, bundle_id: &Uuid, threshold: u8, total: u8) -> Vec<u8> {
    let mut aad = Vec::with_capacity(AAD_PREFIX.len() + layer.len() + 1 + 16 + 2);
    aad.extend_from_slice(AAD_PREFIX);
    aad.extend_from_slice(layer.as_bytes());
    aad.push(b'/');
    aad.extend_from_slice(bundle_id.as_bytes());
    aad.push(threshold);
    aad.push(total);
    aad
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_associated_data_distinguishes_inputs() {
        let id = Uuid::new_v4();
        let base = associated_data(layers::VAULT, &id, 2, 3);
        assert_ne!(base, associated_data(layers::ENVELOPE, &id, 2, 3));
        assert_ne!(base, associated_data(layers::VAULT, &Uuid::new_v4(), 2, 3));
        assert_ne!(base, associated_data(layers::VAULT, &id, 3, 3));
        assert_ne!(base, associated_data(layers::VAULT, &id, 2, 4));
    }
}
