//! Fractured Key - Key Material
//!
//! Zeroizing key wrapper and CSPRNG helpers. Every nonce, salt and data
//! key is drawn fresh from the operating system per call.

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{FractureError, FractureResult};

/// Key length for AES-256 / XChaCha20
pub const KEY_LEN: usize = 32;

/// Nonce length for AES-GCM
pub const NONCE_LEN: usize = 12;

/// Nonce length for XChaCha20
pub const XCHACHA_NONCE_LEN: usize = 24;

/// Authentication tag length (both ciphers)
pub const TAG_LEN: usize = 16;

/// 256-bit symmetric key, wiped on drop
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey {
    bytes: [u8; KEY_LEN],
}

/// Key produced by the password KDF
pub type DerivedKey = SymmetricKey;

impl SymmetricKey {
    /// Create a key from raw bytes
    pub fn new(bytes: [u8; KEY_LEN]) -> Self {
        Self { bytes }
    }

    /// Rebuild a key from a recombined secret
    pub fn from_slice(bytes: &[u8]) -> FractureResult<Self> {
        if bytes.len() != KEY_LEN {
            return Err(FractureError::InvalidParameters(format!(
                "key must be {} bytes, got {}",
                KEY_LEN,
                bytes.len()
            )));
        }
        let mut key = [0u8; KEY_LEN];
        key.copy_from_slice(bytes);
        let out = Self::new(key);
        key.zeroize();
        Ok(out)
    }

    /// Generate a random key
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        let key = Self::new(bytes);
        bytes.zeroize();
        key
    }

    /// Expose the key bytes (use with caution)
    pub fn expose(&self) -> &[u8; KEY_LEN] {
        &self.bytes
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

/// Fill a buffer of `len` bytes from the OS CSPRNG
pub fn random_bytes(len: usize) -> Zeroizing<Vec<u8>> {
    let mut buf = Zeroizing::new(vec![0u8; len]);
    OsRng.fill_bytes(&mut buf);
    buf
}

/// Generate a random nonce for AES-GCM
pub(crate) fn generate_nonce() -> [u8; NONCE_LEN] {
    let mut nonce = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Generate a random nonce for XChaCha20
pub(crate) fn generate_xchacha_nonce() -> [u8; XCHACHA_NONCE_LEN] {
    let mut nonce = [0u8; XCHACHA_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}
