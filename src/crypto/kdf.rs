//! Argon2id KDF - master password to key material
//!
//! Parameters are fixed when a vault is created and must be replayed
//! verbatim on every later derivation. A mismatch is not detected here:
//! it yields a different key that fails authentication downstream.

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

use super::keys::{DerivedKey, KEY_LEN};
use crate::error::{FractureError, FractureResult};

/// Salt length used for new vaults
pub const SALT_LEN: usize = 16;

/// Argon2 refuses salts shorter than this
pub const MIN_SALT_LEN: usize = 8;

/// Upper bounds for parameters read back from disk (4 GiB of memory)
pub const MAX_MEMORY_COST_KIB: u32 = 4 * 1024 * 1024;
pub const MAX_TIME_COST: u32 = 64;
pub const MAX_PARALLELISM: u32 = 255;

/// Per-vault KDF salt. Not secret; persisted with the vault descriptor.
#[derive(Clone, PartialEq, Eq)]
pub struct Salt(Vec<u8>);

impl Salt {
    /// Fresh random salt for a new vault
    pub fn generate() -> Self {
        Self(super::keys::random_bytes(SALT_LEN).to_vec())
    }

    /// Salt read back from persisted metadata
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.0)
    }

    pub fn from_base64(encoded: &str) -> FractureResult<Self> {
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map(Self)
            .map_err(|e| FractureError::Serialization(format!("invalid salt encoding: {}", e)))
    }
}

impl std::fmt::Debug for Salt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Salt({})", self.to_base64())
    }
}

impl Serialize for Salt {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for Salt {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        Salt::from_base64(&encoded).map_err(serde::de::Error::custom)
    }
}

/// Argon2id cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Iterations (time cost)
    pub time_cost: u32,
    /// Memory in KiB
    pub memory_cost_kib: u32,
    /// Lanes
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            time_cost: 3,
            memory_cost_kib: 64 * 1024, // 64 MiB
            parallelism: 2,
        }
    }
}

impl KdfParams {
    pub fn new(time_cost: u32, memory_cost_kib: u32, parallelism: u32) -> Self {
        Self {
            time_cost,
            memory_cost_kib,
            parallelism,
        }
    }

    /// Settings for weak devices
    pub fn low_memory() -> Self {
        Self::new(4, 16 * 1024, 1)
    }

    /// Settings for strong devices
    pub fn high_security() -> Self {
        Self::new(4, 256 * 1024, 4)
    }

    /// Check the parameters against argon2's bounds and the engine maxima
    pub fn validate(&self) -> FractureResult<()> {
        self.to_argon2().map(|_| ())
    }

    fn to_argon2(&self) -> FractureResult<Params> {
        if self.memory_cost_kib > MAX_MEMORY_COST_KIB
            || self.time_cost > MAX_TIME_COST
            || self.parallelism > MAX_PARALLELISM
        {
            return Err(FractureError::KeyDerivation(format!(
                "Argon2 params out of range (t={}, m={} KiB, p={})",
                self.time_cost, self.memory_cost_kib, self.parallelism
            )));
        }
        Params::new(
            self.memory_cost_kib,
            self.time_cost,
            self.parallelism,
            Some(KEY_LEN),
        )
        .map_err(|e| FractureError::KeyDerivation(format!("invalid Argon2 params: {}", e)))
    }
}

/// Derive the vault key from the master password.
///
/// Deterministic: identical inputs give byte-identical keys. Only malformed
/// input is an error; derivation cannot know whether a password is right.
/// This is CPU- and memory-heavy and blocks the calling thread.
pub fn derive(
    password: &SecretString,
    salt: &Salt,
    params: &KdfParams,
) -> FractureResult<DerivedKey> {
    let secret = password.expose_secret();
    if secret.is_empty() {
        return Err(FractureError::KeyDerivation("password is empty".into()));
    }
    if salt.is_empty() {
        return Err(FractureError::KeyDerivation("salt is empty".into()));
    }
    if salt.len() < MIN_SALT_LEN {
        return Err(FractureError::KeyDerivation(format!(
            "salt must be at least {} bytes",
            MIN_SALT_LEN
        )));
    }

    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params.to_argon2()?);

    let mut output = [0u8; KEY_LEN];
    argon2
        .hash_password_into(secret.as_bytes(), salt.as_bytes(), &mut output)
        .map_err(|e| FractureError::KeyDerivation(format!("hashing failed: {}", e)))?;

    let key = DerivedKey::new(output);
    output.zeroize();
    Ok(key)
}
