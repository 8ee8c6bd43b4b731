//! Fractured Key - Vault Descriptor
//!
//! Everything needed to reopen a distribution except the password and the
//! carriers themselves. Nothing here is secret. Carrier paths are recorded
//! for convenience only; each carrier is self-describing and the files are
//! managed by the caller.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::crypto::{AeadCipher, KdfParams, Salt};
use crate::error::{FractureError, FractureResult};
use crate::secure_fs;
use crate::sharing::check_layout;

/// Descriptor format understood by this build
pub const DESCRIPTOR_VERSION: u32 = 1;

/// Persisted vault metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VaultDescriptor {
    /// Descriptor format version
    pub format_version: u32,
    /// Engine version that wrote the descriptor
    pub engine_version: String,
    /// Distribution id, also bound into every ciphertext
    pub bundle_id: Uuid,
    /// Shares needed to recover (K)
    pub threshold: u8,
    /// Shares distributed (N)
    pub total: u8,
    /// Cipher for both envelope layers
    pub cipher: AeadCipher,
    /// Argon2id parameters used at creation
    pub kdf: KdfParams,
    /// KDF salt (base64 in JSON)
    pub salt: Salt,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Where the carriers were written, in share order
    #[serde(default)]
    pub carriers: Vec<PathBuf>,
}

impl VaultDescriptor {
    /// Check internal consistency
    pub fn validate(&self) -> FractureResult<()> {
        if self.format_version != DESCRIPTOR_VERSION {
            return Err(FractureError::UnsupportedVersion(
                u8::try_from(self.format_version).unwrap_or(u8::MAX),
            ));
        }
        check_layout(self.threshold, self.total)?;
        self.kdf.validate()?;

        if self.salt.is_empty() {
            return Err(FractureError::InvalidParameters("descriptor has an empty salt".into()));
        }
        if !self.carriers.is_empty() && self.carriers.len() != self.total as usize {
            return Err(FractureError::InvalidParameters(format!(
                "descriptor lists {} carriers for N={}",
                self.carriers.len(),
                self.total
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> FractureResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> FractureResult<Self> {
        let descriptor: Self = serde_json::from_str(json)?;
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Write as JSON, atomically
    pub fn save(&self, path: &Path) -> FractureResult<()> {
        secure_fs::write_atomic(path, self.to_json()?.as_bytes())
    }

    pub fn load(path: &Path) -> FractureResult<Self> {
        let data = secure_fs::read_file(path)?;
        let json = std::str::from_utf8(&data)
            .map_err(|e| FractureError::Serialization(format!("descriptor is not UTF-8: {}", e)))?;
        Self::from_json(json)
    }
}
