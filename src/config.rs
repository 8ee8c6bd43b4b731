//! Fractured Key - Engine Configuration
//!
//! Passed explicitly into [`crate::FragmentManager`]; there is no global
//! configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crypto::{AeadCipher, KdfParams};
use crate::error::{FractureError, FractureResult};
use crate::secure_fs;
use crate::stego::{LsbCodec, MAX_BITS_PER_CHANNEL};

/// Engine settings used when creating a vault
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Argon2id cost for new vaults
    pub kdf: KdfParams,
    /// AEAD for both envelope layers
    pub cipher: AeadCipher,
    /// LSB density (bits hidden per colour channel)
    pub lsb_bits: u8,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            cipher: AeadCipher::default(),
            lsb_bits: 1,
        }
    }
}

impl EngineConfig {
    /// For weak devices
    pub fn low_memory() -> Self {
        Self {
            kdf: KdfParams::low_memory(),
            ..Default::default()
        }
    }

    /// For strong devices
    pub fn high_security() -> Self {
        Self {
            kdf: KdfParams::high_security(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> FractureResult<()> {
        self.kdf.validate()?;
        if !(1..=MAX_BITS_PER_CHANNEL).contains(&self.lsb_bits) {
            return Err(FractureError::InvalidParameters(format!(
                "lsb_bits must be 1..={}, got {}",
                MAX_BITS_PER_CHANNEL, self.lsb_bits
            )));
        }
        Ok(())
    }

    /// Codec for the configured density
    pub fn codec(&self) -> FractureResult<LsbCodec> {
        LsbCodec::new(self.lsb_bits)
    }

    /// Load and validate a JSON config file. Missing keys take defaults.
    pub fn load(path: &Path) -> FractureResult<Self> {
        let data = secure_fs::read_file(path)?;
        let config: Self = serde_json::from_slice(&data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> FractureResult<()> {
        let json = serde_json::to_vec_pretty(self)?;
        secure_fs::write_atomic(path, &json)
    }
}
