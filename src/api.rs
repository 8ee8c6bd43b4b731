//! Fractured Key - Public API
//!
//! The two entry points a front end needs, plus the sealed single-file mode.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use secrecy::SecretString;

use crate::bundle::CredentialBundle;
use crate::config::EngineConfig;
use crate::crypto::{KdfParams, Salt};
use crate::error::FractureResult;
use crate::manager::{CarrierSpec, FragmentManager};
use crate::progress::{CancelToken, ProgressObserver};
use crate::sealed;
use crate::secure_fs;
use crate::vault::VaultDescriptor;

// ═══════════════════════════════════════════════════════════════════════════════
// VAULT SOURCE
// ═══════════════════════════════════════════════════════════════════════════════

/// How a caller identifies the vault to open
#[derive(Debug, Clone, Copy)]
pub enum VaultSource<'a> {
    /// A saved descriptor
    Descriptor(&'a VaultDescriptor),
    /// Bare KDF settings and layout, for callers that track them elsewhere
    Kdf {
        salt: &'a Salt,
        params: &'a KdfParams,
        threshold: u8,
        total: u8,
    },
}

// ═══════════════════════════════════════════════════════════════════════════════
// FRACTURED KEY API
// ═══════════════════════════════════════════════════════════════════════════════

/// Front-end facing API
///
/// ```rust,ignore
/// use fractured_key::api::{FracturedKeyApi, VaultSource};
///
/// let api = FracturedKeyApi::new(EngineConfig::default());
/// let descriptor = api.encrypt(&password, &bundle, 2, 3, &photos)?;
/// descriptor.save("vault.json".as_ref())?;
///
/// let source = VaultSource::Descriptor(&descriptor);
/// let bundle = api.decrypt(&password, source, &descriptor.carriers)?;
/// ```
pub struct FracturedKeyApi {
    manager: FragmentManager,
}

impl FracturedKeyApi {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            manager: FragmentManager::new(config),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.manager = self.manager.with_observer(observer);
        self
    }

    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.manager = self.manager.with_cancel_token(token);
        self
    }

    pub fn manager(&self) -> &FragmentManager {
        &self.manager
    }

    /// Hide `bundle` in `carrier_paths`, writing `<stem>_stego_<i>.png`
    /// next to each source image.
    pub fn encrypt(
        &self,
        password: &SecretString,
        bundle: &CredentialBundle,
        threshold: u8,
        total: u8,
        carrier_paths: &[PathBuf],
    ) -> FractureResult<VaultDescriptor> {
        let specs: Vec<CarrierSpec> = carrier_paths
            .iter()
            .enumerate()
            .map(|(i, path)| CarrierSpec::beside(path.clone(), i + 1))
            .collect();
        self.manager
            .encrypt_and_distribute(password, bundle, threshold, total, &specs)
    }

    /// Recover a bundle from whichever carriers are available
    pub fn decrypt(
        &self,
        password: &SecretString,
        source: VaultSource<'_>,
        carrier_paths: &[PathBuf],
    ) -> FractureResult<CredentialBundle> {
        match source {
            VaultSource::Descriptor(descriptor) => {
                self.manager.reconstruct_vault(password, descriptor, carrier_paths)
            }
            VaultSource::Kdf {
                salt,
                params,
                threshold,
                total,
            } => self
                .manager
                .decrypt_and_reconstruct(password, salt, params, threshold, total, carrier_paths),
        }
    }

    /// Password-only encryption into a single file
    pub fn seal_to_file(
        &self,
        password: &SecretString,
        bundle: &CredentialBundle,
        path: &Path,
    ) -> FractureResult<()> {
        let config = self.manager.config();
        let blob = sealed::seal(password, bundle, config.cipher, &config.kdf)?;
        secure_fs::write_atomic(path, &blob)
    }

    pub fn open_sealed_file(
        &self,
        password: &SecretString,
        path: &Path,
    ) -> FractureResult<CredentialBundle> {
        let blob = secure_fs::read_file(path)?;
        sealed::open(password, &blob)
    }
}

/// [`FracturedKeyApi::encrypt`] with the default configuration
pub fn encrypt(
    password: &SecretString,
    bundle: &CredentialBundle,
    threshold: u8,
    total: u8,
    carrier_paths: &[PathBuf],
) -> FractureResult<VaultDescriptor> {
    FracturedKeyApi::new(EngineConfig::default()).encrypt(
        password,
        bundle,
        threshold,
        total,
        carrier_paths,
    )
}

/// [`FracturedKeyApi::decrypt`] with the default configuration
pub fn decrypt(
    password: &SecretString,
    source: VaultSource<'_>,
    carrier_paths: &[PathBuf],
) -> FractureResult<CredentialBundle> {
    FracturedKeyApi::new(EngineConfig::default()).decrypt(password, source, carrier_paths)
}
