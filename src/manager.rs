//! Fractured Key - Fragment Manager
//!
//! Orchestrates the two workflows:
//!
//! ```text
//! distribute:   Idle → Deriving → Encrypting → Splitting → Embedding → Done
//! reconstruct:  Idle → Extracting → Combining → Decrypting → Done
//! ```
//!
//! Either path can end in failure from any stage. Distribution embeds every
//! carrier in memory before touching the filesystem, so a carrier that is
//! too small or unreadable aborts the run with nothing written.
//! Reconstruction tolerates bad carriers as long as K good shares remain.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use secrecy::SecretString;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::bundle::CredentialBundle;
use crate::config::EngineConfig;
use crate::crypto::{self, associated_data, layers, Ciphertext, KdfParams, Salt, SymmetricKey};
use crate::error::{CarrierFailure, DistributionError, FractureError, FractureResult, RecoveryError};
use crate::fragment::Fragment;
use crate::progress::{CancelToken, NoopObserver, ProgressEvent, ProgressObserver, Stage};
use crate::sharing::{self, check_layout, Share};
use crate::stego::{output_format, Carrier, LsbCodec};
use crate::vault::{VaultDescriptor, DESCRIPTOR_VERSION};

const DISTRIBUTION_PATH: &[Stage] = &[
    Stage::Idle,
    Stage::Deriving,
    Stage::Encrypting,
    Stage::Splitting,
    Stage::Embedding,
    Stage::Done,
];

const RECONSTRUCTION_PATH: &[Stage] = &[
    Stage::Idle,
    Stage::Extracting,
    Stage::Combining,
    Stage::Decrypting,
    Stage::Done,
];

/// One carrier to produce: read `source`, write the stego image to `output`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CarrierSpec {
    pub source: PathBuf,
    pub output: PathBuf,
}

impl CarrierSpec {
    pub fn new(source: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
        }
    }

    /// `<dir>/<stem>_stego_<index>.png` next to the source
    pub fn beside(source: impl Into<PathBuf>, index: usize) -> Self {
        let source = source.into();
        let stem = source
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "carrier".into());
        let output = source.with_file_name(format!("{}_stego_{}.png", stem, index));
        Self { source, output }
    }
}

/// Stage tracker for one workflow run
struct Workflow<'a> {
    path: &'static [Stage],
    position: usize,
    observer: &'a dyn ProgressObserver,
}

impl<'a> Workflow<'a> {
    fn new(path: &'static [Stage], observer: &'a dyn ProgressObserver) -> Self {
        Self {
            path,
            position: 0,
            observer,
        }
    }

    fn stage(&self) -> Stage {
        self.path[self.position]
    }

    /// Move to `next`, which must directly follow the current stage
    fn advance(&mut self, next: Stage) -> FractureResult<()> {
        match self.path.get(self.position + 1) {
            Some(&expected) if expected == next => {
                debug!("{} -> {}", self.stage(), next);
                self.position += 1;
                self.observer.notify(ProgressEvent::Stage(next));
                Ok(())
            }
            _ => Err(FractureError::InvalidParameters(format!(
                "illegal transition {} -> {}",
                self.stage(),
                next
            ))),
        }
    }

    fn fail(&self, error: &FractureError) {
        warn!("workflow failed while {}: {}", self.stage(), error);
        self.observer.notify(ProgressEvent::Failed {
            stage: self.stage(),
            reason: error.to_string(),
        });
    }
}

/// Run `f` over `items` on a bounded pool of scoped threads.
///
/// Results come back in input order. A panicking task yields an error in
/// its slot instead of tearing down the caller.
fn run_parallel<T, R, F>(items: &[T], f: F) -> Vec<FractureResult<R>>
where
    T: Sync,
    R: Send,
    F: Fn(usize, &T) -> FractureResult<R> + Sync,
{
    let workers = thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
        .min(items.len())
        .max(1);
    let next = AtomicUsize::new(0);

    thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|_| {
                scope.spawn(|| {
                    let mut done = Vec::new();
                    loop {
                        let i = next.fetch_add(1, Ordering::Relaxed);
                        if i >= items.len() {
                            break;
                        }
                        done.push((i, f(i, &items[i])));
                    }
                    done
                })
            })
            .collect();

        let mut slots: Vec<Option<FractureResult<R>>> = (0..items.len()).map(|_| None).collect();
        for handle in handles {
            if let Ok(done) = handle.join() {
                for (i, result) in done {
                    slots[i] = Some(result);
                }
            }
        }

        slots
            .into_iter()
            .map(|slot| {
                slot.unwrap_or_else(|| {
                    Err(FractureError::Io(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "carrier worker panicked",
                    )))
                })
            })
            .collect()
    })
}

/// What a reconstruction must match
struct Expected {
    threshold: u8,
    total: u8,
    bundle_id: Option<Uuid>,
}

/// The engine's orchestrator
pub struct FragmentManager {
    config: EngineConfig,
    observer: Arc<dyn ProgressObserver>,
    cancel: CancelToken,
}

impl Default for FragmentManager {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl FragmentManager {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            observer: Arc::new(NoopObserver),
            cancel: CancelToken::new(),
        }
    }

    /// Report progress to `observer`
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Abort between stages once `token` is cancelled
    pub fn with_cancel_token(mut self, token: CancelToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn check_cancelled(&self) -> FractureResult<()> {
        if self.cancel.is_cancelled() {
            info!("operation cancelled");
            return Err(FractureError::Cancelled);
        }
        Ok(())
    }

    /// Largest fragment `path` can hold at the configured density
    pub fn carrier_capacity(&self, path: &Path) -> FractureResult<usize> {
        let carrier = Carrier::open(path)?;
        Ok(self.config.codec()?.payload_capacity(&carrier))
    }

    // ═══════════════════════════════════════════════════════════════════════
    // DISTRIBUTION
    // ═══════════════════════════════════════════════════════════════════════

    /// Encrypt `bundle` under `password` and spread it over `carriers`.
    ///
    /// Exactly `total` carriers are required; any `threshold` of the outputs
    /// plus the password recover the bundle. On failure no descriptor is
    /// returned and [`DistributionError::written`] names any output that
    /// already exists.
    pub fn encrypt_and_distribute(
        &self,
        password: &SecretString,
        bundle: &CredentialBundle,
        threshold: u8,
        total: u8,
        carriers: &[CarrierSpec],
    ) -> FractureResult<VaultDescriptor> {
        let mut flow = Workflow::new(DISTRIBUTION_PATH, self.observer.as_ref());
        let result = self.distribute(&mut flow, password, bundle, threshold, total, carriers);
        if let Err(e) = &result {
            flow.fail(e);
        }
        result
    }

    fn distribute(
        &self,
        flow: &mut Workflow<'_>,
        password: &SecretString,
        bundle: &CredentialBundle,
        threshold: u8,
        total: u8,
        carriers: &[CarrierSpec],
    ) -> FractureResult<VaultDescriptor> {
        self.config.validate()?;
        check_layout(threshold, total)?;
        let codec = self.config.codec()?;
        let cipher = self.config.cipher;

        if carriers.len() != total as usize {
            return Err(FractureError::InvalidParameters(format!(
                "{} carriers supplied for N={}",
                carriers.len(),
                total
            )));
        }
        let mut outputs = HashSet::new();
        for spec in carriers {
            output_format(&spec.output)?;
            if !outputs.insert(spec.output.as_path()) {
                return Err(FractureError::InvalidParameters(format!(
                    "output {} is used twice",
                    spec.output.display()
                )));
            }
        }

        info!(
            "distributing {} byte bundle as {}-of-{} with {}",
            bundle.len(),
            threshold,
            total,
            cipher.name()
        );

        self.check_cancelled()?;
        flow.advance(Stage::Deriving)?;
        let salt = Salt::generate();
        let key = crypto::derive(password, &salt, &self.config.kdf)?;
        if let Err(e) = self.check_cancelled() {
            drop(key);
            return Err(e);
        }

        flow.advance(Stage::Encrypting)?;
        let bundle_id = Uuid::new_v4();
        let inner = crypto::encrypt(
            cipher,
            &key,
            bundle.as_bytes(),
            &associated_data(layers::VAULT, &bundle_id, threshold, total),
        )?;
        drop(key);

        let data_key = SymmetricKey::generate();
        let envelope = crypto::encrypt(
            cipher,
            &data_key,
            &inner.to_bytes(),
            &associated_data(layers::ENVELOPE, &bundle_id, threshold, total),
        )?;

        self.check_cancelled()?;
        flow.advance(Stage::Splitting)?;
        let shares = sharing::split(data_key.expose(), threshold, total, bundle_id)?;
        drop(data_key);

        let payloads = shares
            .into_iter()
            .map(|share| Fragment::new(share, &envelope).to_bytes().map(Zeroizing::new))
            .collect::<FractureResult<Vec<_>>>()?;
        debug!("fragment size {} bytes", payloads.first().map_or(0, |p| p.len()));

        self.check_cancelled()?;
        flow.advance(Stage::Embedding)?;
        let stego = self.embed_all(&codec, carriers, &payloads)?;

        self.check_cancelled()?;
        let written = self.write_all(carriers, &stego)?;

        flow.advance(Stage::Done)?;
        info!("vault {} distributed over {} carriers", bundle_id, written.len());

        Ok(VaultDescriptor {
            format_version: DESCRIPTOR_VERSION,
            engine_version: crate::VERSION.into(),
            bundle_id,
            threshold,
            total,
            cipher,
            kdf: self.config.kdf,
            salt,
            created_at: Utc::now(),
            carriers: written,
        })
    }

    /// Load and embed every carrier in memory. Nothing is written.
    fn embed_all(
        &self,
        codec: &LsbCodec,
        carriers: &[CarrierSpec],
        payloads: &[Zeroizing<Vec<u8>>],
    ) -> FractureResult<Vec<Carrier>> {
        let total = carriers.len();
        let results = run_parallel(carriers, |i, spec| {
            let result = Carrier::open(&spec.source).and_then(|c| codec.embed(c, &payloads[i]));
            if let Err(e) = &result {
                warn!("carrier #{} ({}) rejected: {}", i + 1, spec.source.display(), e);
                self.observer.notify(ProgressEvent::Carrier {
                    index: i,
                    total,
                    path: spec.source.clone(),
                    ok: false,
                });
            }
            result
        });

        let mut embedded = Vec::with_capacity(total);
        let mut failed_carriers = Vec::new();
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(carrier) => embedded.push(carrier),
                Err(error) => failed_carriers.push(CarrierFailure {
                    index: i,
                    path: carriers[i].source.clone(),
                    error,
                }),
            }
        }

        if !failed_carriers.is_empty() {
            return Err(DistributionError {
                stage: Stage::Embedding,
                failed_carriers,
                written: Vec::new(),
            }
            .into());
        }
        Ok(embedded)
    }

    /// Write every embedded carrier to its output
    fn write_all(
        &self,
        carriers: &[CarrierSpec],
        stego: &[Carrier],
    ) -> FractureResult<Vec<PathBuf>> {
        let total = carriers.len();
        let results = run_parallel(carriers, |i, spec| {
            let result = stego[i].save(&spec.output);
            self.observer.notify(ProgressEvent::Carrier {
                index: i,
                total,
                path: spec.output.clone(),
                ok: result.is_ok(),
            });
            result
        });

        let mut written = Vec::with_capacity(total);
        let mut failed_carriers = Vec::new();
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(()) => written.push(carriers[i].output.clone()),
                Err(error) => failed_carriers.push(CarrierFailure {
                    index: i,
                    path: carriers[i].output.clone(),
                    error,
                }),
            }
        }

        if !failed_carriers.is_empty() {
            return Err(DistributionError {
                stage: Stage::Embedding,
                failed_carriers,
                written,
            }
            .into());
        }
        Ok(written)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // RECONSTRUCTION
    // ═══════════════════════════════════════════════════════════════════════

    /// Recover a bundle from explicit KDF settings and layout.
    ///
    /// Unreadable or foreign carriers are skipped as long as `threshold`
    /// good shares remain. Every failure after the shares are combined is
    /// reported as [`RecoveryError::Unrecoverable`].
    pub fn decrypt_and_reconstruct(
        &self,
        password: &SecretString,
        salt: &Salt,
        params: &KdfParams,
        threshold: u8,
        total: u8,
        carriers: &[PathBuf],
    ) -> FractureResult<CredentialBundle> {
        let expected = Expected {
            threshold,
            total,
            bundle_id: None,
        };
        self.reconstruct(password, salt, params, &expected, carriers)
    }

    /// Recover a bundle described by `descriptor`.
    ///
    /// Carriers from other vaults are skipped rather than rejected.
    pub fn reconstruct_vault(
        &self,
        password: &SecretString,
        descriptor: &VaultDescriptor,
        carriers: &[PathBuf],
    ) -> FractureResult<CredentialBundle> {
        descriptor.validate()?;
        let expected = Expected {
            threshold: descriptor.threshold,
            total: descriptor.total,
            bundle_id: Some(descriptor.bundle_id),
        };
        self.reconstruct(password, &descriptor.salt, &descriptor.kdf, &expected, carriers)
    }

    fn reconstruct(
        &self,
        password: &SecretString,
        salt: &Salt,
        params: &KdfParams,
        expected: &Expected,
        carriers: &[PathBuf],
    ) -> FractureResult<CredentialBundle> {
        let mut flow = Workflow::new(RECONSTRUCTION_PATH, self.observer.as_ref());
        let result = self.recover(&mut flow, password, salt, params, expected, carriers);
        if let Err(e) = &result {
            flow.fail(e);
        }
        result
    }

    fn recover(
        &self,
        flow: &mut Workflow<'_>,
        password: &SecretString,
        salt: &Salt,
        params: &KdfParams,
        expected: &Expected,
        carriers: &[PathBuf],
    ) -> FractureResult<CredentialBundle> {
        check_layout(expected.threshold, expected.total)?;
        let codec = self.config.codec()?;

        if carriers.len() < expected.threshold as usize {
            return Err(RecoveryError::InsufficientShares {
                needed: expected.threshold,
                available: carriers.len(),
                failed_carriers: Vec::new(),
            }
            .into());
        }

        self.check_cancelled()?;
        flow.advance(Stage::Extracting)?;
        let (fragments, failed_carriers) = self.extract_all(&codec, expected, carriers);

        self.check_cancelled()?;
        flow.advance(Stage::Combining)?;
        let fragments = dedup_fragments(fragments)?;
        if fragments.len() < expected.threshold as usize {
            return Err(RecoveryError::InsufficientShares {
                needed: expected.threshold,
                available: fragments.len(),
                failed_carriers,
            }
            .into());
        }
        for failure in &failed_carriers {
            debug!("recovering without {}", failure);
        }

        let reference = &fragments[0];
        if let Some(other) = fragments.iter().find(|f| !reference.is_compatible_with(f)) {
            let reason = if other.share.bundle_id != reference.share.bundle_id {
                "carriers come from different vaults"
            } else {
                "carriers disagree on the sealed envelope"
            };
            return Err(RecoveryError::InconsistentShares(reason.into()).into());
        }

        let bundle_id = reference.share.bundle_id;
        let cipher = reference.cipher;
        let envelope = reference.envelope().map_err(|_| RecoveryError::Unrecoverable)?;

        let shares: Vec<Share> = fragments.iter().map(|f| f.share.clone()).collect();
        let secret = sharing::combine(&shares).map_err(|e| match e {
            FractureError::InsufficientShares { needed, available } => {
                RecoveryError::InsufficientShares {
                    needed,
                    available,
                    failed_carriers: Vec::new(),
                }
            }
            FractureError::InconsistentShares(reason) => RecoveryError::InconsistentShares(reason),
            _ => RecoveryError::Unrecoverable,
        })?;
        let data_key = SymmetricKey::from_slice(&secret).map_err(|_| RecoveryError::Unrecoverable)?;
        drop(secret);

        self.check_cancelled()?;
        flow.advance(Stage::Decrypting)?;
        let (k, n) = (expected.threshold, expected.total);
        let inner_bytes = crypto::decrypt(
            &data_key,
            &envelope,
            &associated_data(layers::ENVELOPE, &bundle_id, k, n),
        )
        .map_err(|_| RecoveryError::Unrecoverable)?;
        drop(data_key);
        let inner = Ciphertext::from_bytes(cipher, &inner_bytes)
            .map_err(|_| RecoveryError::Unrecoverable)?;

        let key = crypto::derive(password, salt, params)?;
        if let Err(e) = self.check_cancelled() {
            drop(key);
            return Err(e);
        }
        let plaintext = crypto::decrypt(
            &key,
            &inner,
            &associated_data(layers::VAULT, &bundle_id, k, n),
        )
        .map_err(|_| RecoveryError::Unrecoverable)?;
        drop(key);

        flow.advance(Stage::Done)?;
        info!("vault {} reconstructed from {} shares", bundle_id, shares.len());
        Ok(CredentialBundle::from(plaintext))
    }

    /// Pull a fragment out of every carrier, keeping per-carrier failures
    fn extract_all(
        &self,
        codec: &LsbCodec,
        expected: &Expected,
        carriers: &[PathBuf],
    ) -> (Vec<Fragment>, Vec<CarrierFailure>) {
        let total = carriers.len();
        let results = run_parallel(carriers, |i, path| {
            let result = Carrier::open(path)
                .and_then(|c| codec.extract(&c))
                .and_then(|bytes| Fragment::from_bytes(&bytes))
                .and_then(|fragment| check_expected(&fragment, expected).map(|_| fragment));
            self.observer.notify(ProgressEvent::Carrier {
                index: i,
                total,
                path: path.clone(),
                ok: result.is_ok(),
            });
            result
        });

        let mut fragments = Vec::with_capacity(total);
        let mut failed = Vec::new();
        for (i, result) in results.into_iter().enumerate() {
            match result {
                Ok(fragment) => fragments.push(fragment),
                Err(error) => {
                    warn!("skipping carrier #{} ({}): {}", i + 1, carriers[i].display(), error);
                    failed.push(CarrierFailure {
                        index: i,
                        path: carriers[i].clone(),
                        error,
                    });
                }
            }
        }
        (fragments, failed)
    }
}

/// A fragment that does not match the requested vault is foreign, not fatal
fn check_expected(fragment: &Fragment, expected: &Expected) -> FractureResult<()> {
    let share = &fragment.share;
    if share.threshold != expected.threshold || share.total != expected.total {
        return Err(FractureError::InconsistentShares(format!(
            "carrier holds a {}-of-{} share, expected {}-of-{}",
            share.threshold, share.total, expected.threshold, expected.total
        )));
    }
    if let Some(id) = expected.bundle_id {
        if share.bundle_id != id {
            return Err(FractureError::InconsistentShares(
                "carrier belongs to another vault".into(),
            ));
        }
    }
    Ok(())
}

/// Drop repeated carriers; two different shares with one index is an error
fn dedup_fragments(fragments: Vec<Fragment>) -> Result<Vec<Fragment>, RecoveryError> {
    let mut unique: Vec<Fragment> = Vec::with_capacity(fragments.len());
    for fragment in fragments {
        match unique.iter().find(|f| f.share.index == fragment.share.index) {
            Some(existing) if *existing == fragment => {
                warn!("share #{} supplied more than once; ignoring the copy", fragment.share.index);
            }
            Some(_) => {
                return Err(RecoveryError::InconsistentShares(format!(
                    "two different shares claim index {}",
                    fragment.share.index
                )));
            }
            None => unique.push(fragment),
        }
    }
    Ok(unique)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::AeadCipher;
    use crate::progress::ChannelObserver;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::fs;
    use tempfile::{tempdir, TempDir};

    fn fast_config() -> EngineConfig {
        EngineConfig {
            kdf: KdfParams::new(1, 64, 1),
            ..Default::default()
        }
    }

    fn password(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    fn write_carrier(dir: &Path, name: &str, w: u32, h: u32) -> PathBuf {
        let path = dir.join(name);
        RgbImage::from_fn(w, h, |x, y| Rgb([(x * 5) as u8, (y * 9) as u8, (x + y) as u8]))
            .save(&path)
            .unwrap();
        path
    }

    fn setup(n: usize) -> (TempDir, Vec<CarrierSpec>) {
        let dir = tempdir().unwrap();
        let specs = (0..n)
            .map(|i| {
                let src = write_carrier(dir.path(), &format!("photo{}.png", i), 64, 64);
                CarrierSpec::beside(src, i + 1)
            })
            .collect();
        (dir, specs)
    }

    fn outputs(specs: &[CarrierSpec]) -> Vec<PathBuf> {
        specs.iter().map(|s| s.output.clone()).collect()
    }

    #[test]
    fn test_beside_naming() {
        let spec = CarrierSpec::beside("/tmp/pics/holiday.jpg", 2);
        assert_eq!(spec.output, PathBuf::from("/tmp/pics/holiday_stego_2.png"));
    }

    #[test]
    fn test_roundtrip_k3_n5_any_subset() {
        let (_dir, specs) = setup(5);
        let manager = FragmentManager::new(fast_config());
        let bundle = CredentialBundle::from_bytes(b"site=mail user=alice pw=hunter2");

        let descriptor = manager
            .encrypt_and_distribute(&password("master"), &bundle, 3, 5, &specs)
            .unwrap();
        assert_eq!(descriptor.carriers, outputs(&specs));
        assert!(specs.iter().all(|s| s.output.exists()));

        let out = outputs(&specs);
        let subset = vec![out[1].clone(), out[3].clone(), out[4].clone()];
        let recovered = manager
            .decrypt_and_reconstruct(
                &password("master"),
                &descriptor.salt,
                &descriptor.kdf,
                3,
                5,
                &subset,
            )
            .unwrap();
        assert_eq!(recovered.as_bytes(), bundle.as_bytes());

        let recovered = manager
            .reconstruct_vault(&password("master"), &descriptor, &out[..3])
            .unwrap();
        assert_eq!(recovered, bundle);
    }

    #[test]
    fn test_small_fourth_carrier_aborts_with_nothing_written() {
        let dir = tempdir().unwrap();
        let specs: Vec<CarrierSpec> = (0..5)
            .map(|i| {
                let size = if i == 3 { 8 } else { 64 };
                let source = write_carrier(dir.path(), &format!("c{}.png", i), size, size);
                CarrierSpec::beside(source, i + 1)
            })
            .collect();
        let manager = FragmentManager::new(fast_config());

        let err = manager
            .encrypt_and_distribute(
                &password("pw"),
                &CredentialBundle::from_bytes(b"data"),
                3,
                5,
                &specs,
            )
            .unwrap_err();

        match err {
            FractureError::Distribution(e) => {
                assert_eq!(e.stage, Stage::Embedding);
                assert!(e.written.is_empty());
                assert_eq!(e.failed_carriers.len(), 1);
                assert_eq!(e.failed_carriers[0].index, 3);
                assert!(matches!(
                    e.failed_carriers[0].error,
                    FractureError::CapacityExceeded { .. }
                ));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(specs.iter().all(|s| !s.output.exists()));
    }

    #[test]
    fn test_write_failure_reports_outputs_already_written() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"a file where a directory should be").unwrap();

        let specs: Vec<CarrierSpec> = (0..3)
            .map(|i| {
                let source = write_carrier(dir.path(), &format!("s{}.png", i), 64, 64);
                let output = if i == 1 {
                    blocker.join("o1.png")
                } else {
                    dir.path().join(format!("o{}.png", i))
                };
                CarrierSpec::new(source, output)
            })
            .collect();
        let manager = FragmentManager::new(fast_config());
        let bundle = CredentialBundle::from_bytes(b"data");

        let result = manager.encrypt_and_distribute(&password("pw"), &bundle, 2, 3, &specs);

        match result {
            Err(FractureError::Distribution(e)) => {
                assert_eq!(e.stage, Stage::Embedding);
                let failed: Vec<usize> = e.failed_carriers.iter().map(|f| f.index).collect();
                assert_eq!(failed, vec![1]);
                assert_eq!(e.failed_carriers[0].path, specs[1].output);
                assert_eq!(e.written, vec![specs[0].output.clone(), specs[2].output.clone()]);
            }
            Err(other) => panic!("unexpected error {:?}", other),
            Ok(descriptor) => panic!("descriptor returned after a failed write: {:?}", descriptor),
        }
        assert!(specs[0].output.exists());
        assert!(specs[2].output.exists());
        assert!(!specs[1].output.exists());
    }

    #[test]
    fn test_wrong_password_is_unrecoverable() {
        let (_dir, specs) = setup(3);
        let manager = FragmentManager::new(fast_config());
        let descriptor = manager
            .encrypt_and_distribute(
                &password("right"),
                &CredentialBundle::from_bytes(b"x"),
                2,
                3,
                &specs,
            )
            .unwrap();

        let err = manager
            .reconstruct_vault(&password("wrong"), &descriptor, &descriptor.carriers)
            .unwrap_err();
        assert!(matches!(err, FractureError::Recovery(RecoveryError::Unrecoverable)));

        // Wrong KDF params look exactly the same
        let err = manager
            .decrypt_and_reconstruct(
                &password("right"),
                &descriptor.salt,
                &KdfParams::new(2, 64, 1),
                2,
                3,
                &descriptor.carriers,
            )
            .unwrap_err();
        assert!(matches!(err, FractureError::Recovery(RecoveryError::Unrecoverable)));
    }

    #[test]
    fn test_insufficient_carriers_reported_precisely() {
        let (dir, specs) = setup(5);
        let manager = FragmentManager::new(fast_config());
        let descriptor = manager
            .encrypt_and_distribute(
                &password("pw"),
                &CredentialBundle::from_bytes(b"x"),
                3,
                5,
                &specs,
            )
            .unwrap();

        // Two real carriers plus an untouched image
        let plain = write_carrier(dir.path(), "plain.png", 64, 64);
        let carriers = vec![
            descriptor.carriers[0].clone(),
            plain.clone(),
            descriptor.carriers[2].clone(),
        ];
        let err = manager.reconstruct_vault(&password("pw"), &descriptor, &carriers).unwrap_err();

        match err {
            FractureError::Recovery(RecoveryError::InsufficientShares {
                needed,
                available,
                failed_carriers,
            }) => {
                assert_eq!((needed, available), (3, 2));
                assert_eq!(failed_carriers.len(), 1);
                assert_eq!(failed_carriers[0].path, plain);
                assert!(matches!(failed_carriers[0].error, FractureError::MissingPayload));
            }
            other => panic!("unexpected error {:?}", other),
        }

        let err = manager
            .reconstruct_vault(&password("pw"), &descriptor, &descriptor.carriers[..1])
            .unwrap_err();
        assert!(matches!(
            err,
            FractureError::Recovery(RecoveryError::InsufficientShares {
                needed: 3,
                available: 1,
                ..
            })
        ));
    }

    #[test]
    fn test_damaged_carrier_is_skipped() {
        let (_dir, specs) = setup(3);
        let manager = FragmentManager::new(fast_config());
        let bundle = CredentialBundle::from_bytes(b"survives one bad carrier");
        let descriptor = manager
            .encrypt_and_distribute(&password("pw"), &bundle, 2, 3, &specs)
            .unwrap();

        fs::write(&descriptor.carriers[0], b"not an image any more").unwrap();
        let recovered = manager
            .reconstruct_vault(&password("pw"), &descriptor, &descriptor.carriers)
            .unwrap();
        assert_eq!(recovered, bundle);
    }

    #[test]
    fn test_duplicate_carrier_ignored() {
        let (_dir, specs) = setup(3);
        let manager = FragmentManager::new(fast_config());
        let descriptor = manager
            .encrypt_and_distribute(
                &password("pw"),
                &CredentialBundle::from_bytes(b"dup"),
                2,
                3,
                &specs,
            )
            .unwrap();

        let same = vec![descriptor.carriers[1].clone(), descriptor.carriers[1].clone()];
        let err = manager.reconstruct_vault(&password("pw"), &descriptor, &same).unwrap_err();
        assert!(matches!(
            err,
            FractureError::Recovery(RecoveryError::InsufficientShares {
                needed: 2,
                available: 1,
                ..
            })
        ));

        let with_copy = vec![
            descriptor.carriers[1].clone(),
            descriptor.carriers[1].clone(),
            descriptor.carriers[2].clone(),
        ];
        manager.reconstruct_vault(&password("pw"), &descriptor, &with_copy).unwrap();
    }

    #[test]
    fn test_mixed_vaults_are_inconsistent() {
        let (_dir_a, specs_a) = setup(3);
        let (_dir_b, specs_b) = setup(3);
        let manager = FragmentManager::new(fast_config());
        let a = manager
            .encrypt_and_distribute(
                &password("pw"),
                &CredentialBundle::from_bytes(b"a"),
                2,
                3,
                &specs_a,
            )
            .unwrap();
        let b = manager
            .encrypt_and_distribute(
                &password("pw"),
                &CredentialBundle::from_bytes(b"b"),
                2,
                3,
                &specs_b,
            )
            .unwrap();

        let mixed = vec![a.carriers[0].clone(), b.carriers[1].clone()];
        let err = manager
            .decrypt_and_reconstruct(&password("pw"), &a.salt, &a.kdf, 2, 3, &mixed)
            .unwrap_err();
        assert!(matches!(err, FractureError::Recovery(RecoveryError::InconsistentShares(_))));

        // With the descriptor the foreign carrier is just skipped
        let mixed = vec![a.carriers[0].clone(), b.carriers[1].clone(), a.carriers[2].clone()];
        let recovered = manager.reconstruct_vault(&password("pw"), &a, &mixed).unwrap();
        assert_eq!(recovered.as_bytes(), b"a");
    }

    #[test]
    fn test_parameter_validation() {
        let (_dir, specs) = setup(3);
        let manager = FragmentManager::new(fast_config());
        let bundle = CredentialBundle::from_bytes(b"x");

        assert!(matches!(
            manager.encrypt_and_distribute(&password("pw"), &bundle, 2, 4, &specs),
            Err(FractureError::InvalidParameters(_))
        ));
        assert!(matches!(
            manager.encrypt_and_distribute(&password("pw"), &bundle, 4, 3, &specs),
            Err(FractureError::InvalidParameters(_))
        ));

        let mut lossy = specs.clone();
        lossy[0].output = lossy[0].output.with_extension("jpg");
        assert!(matches!(
            manager.encrypt_and_distribute(&password("pw"), &bundle, 2, 3, &lossy),
            Err(FractureError::LossyFormat(_))
        ));

        let mut twice = specs.clone();
        twice[1].output = twice[0].output.clone();
        assert!(matches!(
            manager.encrypt_and_distribute(&password("pw"), &bundle, 2, 3, &twice),
            Err(FractureError::InvalidParameters(_))
        ));

        assert!(matches!(
            manager.encrypt_and_distribute(&password(""), &bundle, 2, 3, &specs),
            Err(FractureError::KeyDerivation(_))
        ));
        assert!(specs.iter().all(|s| !s.output.exists()));
    }

    #[test]
    fn test_cancelled_before_start() {
        let (_dir, specs) = setup(3);
        let token = CancelToken::new();
        token.cancel();
        let manager = FragmentManager::new(fast_config()).with_cancel_token(token);

        let err = manager
            .encrypt_and_distribute(
                &password("pw"),
                &CredentialBundle::from_bytes(b"x"),
                2,
                3,
                &specs,
            )
            .unwrap_err();
        assert!(matches!(err, FractureError::Cancelled));
        assert!(specs.iter().all(|s| !s.output.exists()));
    }

    #[test]
    fn test_cancel_during_derivation_stops_before_cipher() {
        let (_dir, specs) = setup(3);
        let token = CancelToken::new();
        let trigger = token.clone();
        let (observer, rx) = ChannelObserver::unbounded();

        // Cancel as soon as derivation starts
        let cancel_on_derive = move |event: ProgressEvent| {
            if event == ProgressEvent::Stage(Stage::Deriving) {
                trigger.cancel();
            }
            observer.notify(event);
        };
        let manager = FragmentManager::new(fast_config())
            .with_cancel_token(token)
            .with_observer(Arc::new(cancel_on_derive));

        let err = manager
            .encrypt_and_distribute(
                &password("pw"),
                &CredentialBundle::from_bytes(b"x"),
                2,
                3,
                &specs,
            )
            .unwrap_err();
        assert!(matches!(err, FractureError::Cancelled));

        let events: Vec<_> = rx.try_iter().collect();
        assert!(!events.contains(&ProgressEvent::Stage(Stage::Encrypting)));
        assert!(events.contains(&ProgressEvent::Failed {
            stage: Stage::Deriving,
            reason: "Operation cancelled".into(),
        }));
    }

    #[test]
    fn test_observer_sees_every_stage() {
        let (_dir, specs) = setup(3);
        let (observer, rx) = ChannelObserver::unbounded();
        let manager = FragmentManager::new(fast_config()).with_observer(Arc::new(observer));

        let descriptor = manager
            .encrypt_and_distribute(
                &password("pw"),
                &CredentialBundle::from_bytes(b"x"),
                2,
                3,
                &specs,
            )
            .unwrap();
        let stages: Vec<Stage> = rx
            .try_iter()
            .filter_map(|e| match e {
                ProgressEvent::Stage(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(stages, DISTRIBUTION_PATH[1..].to_vec());

        manager
            .reconstruct_vault(&password("pw"), &descriptor, &descriptor.carriers)
            .unwrap();
        let events: Vec<ProgressEvent> = rx.try_iter().collect();
        let carriers_ok = events
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Carrier { ok: true, .. }))
            .count();
        assert_eq!(carriers_ok, 3);
        assert_eq!(events.last(), Some(&ProgressEvent::Stage(Stage::Done)));
    }

    #[test]
    fn test_illegal_transition_rejected() {
        let observer = NoopObserver;
        let mut flow = Workflow::new(DISTRIBUTION_PATH, &observer);
        assert!(flow.advance(Stage::Encrypting).is_err());
        flow.advance(Stage::Deriving).unwrap();
        assert!(flow.advance(Stage::Deriving).is_err());
        assert_eq!(flow.stage(), Stage::Deriving);
    }

    #[test]
    fn test_run_parallel_keeps_order() {
        let items: Vec<usize> = (0..40).collect();
        let results = run_parallel(&items, |i, &v| {
            if v == 7 {
                Err(FractureError::MissingPayload)
            } else {
                Ok(i * 10)
            }
        });
        assert_eq!(results.len(), 40);
        assert!(results[7].is_err());
        assert_eq!(*results[39].as_ref().unwrap(), 390);
    }

    #[test]
    fn test_denser_embedding_roundtrip() {
        let (_dir, specs) = setup(4);
        let config = EngineConfig {
            lsb_bits: 2,
            cipher: AeadCipher::Aes256Gcm,
            ..fast_config()
        };
        let manager = FragmentManager::new(config);
        let bundle = CredentialBundle::from_bytes(&[0xAB; 600]);

        let descriptor = manager
            .encrypt_and_distribute(&password("pw"), &bundle, 4, 4, &specs)
            .unwrap();
        assert_eq!(descriptor.cipher, AeadCipher::Aes256Gcm);
        let recovered = manager
            .reconstruct_vault(&password("pw"), &descriptor, &descriptor.carriers)
            .unwrap();
        assert_eq!(recovered, bundle);
    }
}
