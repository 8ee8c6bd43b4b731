//! Fractured Key - Error Types

use std::path::PathBuf;
use thiserror::Error;

use crate::progress::Stage;

/// Result type for engine operations
pub type FractureResult<T> = Result<T, FractureError>;

/// Engine error types
#[derive(Error, Debug)]
pub enum FractureError {
    // ═══════════════════════════════════════════════════════════════
    // CRYPTO ERRORS
    // ═══════════════════════════════════════════════════════════════

    /// Malformed KDF input (empty password, empty salt, bad params)
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Tag verification failed. Deliberately carries no detail.
    #[error("Authentication failed")]
    Authentication,

    #[error("Encryption failed: {0}")]
    Encryption(String),

    // ═══════════════════════════════════════════════════════════════
    // SHARE ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Insufficient shares: need {needed}, have {available}")]
    InsufficientShares { needed: u8, available: usize },

    #[error("Inconsistent shares: {0}")]
    InconsistentShares(String),

    // ═══════════════════════════════════════════════════════════════
    // CARRIER ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("Carrier too small: payload needs {required} bytes, carrier holds {available}")]
    CapacityExceeded { required: usize, available: usize },

    #[error("Corrupted payload: {0}")]
    CorruptedPayload(String),

    #[error("Carrier holds no fragment")]
    MissingPayload,

    #[error("Unsupported format version: {0}")]
    UnsupportedVersion(u8),

    #[error("Lossy image format rejected: {0}")]
    LossyFormat(String),

    #[error("Image processing error: {0}")]
    Image(String),

    // ═══════════════════════════════════════════════════════════════
    // WORKFLOW ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error(transparent)]
    Recovery(#[from] RecoveryError),

    #[error(transparent)]
    Distribution(#[from] DistributionError),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Operation cancelled")]
    Cancelled,

    // ═══════════════════════════════════════════════════════════════
    // IO / SERIALIZATION ERRORS
    // ═══════════════════════════════════════════════════════════════

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl FractureError {
    /// Errors the operator can fix by supplying different carriers or
    /// parameters. None of them say anything about the password.
    pub fn is_caller_correctable(&self) -> bool {
        matches!(
            self,
            FractureError::CapacityExceeded { .. }
                | FractureError::CorruptedPayload(_)
                | FractureError::MissingPayload
                | FractureError::LossyFormat(_)
                | FractureError::InsufficientShares { .. }
                | FractureError::InconsistentShares(_)
                | FractureError::InvalidParameters(_)
                | FractureError::FileNotFound(_)
        )
    }

    /// Only transient I/O is worth retrying; identical crypto inputs
    /// always reproduce the same failure.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FractureError::Io(_))
    }

    /// Check if this error came out of a cryptographic check
    pub fn is_security_critical(&self) -> bool {
        matches!(
            self,
            FractureError::Authentication
                | FractureError::Recovery(RecoveryError::Unrecoverable)
        )
    }
}

impl From<image::ImageError> for FractureError {
    fn from(e: image::ImageError) -> Self {
        FractureError::Image(e.to_string())
    }
}

impl From<serde_json::Error> for FractureError {
    fn from(e: serde_json::Error) -> Self {
        FractureError::Serialization(e.to_string())
    }
}

impl From<bincode::Error> for FractureError {
    fn from(e: bincode::Error) -> Self {
        FractureError::Serialization(e.to_string())
    }
}

/// A carrier that could not be processed
#[derive(Debug)]
pub struct CarrierFailure {
    /// Position of the carrier in the caller's list
    pub index: usize,
    /// Carrier path
    pub path: PathBuf,
    /// What went wrong
    pub error: FractureError,
}

impl std::fmt::Display for CarrierFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "carrier #{} ({}): {}", self.index + 1, self.path.display(), self.error)
    }
}

/// Aggregate reconstruction failure.
///
/// Share-count and consistency problems are reported precisely. Anything
/// that fails after the shares are combined collapses into `Unrecoverable`
/// so a wrong password looks exactly like tampered data.
#[derive(Error, Debug)]
pub enum RecoveryError {
    #[error("Recovery needs {needed} shares, only {available} usable")]
    InsufficientShares {
        needed: u8,
        available: usize,
        failed_carriers: Vec<CarrierFailure>,
    },

    #[error("Recovery failed: {0}")]
    InconsistentShares(String),

    #[error("Recovery failed: wrong password or damaged fragments")]
    Unrecoverable,
}

/// A distribution that did not complete.
///
/// No vault descriptor exists when this is returned. `failed_carriers` is
/// never empty; `written` lists output files that were already produced and
/// must be discarded.
#[derive(Debug)]
pub struct DistributionError {
    pub stage: Stage,
    pub failed_carriers: Vec<CarrierFailure>,
    pub written: Vec<PathBuf>,
}

impl DistributionError {
    /// The lowest-numbered carrier that failed
    pub fn first_failure(&self) -> Option<&CarrierFailure> {
        self.failed_carriers.iter().min_by_key(|f| f.index)
    }
}

impl std::fmt::Display for DistributionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Distribution failed while {}", self.stage)?;
        if let Some(first) = self.first_failure() {
            write!(f, ": {}", first)?;
        }
        if self.failed_carriers.len() > 1 {
            write!(f, " (+{} more)", self.failed_carriers.len() - 1)?;
        }
        write!(f, " ({} carrier(s) already written)", self.written.len())
    }
}

impl std::error::Error for DistributionError {}
