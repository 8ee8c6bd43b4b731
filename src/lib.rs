//! # Fractured Key
//!
//! Credentials without a single vault file: a secret is encrypted, its key
//! is split into N shares, and each share is hidden in an ordinary image.
//! Any K of those images plus the master password bring the secret back.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                      FRAGMENT MANAGER                      │
//! │        distribute  ·  reconstruct  ·  progress/cancel      │
//! │  ┌────────────┐  ┌────────────┐  ┌────────────┐  ┌──────┐  │
//! │  │  ARGON2ID  │→ │    AEAD    │→ │  SHAMIR    │→ │ LSB  │  │
//! │  │  password  │  │  2 layers  │  │  GF(256)   │  │ PNG  │  │
//! │  └────────────┘  └────────────┘  └────────────┘  └──────┘  │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Security Model
//!
//! - The bundle is encrypted under an Argon2id key, then again under a
//!   random data key; only the data key is split
//! - Fewer than K shares reveal nothing about the data key
//! - Every ciphertext is bound to its vault id and (K, N)
//! - Wrong password and tampered fragments fail identically
//! - Keys and plaintext are zeroized after use

pub mod api;
pub mod bundle;
pub mod config;
pub mod crypto;
pub mod error;
pub mod fragment;
pub mod manager;
pub mod progress;
pub mod sealed;
pub mod secure_fs;
pub mod sharing;
pub mod stego;
pub mod vault;

pub use api::{FracturedKeyApi, VaultSource};
pub use bundle::{CredentialBundle, CredentialRecord};
pub use config::EngineConfig;
pub use crypto::{AeadCipher, KdfParams, Salt};
pub use error::{CarrierFailure, DistributionError, FractureError, FractureResult, RecoveryError};
pub use manager::{CarrierSpec, FragmentManager};
pub use progress::{
    CancelToken, ChannelObserver, NoopObserver, ProgressEvent, ProgressObserver, Stage,
};
pub use vault::VaultDescriptor;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
