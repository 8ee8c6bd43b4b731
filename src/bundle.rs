//! Fractured Key - Credential Bundle
//!
//! The plaintext that gets protected. Opaque bytes to the engine; callers
//! that store site logins can use [`CredentialRecord`] and the JSON helpers.

use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::FractureResult;

/// Plaintext secret payload, wiped on drop
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialBundle(Zeroizing<Vec<u8>>);

impl CredentialBundle {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(Zeroizing::new(bytes.to_vec()))
    }

    /// Take ownership of an existing buffer without copying it
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
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

    /// Serialize login records as JSON
    pub fn from_records(records: &[CredentialRecord]) -> FractureResult<Self> {
        Ok(Self::from_vec(serde_json::to_vec(records)?))
    }

    /// Parse the bundle as JSON login records
    pub fn records(&self) -> FractureResult<Vec<CredentialRecord>> {
        Ok(serde_json::from_slice(&self.0)?)
    }
}

impl From<Zeroizing<Vec<u8>>> for CredentialBundle {
    fn from(bytes: Zeroizing<Vec<u8>>) -> Self {
        Self(bytes)
    }
}

impl std::fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CredentialBundle([REDACTED; {} bytes])", self.0.len())
    }
}

/// One stored login
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct CredentialRecord {
    pub site: String,
    pub username: String,
    pub password: String,
}

impl CredentialRecord {
    pub fn new(
        site: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            site: site.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("site", &self.site)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}
