//! (K, N) threshold splitting over GF(256).
//!
//! Each secret byte gets its own random polynomial of degree K-1 whose
//! constant term is that byte. Share `i` holds every polynomial evaluated
//! at x = i. Fewer than K shares are statistically independent of the
//! secret.

use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use super::field::Gf256;
use crate::error::{FractureError, FractureResult};

/// One fragment of a threshold split
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct Share {
    /// x-coordinate, 1..=total
    pub index: u8,
    /// Shares needed to reconstruct
    pub threshold: u8,
    /// Shares produced by the split
    pub total: u8,
    /// Vault the share belongs to
    #[zeroize(skip)]
    pub bundle_id: Uuid,
    /// One field element per secret byte
    pub data: Vec<u8>,
}

impl std::fmt::Debug for Share {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Share")
            .field("index", &self.index)
            .field("threshold", &self.threshold)
            .field("total", &self.total)
            .field("bundle_id", &self.bundle_id)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Validate a (K, N) layout
pub fn check_layout(threshold: u8, total: u8) -> FractureResult<()> {
    if threshold == 0 || total == 0 || threshold > total {
        return Err(FractureError::InvalidParameters(format!(
            "threshold must satisfy 1 <= K <= N, got K={} N={}",
            threshold, total
        )));
    }
    Ok(())
}

/// Split `secret` into `total` shares, any `threshold` of which rebuild it.
pub fn split(
    secret: &[u8],
    threshold: u8,
    total: u8,
    bundle_id: Uuid,
) -> FractureResult<Vec<Share>> {
    check_layout(threshold, total)?;
    if secret.is_empty() {
        return Err(FractureError::InvalidParameters("secret is empty".into()));
    }

    let mut shares: Vec<Share> = (1..=total)
        .map(|index| Share {
            index,
            threshold,
            total,
            bundle_id,
            data: vec![0u8; secret.len()],
        })
        .collect();

    let mut coeffs = Zeroizing::new(vec![Gf256::ZERO; threshold as usize]);
    let mut random = Zeroizing::new(vec![0u8; threshold as usize - 1]);

    for (pos, &byte) in secret.iter().enumerate() {
        OsRng.fill_bytes(&mut random);
        coeffs[0] = Gf256(byte);
        for (c, &r) in coeffs.iter_mut().skip(1).zip(random.iter()) {
            *c = Gf256(r);
        }

        for share in shares.iter_mut() {
            share.data[pos] = Gf256::eval_poly(&coeffs, Gf256(share.index)).0;
        }
    }

    Ok(shares)
}

/// Rebuild the secret from at least `threshold` consistent shares.
///
/// All consistency checks run before any interpolation: interpolating
/// foreign or duplicated points silently produces garbage.
pub fn combine(shares: &[Share]) -> FractureResult<Zeroizing<Vec<u8>>> {
    let first = shares.first().ok_or(FractureError::InsufficientShares {
        needed: 1,
        available: 0,
    })?;

    let threshold = first.threshold;
    let total = first.total;
    check_layout(threshold, total)
        .map_err(|_| FractureError::InconsistentShares("share declares an invalid layout".into()))?;

    let mut seen = [false; 256];
    for share in shares {
        if share.bundle_id != first.bundle_id {
            return Err(FractureError::InconsistentShares(
                "shares come from different vaults".into(),
            ));
        }
        if share.threshold != threshold || share.total != total {
            return Err(FractureError::InconsistentShares("shares disagree on K/N".into()));
        }
        if share.data.len() != first.data.len() {
            return Err(FractureError::InconsistentShares("shares differ in length".into()));
        }
        if share.index == 0 || share.index > total {
            return Err(FractureError::InconsistentShares(format!(
                "share index {} outside 1..={}",
                share.index, total
            )));
        }
        if seen[share.index as usize] {
            return Err(FractureError::InconsistentShares(format!(
                "duplicate share index {}",
                share.index
            )));
        }
        seen[share.index as usize] = true;
    }

    if shares.len() < threshold as usize {
        return Err(FractureError::InsufficientShares {
            needed: threshold,
            available: shares.len(),
        });
    }

    let used = &shares[..threshold as usize];
    let mut secret = Zeroizing::new(vec![0u8; first.data.len()]);
    let mut points = Vec::with_capacity(used.len());

    for (pos, out) in secret.iter_mut().enumerate() {
        points.clear();
        points.extend(used.iter().map(|s| (Gf256(s.index), Gf256(s.data[pos]))));

        *out = Gf256::interpolate_at_zero(&points)
            .ok_or_else(|| FractureError::InconsistentShares("repeated x-coordinate".into()))?
            .0;
    }
    points.iter_mut().for_each(|p| *p = (Gf256::ZERO, Gf256::ZERO));

    Ok(secret)
}
