//! Fractured Key - Threshold Secret Sharing
//!
//! Shamir's scheme over GF(256), one polynomial per secret byte. Shares
//! carry their vault id and layout so foreign or mismatched shares are
//! refused before interpolation.

pub(crate) mod field;
pub mod shamir;

pub use shamir::{check_layout, combine, split, Share};
