//! Fractured Key - Steganographic Carriers
//!
//! Hides fragment bytes in the low bits of lossless images.

pub mod carrier;
pub mod lsb;

pub use carrier::{is_lossless, output_format, Carrier};
pub use lsb::{LsbCodec, HEADER_LEN, MAX_BITS_PER_CHANNEL};
