//! Least-significant-bit codec.
//!
//! Stream layout, written from the first colour sample onward:
//!
//! ```text
//! [4-byte magic "FKS1"][1-byte version][4-byte BE length][4-byte checksum][payload]
//! ```
//!
//! Samples are visited row-major, R then G then B, and each takes the next
//! `bits_per_channel` bits of the stream, most significant bit first. The
//! checksum is the first four bytes of SHA-256 over the payload.

use sha2::{Digest, Sha256};

use super::carrier::Carrier;
use crate::error::{FractureError, FractureResult};

/// Marker at the start of every embedded stream
pub const MAGIC: &[u8; 4] = b"FKS1";

/// Stream format version
pub const VERSION: u8 = 1;

/// Magic + version + length + checksum
pub const HEADER_LEN: usize = 4 + 1 + 4 + 4;

/// Densest setting that still keeps changes below visible noise
pub const MAX_BITS_PER_CHANNEL: u8 = 4;

/// LSB embedder/extractor with a fixed density
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LsbCodec {
    bits_per_channel: u8,
}

impl Default for LsbCodec {
    fn default() -> Self {
        Self { bits_per_channel: 1 }
    }
}

impl LsbCodec {
    pub fn new(bits_per_channel: u8) -> FractureResult<Self> {
        if !(1..=MAX_BITS_PER_CHANNEL).contains(&bits_per_channel) {
            return Err(FractureError::InvalidParameters(format!(
                "bits per channel must be 1..={}, got {}",
                MAX_BITS_PER_CHANNEL, bits_per_channel
            )));
        }
        Ok(Self { bits_per_channel })
    }

    pub fn bits_per_channel(&self) -> u8 {
        self.bits_per_channel
    }

    /// Raw capacity in bytes, header included
    pub fn capacity(&self, carrier: &Carrier) -> usize {
        carrier.sample_count() * self.bits_per_channel as usize / 8
    }

    /// Largest payload that fits after the header
    pub fn payload_capacity(&self, carrier: &Carrier) -> usize {
        self.capacity(carrier).saturating_sub(HEADER_LEN)
    }

    /// Hide `payload` in `carrier`.
    ///
    /// Samples past the end of the stream are left as they were.
    pub fn embed(&self, mut carrier: Carrier, payload: &[u8]) -> FractureResult<Carrier> {
        let available = self.capacity(&carrier);
        let required = HEADER_LEN + payload.len();
        if required > available {
            return Err(FractureError::CapacityExceeded { required, available });
        }
        let length = u32::try_from(payload.len()).map_err(|_| FractureError::CapacityExceeded {
            required,
            available: u32::MAX as usize,
        })?;

        let mut stream = Vec::with_capacity(required);
        stream.extend_from_slice(MAGIC);
        stream.push(VERSION);
        stream.extend_from_slice(&length.to_be_bytes());
        stream.extend_from_slice(&checksum(payload));
        stream.extend_from_slice(payload);

        let mut writer = BitWriter::new(&mut carrier, self.bits_per_channel);
        for &byte in &stream {
            writer.push_byte(byte);
        }
        writer.finish();

        tracing::debug!(
            "embedded {} payload bytes ({} of {} capacity, {} bit/channel)",
            payload.len(),
            required,
            available,
            self.bits_per_channel
        );
        Ok(carrier)
    }

    /// Read back a payload written by [`LsbCodec::embed`] with the same density
    pub fn extract(&self, carrier: &Carrier) -> FractureResult<Vec<u8>> {
        let capacity = self.capacity(carrier);
        if capacity < HEADER_LEN {
            return Err(FractureError::MissingPayload);
        }

        let mut reader = BitReader::new(carrier, self.bits_per_channel);
        let header = reader.read_bytes(HEADER_LEN);

        if &header[0..4] != MAGIC {
            return Err(FractureError::MissingPayload);
        }
        if header[4] != VERSION {
            return Err(FractureError::UnsupportedVersion(header[4]));
        }

        let length = u32::from_be_bytes([header[5], header[6], header[7], header[8]]) as usize;
        if length > capacity - HEADER_LEN {
            return Err(FractureError::CorruptedPayload(format!(
                "declared length {} exceeds carrier capacity {}",
                length,
                capacity - HEADER_LEN
            )));
        }

        let payload = reader.read_bytes(length);
        if checksum(&payload) != header[9..13] {
            return Err(FractureError::CorruptedPayload("checksum mismatch".into()));
        }

        Ok(payload)
    }
}

fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(payload);
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Feeds a byte stream into successive samples
struct BitWriter<'a> {
    carrier: &'a mut Carrier,
    bits: u32,
    mask: u8,
    acc: u32,
    acc_len: u32,
    sample: usize,
}

impl<'a> BitWriter<'a> {
    fn new(carrier: &'a mut Carrier, bits: u8) -> Self {
        Self {
            carrier,
            bits: bits as u32,
            mask: (1u8 << bits) - 1,
            acc: 0,
            acc_len: 0,
            sample: 0,
        }
    }

    fn push_byte(&mut self, byte: u8) {
        self.acc = (self.acc << 8) | byte as u32;
        self.acc_len += 8;

        while self.acc_len >= self.bits {
            self.acc_len -= self.bits;
            let chunk = (self.acc >> self.acc_len) as u8 & self.mask;
            self.store(chunk);
        }
        self.acc &= (1 << self.acc_len) - 1;
    }

    /// Flush a trailing partial chunk, zero-padded
    fn finish(mut self) {
        if self.acc_len > 0 {
            let chunk = (self.acc << (self.bits - self.acc_len)) as u8 & self.mask;
            self.store(chunk);
        }
    }

    fn store(&mut self, chunk: u8) {
        let sample = self.carrier.sample_mut(self.sample);
        *sample = (*sample & !self.mask) | chunk;
        self.sample += 1;
    }
}

/// Reassembles bytes from successive samples.
///
/// Callers bound the read by the carrier capacity first.
struct BitReader<'a> {
    carrier: &'a Carrier,
    bits: u32,
    mask: u8,
    acc: u32,
    acc_len: u32,
    sample: usize,
}

impl<'a> BitReader<'a> {
    fn new(carrier: &'a Carrier, bits: u8) -> Self {
        Self {
            carrier,
            bits: bits as u32,
            mask: (1u8 << bits) - 1,
            acc: 0,
            acc_len: 0,
            sample: 0,
        }
    }

    fn read_bytes(&mut self, count: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(count);
        for _ in 0..count {
            while self.acc_len < 8 {
                let chunk = self.carrier.sample(self.sample) & self.mask;
                self.acc = (self.acc << self.bits) | chunk as u32;
                self.acc_len += self.bits;
                self.sample += 1;
            }
            self.acc_len -= 8;
            out.push((self.acc >> self.acc_len) as u8);
            self.acc &= (1 << self.acc_len) - 1;
        }
        out
    }
}
