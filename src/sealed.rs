//! Single-file sealed bundles (password only, no sharing).
//!
//! Format:
//! ```text
//! [MAGIC 4B]["FKSB"]
//! [VERSION 1B][0x01]
//! [CIPHER 1B][1 = AES-256-GCM, 2 = XChaCha20-Poly1305]
//! [T_COST 4B BE][M_COST 4B BE][PARALLELISM 4B BE]
//! [SALT_LEN 1B][SALT]
//! [NONCE 12B or 24B]
//! [CIPHERTEXT variable][TAG 16B]
//! ```
//!
//! Everything up to the nonce is authenticated as associated data.

use secrecy::SecretString;
use uuid::Uuid;

use crate::bundle::CredentialBundle;
use crate::crypto::{self, associated_data, layers, AeadCipher, Ciphertext, KdfParams, Salt};
use crate::error::{FractureError, FractureResult};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

const MAGIC: &[u8; 4] = b"FKSB";

const VERSION: u8 = 0x01;

/// Header up to and including the salt length byte
const FIXED_HEADER: usize = 4 + 1 + 1 + 12 + 1;

// ---------------------------------------------------------------------------
// Seal / open
// ---------------------------------------------------------------------------

fn sealed_aad(header: &[u8]) -> Vec<u8> {
    let mut aad = associated_data(layers::SEALED, &Uuid::nil(), 1, 1);
    aad.extend_from_slice(header);
    aad
}

/// Encrypt `bundle` into a self-contained blob
pub fn seal(
    password: &SecretString,
    bundle: &CredentialBundle,
    cipher: AeadCipher,
    params: &KdfParams,
) -> FractureResult<Vec<u8>> {
    let salt = Salt::generate();
    let salt_len = u8::try_from(salt.len())
        .map_err(|_| FractureError::InvalidParameters("salt too long".into()))?;

    let mut header = Vec::with_capacity(FIXED_HEADER + salt.len());
    header.extend_from_slice(MAGIC);
    header.push(VERSION);
    header.push(cipher.id());
    header.extend_from_slice(&params.time_cost.to_be_bytes());
    header.extend_from_slice(&params.memory_cost_kib.to_be_bytes());
    header.extend_from_slice(&params.parallelism.to_be_bytes());
    header.push(salt_len);
    header.extend_from_slice(salt.as_bytes());

    let key = crypto::derive(password, &salt, params)?;
    let sealed = crypto::encrypt(cipher, &key, bundle.as_bytes(), &sealed_aad(&header))?;
    drop(key);

    let mut out = header;
    out.extend_from_slice(&sealed.to_bytes());
    Ok(out)
}

/// Decrypt a blob produced by [`seal`].
///
/// A wrong password and a tampered blob both give `Authentication`.
pub fn open(password: &SecretString, data: &[u8]) -> FractureResult<CredentialBundle> {
    if data.len() < FIXED_HEADER {
        return Err(FractureError::CorruptedPayload("sealed file too short".into()));
    }
    if &data[0..4] != MAGIC {
        return Err(FractureError::CorruptedPayload("not a sealed bundle".into()));
    }
    if data[4] != VERSION {
        return Err(FractureError::UnsupportedVersion(data[4]));
    }

    let cipher = AeadCipher::from_id(data[5])?;
    let read_u32 = |at: usize| {
        u32::from_be_bytes([data[at], data[at + 1], data[at + 2], data[at + 3]])
    };
    let params = KdfParams::new(read_u32(6), read_u32(10), read_u32(14));
    params
        .validate()
        .map_err(|_| FractureError::CorruptedPayload("sealed file has bad KDF params".into()))?;

    let salt_len = data[18] as usize;
    let header_len = FIXED_HEADER + salt_len;
    if data.len() < header_len {
        return Err(FractureError::CorruptedPayload("sealed file truncated".into()));
    }
    let salt = Salt::from_bytes(&data[FIXED_HEADER..header_len]);
    let sealed = Ciphertext::from_bytes(cipher, &data[header_len..])?;

    let key = crypto::derive(password, &salt, &params)?;
    let plaintext = crypto::decrypt(&key, &sealed, &sealed_aad(&data[..header_len]))?;
    Ok(CredentialBundle::from(plaintext))
}
