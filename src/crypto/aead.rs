//! Fractured Key - AEAD Encryption
//!
//! AES-256-GCM and XChaCha20-Poly1305 with associated data. Nonces are
//! generated here and nowhere else, so a caller cannot reuse one.

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Nonce,
};
use chacha20poly1305::{XChaCha20Poly1305, XNonce};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::keys::{
    generate_nonce, generate_xchacha_nonce, SymmetricKey, NONCE_LEN, TAG_LEN, XCHACHA_NONCE_LEN,
};
use crate::error::{FractureError, FractureResult};

/// AEAD cipher choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum AeadCipher {
    /// AES-256-GCM (12-byte nonce)
    #[serde(rename = "aes-256-gcm")]
    Aes256Gcm,
    /// XChaCha20-Poly1305 (24-byte nonce)
    #[default]
    #[serde(rename = "xchacha20-poly1305")]
    XChaCha20Poly1305,
}

impl AeadCipher {
    pub fn nonce_len(&self) -> usize {
        match self {
            Self::Aes256Gcm => NONCE_LEN,
            Self::XChaCha20Poly1305 => XCHACHA_NONCE_LEN,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Aes256Gcm => "AES-256-GCM",
            Self::XChaCha20Poly1305 => "XChaCha20-Poly1305",
        }
    }

    /// Stable one-byte id for binary formats
    pub fn id(&self) -> u8 {
        match self {
            Self::Aes256Gcm => 1,
            Self::XChaCha20Poly1305 => 2,
        }
    }

    pub fn from_id(id: u8) -> FractureResult<Self> {
        match id {
            1 => Ok(Self::Aes256Gcm),
            2 => Ok(Self::XChaCha20Poly1305),
            other => Err(FractureError::CorruptedPayload(format!("unknown cipher id {}", other))),
        }
    }
}

/// AEAD output. `ciphertext` ends with the 16-byte authentication tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ciphertext {
    pub cipher: AeadCipher,
    pub nonce: Vec<u8>,
    pub ciphertext: Vec<u8>,
}

impl Ciphertext {
    /// Serialize to bytes (nonce || ciphertext)
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut result = Vec::with_capacity(self.nonce.len() + self.ciphertext.len());
        result.extend_from_slice(&self.nonce);
        result.extend_from_slice(&self.ciphertext);
        result
    }

    /// Deserialize from bytes produced by [`Ciphertext::to_bytes`]
    pub fn from_bytes(cipher: AeadCipher, data: &[u8]) -> FractureResult<Self> {
        let nonce_len = cipher.nonce_len();
        if data.len() < nonce_len + TAG_LEN {
            return Err(FractureError::CorruptedPayload("ciphertext too short".into()));
        }

        Ok(Self {
            cipher,
            nonce: data[..nonce_len].to_vec(),
            ciphertext: data[nonce_len..].to_vec(),
        })
    }

    /// The trailing authentication tag
    pub fn tag(&self) -> &[u8] {
        &self.ciphertext[self.ciphertext.len().saturating_sub(TAG_LEN)..]
    }
}

/// Encrypt `plaintext` under `key`, binding it to `aad`.
pub fn encrypt(
    cipher: AeadCipher,
    key: &SymmetricKey,
    plaintext: &[u8],
    aad: &[u8],
) -> FractureResult<Ciphertext> {
    let payload = Payload { msg: plaintext, aad };

    let (nonce, ciphertext) = match cipher {
        AeadCipher::Aes256Gcm => {
            let c = Aes256Gcm::new_from_slice(key.expose())
                .map_err(|e| FractureError::Encryption(e.to_string()))?;
            let nonce_bytes = generate_nonce();
            let ct = c
                .encrypt(Nonce::from_slice(&nonce_bytes), payload)
                .map_err(|e| FractureError::Encryption(e.to_string()))?;
            (nonce_bytes.to_vec(), ct)
        }
        AeadCipher::XChaCha20Poly1305 => {
            let c = XChaCha20Poly1305::new_from_slice(key.expose())
                .map_err(|e| FractureError::Encryption(e.to_string()))?;
            let nonce_bytes = generate_xchacha_nonce();
            let ct = c
                .encrypt(XNonce::from_slice(&nonce_bytes), payload)
                .map_err(|e| FractureError::Encryption(e.to_string()))?;
            (nonce_bytes.to_vec(), ct)
        }
    };

    Ok(Ciphertext {
        cipher,
        nonce,
        ciphertext,
    })
}

/// Decrypt and verify.
///
/// Every failure, including a malformed nonce, is `Authentication`: a wrong
/// key, wrong associated data and tampered bytes are indistinguishable.
pub fn decrypt(
    key: &SymmetricKey,
    sealed: &Ciphertext,
    aad: &[u8],
) -> FractureResult<Zeroizing<Vec<u8>>> {
    if sealed.nonce.len() != sealed.cipher.nonce_len() {
        return Err(FractureError::Authentication);
    }

    let payload = Payload {
        msg: sealed.ciphertext.as_slice(),
        aad,
    };

    let plaintext = match sealed.cipher {
        AeadCipher::Aes256Gcm => Aes256Gcm::new_from_slice(key.expose())
            .map_err(|_| FractureError::Authentication)?
            .decrypt(Nonce::from_slice(&sealed.nonce), payload),
        AeadCipher::XChaCha20Poly1305 => XChaCha20Poly1305::new_from_slice(key.expose())
            .map_err(|_| FractureError::Authentication)?
            .decrypt(XNonce::from_slice(&sealed.nonce), payload),
    };

    plaintext
        .map(Zeroizing::new)
        .map_err(|_| FractureError::Authentication)
}

#[cfg(test)]
mod tests {
    use super::*;

    const AAD: &[u8] = b"vault-42";

    #[test]
    fn test_roundtrip_both_ciphers() {
        for cipher in [AeadCipher::Aes256Gcm, AeadCipher::XChaCha20Poly1305] {
            let key = SymmetricKey::generate();
            let plaintext = b"site=example.org;user=alice;pass=hunter2";

            let sealed = encrypt(cipher, &key, plaintext, AAD).unwrap();
            assert_eq!(sealed.nonce.len(), cipher.nonce_len());
            assert_eq!(sealed.tag().len(), TAG_LEN);

            let opened = decrypt(&key, &sealed, AAD).unwrap();
            assert_eq!(opened.as_slice(), plaintext);
        }
    }

    #[test]
    fn test_empty_plaintext() {
        let key = SymmetricKey::generate();
        let sealed = encrypt(AeadCipher::default(), &key, b"", AAD).unwrap();
        assert_eq!(sealed.ciphertext.len(), TAG_LEN);
        assert!(decrypt(&key, &sealed, AAD).unwrap().is_empty());
    }

    #[test]
    fn test_wrong_key_fails() {
        let key = SymmetricKey::generate();
        let sealed = encrypt(AeadCipher::Aes256Gcm, &key, b"secret", AAD).unwrap();
        let result = decrypt(&SymmetricKey::generate(), &sealed, AAD);
        assert!(matches!(result, Err(FractureError::Authentication)));
    }

    #[test]
    fn test_wrong_aad_fails() {
        let key = SymmetricKey::generate();
        let sealed = encrypt(AeadCipher::XChaCha20Poly1305, &key, b"secret", AAD).unwrap();
        let result = decrypt(&key, &sealed, b"vault-43");
        assert!(matches!(result, Err(FractureError::Authentication)));
    }

    #[test]
    fn test_every_flipped_bit_fails() {
        let key = SymmetricKey::generate();
        let sealed = encrypt(AeadCipher::XChaCha20Poly1305, &key, b"abc", AAD).unwrap();

        for byte in 0..sealed.ciphertext.len() {
            for bit in 0..8 {
                let mut tampered = sealed.clone();
                tampered.ciphertext[byte] ^= 1 << bit;
                assert!(matches!(
                    decrypt(&key, &tampered, AAD),
                    Err(FractureError::Authentication)
                ));
            }
        }
    }

    #[test]
    fn test_fresh_nonce_per_call() {
        let key = SymmetricKey::generate();
        let a = encrypt(AeadCipher::Aes256Gcm, &key, b"same", AAD).unwrap();
        let b = encrypt(AeadCipher::Aes256Gcm, &key, b"same", AAD).unwrap();
        assert_ne!(a.nonce, b.nonce);
        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn test_bytes_roundtrip() {
        let key = SymmetricKey::generate();
        let sealed = encrypt(AeadCipher::Aes256Gcm, &key, b"payload", AAD).unwrap();
        let parsed = Ciphertext::from_bytes(AeadCipher::Aes256Gcm, &sealed.to_bytes()).unwrap();
        assert_eq!(parsed, sealed);
        assert!(Ciphertext::from_bytes(AeadCipher::Aes256Gcm, &[0u8; 10]).is_err());
    }
}
