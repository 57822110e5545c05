//! Cryptographic primitives for Strongbox.
//!
//! Thin wrappers over the RustCrypto crates: AES-256-GCM with a detached tag
//! for the payload, RSA-OAEP (SHA-256) for wrapping the content key, and
//! SHA-256 key fingerprints. Nothing here knows about recipients, files, or
//! signatures.
//!
//! # Security model
//!
//! - Every content key comes from `OsRng` and is zeroized on drop.
//! - Every AEAD call uses a fresh 96-bit nonce from `OsRng`.
//! - Unwrap failures carry no detail, so callers cannot build a padding oracle.

use std::fmt;

pub(crate) use aes_gcm::aead::OsRng;
use aes_gcm::aead::{AeadCore, AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Key, Nonce, Tag};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::CryptoError;

/// Content key length for AES-256-GCM (256 bits).
pub const CONTENT_KEY_LEN: usize = 32;

/// Nonce length for AES-256-GCM (96 bits).
pub const NONCE_LEN: usize = 12;

/// Authentication tag length for AES-256-GCM (128 bits).
pub const TAG_LEN: usize = 16;

/// An ephemeral 256-bit content key, zeroized on drop.
///
/// Neither `Clone` nor `Serialize`: one key exists for exactly
/// one encryption and is only ever persisted in wrapped form.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct ContentKey([u8; CONTENT_KEY_LEN]);

impl ContentKey {
    /// Generate a new random key using the OS CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let key = Aes256Gcm::generate_key(OsRng);
        let mut bytes = [0u8; CONTENT_KEY_LEN];
        bytes.copy_from_slice(&key);
        Self(bytes)
    }

    /// Rebuild a key from unwrapped bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::InvalidLength`] unless `bytes` is exactly 32 bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, CryptoError> {
        let array: [u8; CONTENT_KEY_LEN] =
            bytes.try_into().map_err(|_| CryptoError::InvalidLength {
                what: "content key",
                expected: CONTENT_KEY_LEN,
                actual: bytes.len(),
            })?;
        Ok(Self(array))
    }

    /// Borrow the raw key bytes.
    ///
    /// Use with care: the caller must not log or persist these bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; CONTENT_KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Output of one AEAD pass: nonce, ciphertext, and detached tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

/// Encrypt `plaintext` under `key` with a fresh random nonce.
///
/// `aad` is authenticated but not encrypted.
///
/// # Errors
///
/// Returns [`CryptoError::Encryption`] if the AEAD operation fails.
pub fn seal(key: &ContentKey, plaintext: &[u8], aad: &[u8]) -> Result<Sealed, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(&nonce, aad, &mut buffer)
        .map_err(|e| CryptoError::Encryption {
            reason: e.to_string(),
        })?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    nonce_bytes.copy_from_slice(&nonce);
    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);

    Ok(Sealed {
        nonce: nonce_bytes,
        ciphertext: buffer,
        tag: tag_bytes,
    })
}

/// Decrypt and authenticate a [`Sealed`] payload.
///
/// Nothing is returned unless the tag verifies; the working buffer is
/// zeroized on failure.
///
/// # Errors
///
/// Returns [`CryptoError::TagMismatch`] if authentication fails (wrong key,
/// corrupted ciphertext, altered `aad`, or tampered tag).
pub fn open(key: &ContentKey, sealed: &Sealed, aad: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let nonce = Nonce::from_slice(&sealed.nonce);
    let tag = Tag::from_slice(&sealed.tag);

    let mut buffer = Zeroizing::new(sealed.ciphertext.clone());
    cipher
        .decrypt_in_place_detached(nonce, aad, &mut buffer, tag)
        .map_err(|_| CryptoError::TagMismatch)?;

    Ok(std::mem::take(&mut *buffer))
}

/// Wrap a content key under an RSA public key with OAEP/SHA-256.
///
/// # Errors
///
/// Returns [`CryptoError::Wrap`] if RSA encryption fails.
pub fn wrap_key(public: &RsaPublicKey, key: &ContentKey) -> Result<Vec<u8>, CryptoError> {
    public
        .encrypt(&mut OsRng, Oaep::new::<Sha256>(), key.as_bytes())
        .map_err(|e| CryptoError::Wrap {
            reason: e.to_string(),
        })
}

/// Recover a content key wrapped by [`wrap_key`].
///
/// # Errors
///
/// Returns [`CryptoError::Unwrap`] for any failure, including a wrong key, a
/// corrupted entry, or an unwrapped value that is not 32 bytes long.
pub fn unwrap_key(private: &RsaPrivateKey, wrapped: &[u8]) -> Result<ContentKey, CryptoError> {
    let bytes = Zeroizing::new(
        private
            .decrypt(Oaep::new::<Sha256>(), wrapped)
            .map_err(|_| CryptoError::Unwrap)?,
    );
    ContentKey::from_slice(&bytes).map_err(|_| CryptoError::Unwrap)
}

/// Stable identifier of an RSA public key.
///
/// SHA-256 over the length-prefixed big-endian modulus and public exponent,
/// hex-encoded. Independent of any file format.
pub fn fingerprint(public: &RsaPublicKey) -> String {
    let mut hasher = Sha256::new();
    for part in [public.n().to_bytes_be(), public.e().to_bytes_be()] {
        let len = u32::try_from(part.len()).unwrap_or(u32::MAX);
        hasher.update(len.to_be_bytes());
        hasher.update(&part);
    }
    hex::encode(hasher.finalize())
}
