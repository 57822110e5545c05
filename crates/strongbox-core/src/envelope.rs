//! Hybrid (envelope) encryption for one or many recipients.
//!
//! One fresh [`ContentKey`] per call encrypts the payload in a single
//! AES-256-GCM pass. That content key is then wrapped separately under every
//! recipient's RSA public key, producing one [`RecipientEntry`] each. Any one
//! recipient's private key recovers the same content key on its own, so the
//! ciphertext size grows only by one wrapped key per recipient.
//!
//! # Security model
//!
//! - The protected header (format version, algorithms, content type) is the
//!   AEAD associated data; altering it fails decryption.
//! - Recipient entries are not authenticated as associated data, so dropping
//!   other recipients never affects a remaining one. A tampered entry fails
//!   to unwrap or yields a key that fails the tag check.
//! - Decryption matches entries by key id only and never returns plaintext
//!   before the tag verifies.

use std::collections::HashSet;
use std::fmt;

use tracing::{debug, info};

use crate::crypto::{self, ContentKey, NONCE_LEN, Sealed, TAG_LEN};
use crate::error::EnvelopeError;
use crate::keys::{self, KeyRecord, KeyRole};

/// Container format version, bound into the associated data.
pub const FORMAT_VERSION: u32 = 1;

/// Payload cipher identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentCipher {
    A256Gcm,
}

impl ContentCipher {
    pub fn id(self) -> &'static str {
        match self {
            Self::A256Gcm => "A256GCM",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "A256GCM" => Some(Self::A256Gcm),
            _ => None,
        }
    }
}

/// Content-key wrap algorithm identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyWrapAlgorithm {
    /// RSA-OAEP with SHA-256 and MGF1-SHA-256.
    RsaOaep256,
}

impl KeyWrapAlgorithm {
    pub fn id(self) -> &'static str {
        match self {
            Self::RsaOaep256 => "RSA-OAEP-256",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "RSA-OAEP-256" => Some(Self::RsaOaep256),
            _ => None,
        }
    }
}

/// What the AEAD plaintext contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// The caller's bytes, unchanged.
    Raw,
    /// A signed-payload frame (signature block followed by the caller's bytes).
    Signed,
}

impl ContentType {
    pub fn id(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Signed => "signed",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "raw" => Some(Self::Raw),
            "signed" => Some(Self::Signed),
            _ => None,
        }
    }
}

/// Header fields covered by the AEAD tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtectedHeader {
    pub cipher: ContentCipher,
    pub key_wrap: KeyWrapAlgorithm,
    pub content_type: ContentType,
}

impl ProtectedHeader {
    /// Canonical associated-data encoding of the header.
    pub fn aad(&self) -> Vec<u8> {
        format!(
            "strongbox/v{FORMAT_VERSION};enc={};alg={};cty={}",
            self.cipher.id(),
            self.key_wrap.id(),
            self.content_type.id()
        )
        .into_bytes()
    }
}

/// The content key wrapped for one recipient.
#[derive(Clone, PartialEq, Eq)]
pub struct RecipientEntry {
    /// Key id of the recipient's key pair.
    pub kid: String,
    pub algorithm: KeyWrapAlgorithm,
    pub wrapped_key: Vec<u8>,
}

impl fmt::Debug for RecipientEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecipientEntry")
            .field("kid", &self.kid)
            .field("algorithm", &self.algorithm)
            .field("wrapped_key_len", &self.wrapped_key.len())
            .finish()
    }
}

/// An encrypted payload plus everything a recipient needs to open it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultContainer {
    pub header: ProtectedHeader,
    pub recipients: Vec<RecipientEntry>,
    pub nonce: [u8; NONCE_LEN],
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_LEN],
}

impl VaultContainer {
    /// Key ids of all recipients, in entry order.
    pub fn recipient_kids(&self) -> impl Iterator<Item = &str> {
        self.recipients.iter().map(|r| r.kid.as_str())
    }
}

/// Encrypt `plaintext` for every key in `recipients`.
///
/// # Errors
///
/// - [`EnvelopeError::NoRecipients`] if `recipients` is empty.
/// - [`EnvelopeError::Key`] if a record is private or expired.
/// - [`EnvelopeError::DuplicateRecipient`] if a key appears twice.
/// - [`EnvelopeError::Encryption`] if a primitive fails.
pub fn encrypt(
    plaintext: &[u8],
    recipients: &[&KeyRecord],
) -> Result<VaultContainer, EnvelopeError> {
    encrypt_as(plaintext, ContentType::Raw, recipients)
}

/// Like [`encrypt`], labelling the payload with `content_type`.
///
/// # Errors
///
/// Same as [`encrypt`].
pub fn encrypt_as(
    plaintext: &[u8],
    content_type: ContentType,
    recipients: &[&KeyRecord],
) -> Result<VaultContainer, EnvelopeError> {
    check_recipients(recipients)?;

    let header = ProtectedHeader {
        cipher: ContentCipher::A256Gcm,
        key_wrap: KeyWrapAlgorithm::RsaOaep256,
        content_type,
    };

    let content_key = ContentKey::generate();
    let sealed =
        crypto::seal(&content_key, plaintext, &header.aad()).map_err(EnvelopeError::Encryption)?;

    let entries = recipients
        .iter()
        .map(|record| {
            let wrapped_key = crypto::wrap_key(record.public_key(), &content_key)
                .map_err(EnvelopeError::Encryption)?;
            debug!(owner = record.owner(), kid = record.kid(), "wrapped content key");
            Ok(RecipientEntry {
                kid: record.kid().to_owned(),
                algorithm: header.key_wrap,
                wrapped_key,
            })
        })
        .collect::<Result<Vec<_>, EnvelopeError>>()?;

    info!(
        recipients = entries.len(),
        bytes = plaintext.len(),
        content_type = content_type.id(),
        "encrypted payload"
    );

    Ok(VaultContainer {
        header,
        recipients: entries,
        nonce: sealed.nonce,
        ciphertext: sealed.ciphertext,
        tag: sealed.tag,
    })
}

/// Check a recipient list without touching any key material: non-empty,
/// public, unexpired, and no key id twice.
///
/// # Errors
///
/// Same precondition errors as [`encrypt`].
pub(crate) fn check_recipients(recipients: &[&KeyRecord]) -> Result<(), EnvelopeError> {
    if recipients.is_empty() {
        return Err(EnvelopeError::NoRecipients);
    }

    let mut seen = HashSet::with_capacity(recipients.len());
    for record in recipients {
        record.require_role(KeyRole::Public)?;
        keys::validate(record)?;
        if !seen.insert(record.kid()) {
            return Err(EnvelopeError::DuplicateRecipient {
                kid: record.kid().to_owned(),
            });
        }
    }
    Ok(())
}

/// Recover the payload of `container` with a recipient's private key.
///
/// # Errors
///
/// - [`EnvelopeError::Key`] if the record is public or expired.
/// - [`EnvelopeError::NoMatchingRecipient`] if no entry for this key unwraps.
/// - [`EnvelopeError::Integrity`] if the payload fails authentication.
pub fn decrypt(
    container: &VaultContainer,
    private_key: &KeyRecord,
) -> Result<Vec<u8>, EnvelopeError> {
    private_key.require_role(KeyRole::Private)?;
    keys::validate(private_key)?;
    let rsa_key = private_key.private_key()?;

    let content_key = container
        .recipients
        .iter()
        .filter(|entry| entry.kid == private_key.kid())
        .find_map(|entry| match entry.algorithm {
            KeyWrapAlgorithm::RsaOaep256 => crypto::unwrap_key(rsa_key, &entry.wrapped_key).ok(),
        })
        .ok_or_else(|| EnvelopeError::NoMatchingRecipient {
            kid: private_key.kid().to_owned(),
        })?;

    let sealed = Sealed {
        nonce: container.nonce,
        ciphertext: container.ciphertext.clone(),
        tag: container.tag,
    };
    let plaintext = crypto::open(&content_key, &sealed, &container.header.aad())
        .map_err(|_| EnvelopeError::Integrity)?;

    info!(
        owner = private_key.owner(),
        bytes = plaintext.len(),
        "decrypted payload"
    );
    Ok(plaintext)
}
