//! Error types for `strongbox-core`.
//!
//! Each subsystem has its own error enum and every variant carries enough
//! context to diagnose the problem without a debugger. Errors never include
//! key material, only owner names, key ids, or operation descriptions.
//!
//! Every error maps onto a closed [`ErrorKind`] so callers can branch on the
//! failure class without matching nested enums. Workflow errors additionally
//! name the [`Stage`] that failed.

use std::fmt;
use std::path::PathBuf;

use crate::keys::KeyRole;

/// Failure classes shared by every error type in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The key path does not resolve to a file.
    KeyNotFound,
    /// Required key fields are absent or the key material is inconsistent.
    KeyMalformed,
    /// The key record is past its expiry timestamp.
    KeyExpired,
    /// The same recipient key was supplied twice to one encryption.
    DuplicateRecipient,
    /// Key pair generation failed.
    KeyGenerationFailure,
    /// Payload encryption, key wrapping, or signing failed.
    EncryptionFailure,
    /// No recipient entry could be unwrapped with the supplied key.
    DecryptionFailure,
    /// AEAD tag verification failed.
    IntegrityFailure,
    /// The signature does not verify against the payload and sender key.
    InvalidSignature,
    /// The vault file does not match the container schema.
    VaultMalformed,
    /// The vault file names an algorithm or format version this build does not know.
    UnsupportedAlgorithm,
    /// Reading or writing a file failed.
    IoFailure,
    /// A caller precondition was violated (empty recipient list, wrong key role).
    Precondition,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::KeyNotFound => "KeyNotFound",
            Self::KeyMalformed => "KeyMalformed",
            Self::KeyExpired => "KeyExpired",
            Self::DuplicateRecipient => "DuplicateRecipient",
            Self::KeyGenerationFailure => "KeyGenerationFailure",
            Self::EncryptionFailure => "EncryptionFailure",
            Self::DecryptionFailure => "DecryptionFailure",
            Self::IntegrityFailure => "IntegrityFailure",
            Self::InvalidSignature => "InvalidSignature",
            Self::VaultMalformed => "VaultMalformed",
            Self::UnsupportedAlgorithm => "UnsupportedAlgorithm",
            Self::IoFailure => "IOFailure",
            Self::Precondition => "Precondition",
        };
        f.write_str(name)
    }
}

/// Errors from low-level primitive calls (AEAD, RSA wrap/unwrap).
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    /// AES-256-GCM encryption failed.
    #[error("encryption failed: {reason}")]
    Encryption { reason: String },

    /// AES-256-GCM authentication failed (wrong key, corrupted ciphertext, or tampered tag).
    #[error("authentication tag mismatch")]
    TagMismatch,

    /// RSA-OAEP wrapping of the content key failed.
    #[error("content key wrap failed: {reason}")]
    Wrap { reason: String },

    /// RSA-OAEP unwrapping failed. The cause is not reported.
    #[error("content key unwrap failed")]
    Unwrap,

    /// Key or nonce material had the wrong length.
    #[error("invalid {what} length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        what: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Errors from key generation, loading, and validation.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// The key file does not exist or is not a regular file.
    #[error("key file not found: {}", path.display())]
    NotFound { path: PathBuf },

    /// The key record is missing fields or its material is invalid.
    #[error("malformed key record: {reason}")]
    Malformed { reason: String },

    /// The key record has expired.
    #[error("key for '{owner}' expired at {expired_at}")]
    Expired { owner: String, expired_at: String },

    /// RSA key pair generation failed.
    #[error("key generation failed: {reason}")]
    Generation { reason: String },

    /// The owner name cannot be used as a key file name.
    #[error("invalid owner name '{owner}': {reason}")]
    InvalidOwner { owner: String, reason: String },

    /// A public key was supplied where a private key is required, or vice versa.
    #[error("key for '{owner}' is a {actual} key, expected a {expected} key")]
    WrongRole {
        owner: String,
        expected: KeyRole,
        actual: KeyRole,
    },

    /// Reading or writing a key file failed.
    #[error("key file I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl KeyError {
    /// Failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::KeyNotFound,
            Self::Malformed { .. } => ErrorKind::KeyMalformed,
            Self::Expired { .. } => ErrorKind::KeyExpired,
            Self::Generation { .. } | Self::InvalidOwner { .. } => {
                ErrorKind::KeyGenerationFailure
            }
            Self::WrongRole { .. } => ErrorKind::Precondition,
            Self::Io { .. } => ErrorKind::IoFailure,
        }
    }
}

/// Errors from signing and signature verification.
#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    /// The signature did not verify. Wrong key, modified payload, and
    /// corrupted signature bytes are all reported identically.
    #[error("invalid signature")]
    InvalidSignature,

    /// The signing primitive failed.
    #[error("signing failed: {reason}")]
    Signing { reason: String },

    /// The key could not be used.
    #[error("signature key error: {0}")]
    Key(#[from] KeyError),
}

impl SignatureError {
    /// Failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidSignature => ErrorKind::InvalidSignature,
            Self::Signing { .. } => ErrorKind::EncryptionFailure,
            Self::Key(e) => e.kind(),
        }
    }
}

/// Errors from envelope encryption and decryption.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// `encrypt` was called with an empty recipient list.
    #[error("at least one recipient is required")]
    NoRecipients,

    /// The same recipient key appears twice.
    #[error("duplicate recipient key id {kid}")]
    DuplicateRecipient { kid: String },

    /// A recipient or decryption key could not be used.
    #[error("envelope key error: {0}")]
    Key(#[from] KeyError),

    /// Payload encryption or content key wrapping failed.
    #[error("envelope encryption failed: {0}")]
    Encryption(#[source] CryptoError),

    /// No recipient entry could be unwrapped with the supplied private key.
    #[error("no recipient entry could be unwrapped with key {kid}")]
    NoMatchingRecipient { kid: String },

    /// The recovered content key failed AEAD verification of the payload.
    #[error("payload integrity check failed")]
    Integrity,
}

impl EnvelopeError {
    /// Failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoRecipients => ErrorKind::Precondition,
            Self::DuplicateRecipient { .. } => ErrorKind::DuplicateRecipient,
            Self::Key(e) => e.kind(),
            Self::Encryption(_) => ErrorKind::EncryptionFailure,
            Self::NoMatchingRecipient { .. } => ErrorKind::DecryptionFailure,
            Self::Integrity => ErrorKind::IntegrityFailure,
        }
    }
}

/// Errors from vault container (de)serialization.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The vault bytes do not match the container schema.
    #[error("malformed vault: {reason}")]
    Malformed { reason: String },

    /// A self-describing id names something this build does not support.
    #[error("unsupported {field}: '{value}'")]
    UnsupportedAlgorithm { field: &'static str, value: String },
}

impl CodecError {
    /// Failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Malformed { .. } => ErrorKind::VaultMalformed,
            Self::UnsupportedAlgorithm { .. } => ErrorKind::UnsupportedAlgorithm,
        }
    }
}

/// The workflow stage at which an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    KeyLoad,
    Signing,
    Encryption,
    Decryption,
    Verification,
    Encoding,
    Io,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::KeyLoad => "key load",
            Self::Signing => "signing",
            Self::Encryption => "encryption",
            Self::Decryption => "decryption",
            Self::Verification => "verification",
            Self::Encoding => "encoding",
            Self::Io => "io",
        };
        f.write_str(name)
    }
}

/// Errors from the end-to-end vault workflow, tagged by stage.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Loading a key file failed.
    #[error("key load failed: {0}")]
    KeyLoad(#[source] KeyError),

    /// Signing the plaintext failed.
    #[error("signing failed: {0}")]
    Signing(#[source] SignatureError),

    /// Envelope encryption failed.
    #[error("encryption failed: {0}")]
    Encryption(#[source] EnvelopeError),

    /// Envelope decryption failed.
    #[error("decryption failed: {0}")]
    Decryption(#[source] EnvelopeError),

    /// Signature verification failed after successful decryption.
    #[error("verification failed: {0}")]
    Verification(#[source] SignatureError),

    /// The vault container could not be encoded or decoded.
    #[error("vault encoding failed: {0}")]
    Encoding(#[from] CodecError),

    /// Reading the input or publishing the output failed.
    #[error("I/O failed for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkflowError {
    /// Stage at which the operation failed.
    pub fn stage(&self) -> Stage {
        match self {
            Self::KeyLoad(_) => Stage::KeyLoad,
            Self::Signing(_) => Stage::Signing,
            Self::Encryption(_) => Stage::Encryption,
            Self::Decryption(_) => Stage::Decryption,
            Self::Verification(_) => Stage::Verification,
            Self::Encoding(_) => Stage::Encoding,
            Self::Io { .. } => Stage::Io,
        }
    }

    /// Failure class of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::KeyLoad(e) => e.kind(),
            Self::Signing(e) | Self::Verification(e) => e.kind(),
            Self::Encryption(e) | Self::Decryption(e) => e.kind(),
            Self::Encoding(e) => e.kind(),
            Self::Io { .. } => ErrorKind::IoFailure,
        }
    }
}
