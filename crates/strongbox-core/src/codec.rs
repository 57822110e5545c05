//! On-disk vault container format.
//!
//! A vault file is pretty-printed JSON with a fixed field order:
//!
//! ```json
//! {
//!   "version": 1,
//!   "protected": { "enc": "A256GCM", "alg": "RSA-OAEP-256", "cty": "raw" },
//!   "recipients": [ { "kid": "…", "alg": "RSA-OAEP-256", "encrypted_key": "…" } ],
//!   "iv": "…",
//!   "ciphertext": "…",
//!   "tag": "…"
//! }
//! ```
//!
//! Binary fields are unpadded base64url. Decoding is all-or-nothing: the whole
//! document is checked before a [`VaultContainer`] is returned.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::b64;
use crate::crypto::{NONCE_LEN, TAG_LEN};
use crate::envelope::{
    ContentCipher, ContentType, FORMAT_VERSION, KeyWrapAlgorithm, ProtectedHeader, RecipientEntry,
    VaultContainer,
};
use crate::error::CodecError;

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireVault {
    version: u32,
    protected: WireHeader,
    recipients: Vec<WireRecipient>,
    iv: String,
    ciphertext: String,
    tag: String,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireHeader {
    enc: String,
    alg: String,
    cty: String,
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireRecipient {
    kid: String,
    alg: String,
    encrypted_key: String,
}

/// Encode a container as a vault document, newline-terminated.
///
/// Output is deterministic for a given container.
///
/// # Errors
///
/// Returns [`CodecError::Malformed`] if JSON serialization fails.
pub fn serialize(container: &VaultContainer) -> Result<Vec<u8>, CodecError> {
    let wire = WireVault {
        version: FORMAT_VERSION,
        protected: WireHeader {
            enc: container.header.cipher.id().to_owned(),
            alg: container.header.key_wrap.id().to_owned(),
            cty: container.header.content_type.id().to_owned(),
        },
        recipients: container
            .recipients
            .iter()
            .map(|r| WireRecipient {
                kid: r.kid.clone(),
                alg: r.algorithm.id().to_owned(),
                encrypted_key: b64::encode(&r.wrapped_key),
            })
            .collect(),
        iv: b64::encode(&container.nonce),
        ciphertext: b64::encode(&container.ciphertext),
        tag: b64::encode(&container.tag),
    };

    let mut out = serde_json::to_vec_pretty(&wire).map_err(|e| CodecError::Malformed {
        reason: format!("serialization failed: {e}"),
    })?;
    out.push(b'\n');
    Ok(out)
}

/// Decode a vault document.
///
/// # Errors
///
/// - [`CodecError::UnsupportedAlgorithm`] for an unknown `version`, `enc`,
///   `alg`, or `cty`.
/// - [`CodecError::Malformed`] for anything else that does not match the
///   schema: missing, extra, or ill-typed fields, invalid base64, wrong nonce
///   or tag length, no recipients, or a repeated recipient key id.
pub fn deserialize(bytes: &[u8]) -> Result<VaultContainer, CodecError> {
    let wire: WireVault = serde_json::from_slice(bytes).map_err(|e| malformed(e.to_string()))?;

    if wire.version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedAlgorithm {
            field: "version",
            value: wire.version.to_string(),
        });
    }

    let header = ProtectedHeader {
        cipher: ContentCipher::from_id(&wire.protected.enc)
            .ok_or_else(|| unsupported("enc", &wire.protected.enc))?,
        key_wrap: KeyWrapAlgorithm::from_id(&wire.protected.alg)
            .ok_or_else(|| unsupported("alg", &wire.protected.alg))?,
        content_type: ContentType::from_id(&wire.protected.cty)
            .ok_or_else(|| unsupported("cty", &wire.protected.cty))?,
    };

    if wire.recipients.is_empty() {
        return Err(malformed("recipient list is empty"));
    }

    let mut seen = HashSet::with_capacity(wire.recipients.len());
    let mut recipients = Vec::with_capacity(wire.recipients.len());
    for entry in wire.recipients {
        let algorithm = KeyWrapAlgorithm::from_id(&entry.alg)
            .ok_or_else(|| unsupported("recipient alg", &entry.alg))?;
        if entry.kid.is_empty() {
            return Err(malformed("recipient kid is empty"));
        }
        if !seen.insert(entry.kid.clone()) {
            return Err(malformed(format!("duplicate recipient kid {}", entry.kid)));
        }
        let wrapped_key = b64::decode("encrypted_key", &entry.encrypted_key).map_err(malformed)?;
        if wrapped_key.is_empty() {
            return Err(malformed("recipient encrypted_key is empty"));
        }
        recipients.push(RecipientEntry {
            kid: entry.kid,
            algorithm,
            wrapped_key,
        });
    }

    let nonce = fixed::<NONCE_LEN>("iv", &wire.iv)?;
    let tag = fixed::<TAG_LEN>("tag", &wire.tag)?;
    let ciphertext = b64::decode("ciphertext", &wire.ciphertext).map_err(malformed)?;

    Ok(VaultContainer {
        header,
        recipients,
        nonce,
        ciphertext,
        tag,
    })
}

fn fixed<const N: usize>(field: &str, value: &str) -> Result<[u8; N], CodecError> {
    let bytes = b64::decode(field, value).map_err(malformed)?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| malformed(format!("field '{field}' must be {N} bytes, got {len}")))
}

fn malformed(reason: impl Into<String>) -> CodecError {
    CodecError::Malformed {
        reason: reason.into(),
    }
}

fn unsupported(field: &'static str, value: &str) -> CodecError {
    CodecError::UnsupportedAlgorithm {
        field,
        value: value.to_owned(),
    }
}
