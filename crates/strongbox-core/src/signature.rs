//! Detached RSA signatures over arbitrary payloads.
//!
//! Signatures are RSASSA-PKCS1-v1_5 over SHA-256 (`RS256`), which is
//! deterministic for a given key and payload. A [`SignatureBlock`] records the
//! algorithm and the signer's key id next to the signature bytes.
//!
//! Verification failures are uniform: a wrong key, a modified
//! payload, an unknown algorithm, and corrupted signature bytes all surface as
//! [`SignatureError::InvalidSignature`].

use std::fmt;

use rsa::pkcs1v15::{Signature, SigningKey, VerifyingKey};
use rsa::signature::{SignatureEncoding, Signer, Verifier};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use crate::b64;
use crate::error::SignatureError;
use crate::keys::{self, KeyRecord, KeyRole};

/// Signature algorithm identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignatureAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256.
    #[serde(rename = "RS256")]
    Rs256,
}

impl fmt::Display for SignatureAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rs256 => f.write_str("RS256"),
        }
    }
}

/// A signature bound to the exact bytes it was computed over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureBlock {
    pub algorithm: SignatureAlgorithm,
    /// Key id of the signer's key pair.
    pub signer: String,
    pub signature: Vec<u8>,
}

impl SignatureBlock {
    /// Encode as compact JSON: `{"alg":…,"kid":…,"signature":…}`.
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::Signing`] if JSON serialization fails.
    pub fn to_json(&self) -> Result<Vec<u8>, SignatureError> {
        let wire = WireSignature {
            alg: self.algorithm.to_string(),
            kid: self.signer.clone(),
            signature: b64::encode(&self.signature),
        };
        serde_json::to_vec(&wire).map_err(|e| SignatureError::Signing {
            reason: format!("signature block serialization failed: {e}"),
        })
    }

    /// Decode a block produced by [`SignatureBlock::to_json`].
    ///
    /// # Errors
    ///
    /// Returns [`SignatureError::InvalidSignature`] for anything that does not
    /// parse, including unknown algorithm ids.
    pub fn from_json(bytes: &[u8]) -> Result<Self, SignatureError> {
        let wire: WireSignature =
            serde_json::from_slice(bytes).map_err(|_| SignatureError::InvalidSignature)?;
        let algorithm = match wire.alg.as_str() {
            "RS256" => SignatureAlgorithm::Rs256,
            _ => return Err(SignatureError::InvalidSignature),
        };
        let signature = b64::decode("signature", &wire.signature)
            .map_err(|_| SignatureError::InvalidSignature)?;
        Ok(Self {
            algorithm,
            signer: wire.kid,
            signature,
        })
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct WireSignature {
    alg: String,
    kid: String,
    signature: String,
}

/// Sign `payload` with a private key record.
///
/// # Errors
///
/// - [`SignatureError::Key`] if the record is public or expired.
/// - [`SignatureError::Signing`] if the primitive fails.
pub fn sign(payload: &[u8], private_key: &KeyRecord) -> Result<SignatureBlock, SignatureError> {
    private_key.require_role(KeyRole::Private)?;
    keys::validate(private_key)?;

    let signing_key = SigningKey::<Sha256>::new(private_key.private_key()?.clone());
    let signature = signing_key
        .try_sign(payload)
        .map_err(|e| SignatureError::Signing {
            reason: e.to_string(),
        })?;

    debug!(signer = private_key.kid(), bytes = payload.len(), "signed payload");

    Ok(SignatureBlock {
        algorithm: SignatureAlgorithm::Rs256,
        signer: private_key.kid().to_owned(),
        signature: signature.to_vec(),
    })
}

/// Verify `signature` over `payload` against a public key record.
///
/// # Errors
///
/// - [`SignatureError::Key`] if the record is private or expired.
/// - [`SignatureError::InvalidSignature`] on any mismatch.
pub fn verify(
    payload: &[u8],
    signature: &SignatureBlock,
    public_key: &KeyRecord,
) -> Result<(), SignatureError> {
    public_key.require_role(KeyRole::Public)?;
    keys::validate(public_key)?;

    match signature.algorithm {
        SignatureAlgorithm::Rs256 => {}
    }

    let verifying_key = VerifyingKey::<Sha256>::new(public_key.public_key().clone());
    let parsed = Signature::try_from(signature.signature.as_slice())
        .map_err(|_| SignatureError::InvalidSignature)?;
    verifying_key
        .verify(payload, &parsed)
        .map_err(|_| SignatureError::InvalidSignature)?;

    debug!(signer = public_key.kid(), "signature verified");
    Ok(())
}
