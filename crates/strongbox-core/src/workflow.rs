//! End-to-end vault operations.
//!
//! Signing always happens before encryption: [`encrypt_signed`] embeds the
//! signature block inside the encrypted payload, so it is visible only to
//! recipients. [`decrypt_verified`] reverses the order and reports decryption
//! and verification failures through different [`WorkflowError`] variants,
//! which lets a caller tell a wrong key apart from a spoofed signer.
//!
//! The `*_file` variants add key loading, vault encoding, and atomic output.
//! They write nothing unless the whole operation succeeds.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::codec;
use crate::envelope::{self, ContentType, VaultContainer};
use crate::error::{SignatureError, WorkflowError};
use crate::keys::{self, KeyRecord, KeyRole};
use crate::persist::{self, Overwrite, Visibility};
use crate::signature::{self, SignatureBlock};

/// Leading bytes of a signed-payload frame.
const FRAME_MAGIC: &[u8] = b"SBSIG1";

/// Encrypt `plaintext` for `recipients` without a signature.
///
/// # Errors
///
/// Returns [`WorkflowError::Encryption`] for any envelope failure.
pub fn encrypt(
    plaintext: &[u8],
    recipients: &[&KeyRecord],
) -> Result<VaultContainer, WorkflowError> {
    envelope::encrypt(plaintext, recipients).map_err(WorkflowError::Encryption)
}

/// Sign `plaintext` with `sender`, then encrypt the signed payload.
///
/// # Errors
///
/// - [`WorkflowError::Signing`] if `sender` is not a usable private key.
/// - [`WorkflowError::Encryption`] for any envelope failure.
pub fn encrypt_signed(
    plaintext: &[u8],
    sender: &KeyRecord,
    recipients: &[&KeyRecord],
) -> Result<VaultContainer, WorkflowError> {
    envelope::check_recipients(recipients).map_err(WorkflowError::Encryption)?;
    let block = signature::sign(plaintext, sender).map_err(WorkflowError::Signing)?;
    let framed = frame(&block, plaintext).map_err(WorkflowError::Signing)?;
    let container = envelope::encrypt_as(&framed, ContentType::Signed, recipients)
        .map_err(WorkflowError::Encryption)?;
    info!(signer = sender.owner(), "sealed signed payload");
    Ok(container)
}

/// Decrypt a container without checking any signature.
///
/// A signed container has its signature frame stripped and a warning logged.
///
/// # Errors
///
/// - [`WorkflowError::Decryption`] for any envelope failure.
/// - [`WorkflowError::Verification`] if a signed payload cannot be unframed.
pub fn decrypt(
    container: &VaultContainer,
    private_key: &KeyRecord,
) -> Result<Vec<u8>, WorkflowError> {
    let payload = Zeroizing::new(
        envelope::decrypt(container, private_key).map_err(WorkflowError::Decryption)?,
    );
    match container.header.content_type {
        ContentType::Raw => Ok(payload.to_vec()),
        ContentType::Signed => {
            let (block, plaintext) = unframe(&payload).map_err(WorkflowError::Verification)?;
            warn!(
                signer = %block.signer,
                "payload is signed but the signature was not verified"
            );
            Ok(plaintext.to_vec())
        }
    }
}

/// Decrypt a container and verify that `sender` signed its payload.
///
/// # Errors
///
/// - [`WorkflowError::Decryption`] if the payload cannot be recovered.
/// - [`WorkflowError::Verification`] if `sender` is not an unexpired public
///   key, the container is unsigned, was signed by another key, or the
///   signature does not match the payload.
pub fn decrypt_verified(
    container: &VaultContainer,
    private_key: &KeyRecord,
    sender: &KeyRecord,
) -> Result<Vec<u8>, WorkflowError> {
    sender
        .require_role(KeyRole::Public)
        .map_err(|e| WorkflowError::Verification(e.into()))?;
    keys::validate(sender).map_err(|e| WorkflowError::Verification(e.into()))?;

    let payload = Zeroizing::new(
        envelope::decrypt(container, private_key).map_err(WorkflowError::Decryption)?,
    );
    if container.header.content_type != ContentType::Signed {
        return Err(WorkflowError::Verification(SignatureError::InvalidSignature));
    }

    let (block, plaintext) = unframe(&payload).map_err(WorkflowError::Verification)?;
    if block.signer != sender.kid() {
        return Err(WorkflowError::Verification(SignatureError::InvalidSignature));
    }
    signature::verify(plaintext, &block, sender).map_err(WorkflowError::Verification)?;

    info!(signer = sender.owner(), "signature verified");
    Ok(plaintext.to_vec())
}

/// Outcome of [`encrypt_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptReport {
    pub output: PathBuf,
    pub recipients: Vec<String>,
    pub signed_by: Option<String>,
}

/// Outcome of [`decrypt_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptReport {
    pub output: PathBuf,
    pub bytes: usize,
    pub verified_signer: Option<String>,
}

/// Encrypt the file at `input` for the public key files in `recipients`,
/// optionally signing with the private key file `signer`, and publish the
/// vault at `output`.
///
/// # Errors
///
/// Any [`WorkflowError`]; the stage says which step failed. `output` is left
/// untouched on failure.
pub fn encrypt_file(
    input: &Path,
    recipients: &[PathBuf],
    signer: Option<&Path>,
    output: &Path,
) -> Result<EncryptReport, WorkflowError> {
    let recipient_keys = recipients
        .iter()
        .map(|path| load_key(path, KeyRole::Public))
        .collect::<Result<Vec<_>, _>>()?;
    let signer_key = signer.map(|path| load_key(path, KeyRole::Private)).transpose()?;

    let plaintext = Zeroizing::new(read(input)?);
    let refs: Vec<&KeyRecord> = recipient_keys.iter().collect();
    let container = match &signer_key {
        Some(sender) => encrypt_signed(&plaintext, sender, &refs)?,
        None => encrypt(&plaintext, &refs)?,
    };

    let encoded = codec::serialize(&container)?;
    write(output, &encoded)?;

    info!(
        input = %input.display(),
        output = %output.display(),
        recipients = refs.len(),
        signed = signer_key.is_some(),
        "wrote vault"
    );
    Ok(EncryptReport {
        output: output.to_path_buf(),
        recipients: recipient_keys.iter().map(|k| k.owner().to_owned()).collect(),
        signed_by: signer_key.map(|k| k.owner().to_owned()),
    })
}

/// Decrypt the vault at `input` with the private key file `private_key`,
/// optionally verifying the signature against the public key file `sender`,
/// and publish the plaintext at `output`.
///
/// # Errors
///
/// Any [`WorkflowError`]; the stage says which step failed. No plaintext is
/// written unless decryption and any requested verification succeed.
pub fn decrypt_file(
    input: &Path,
    private_key: &Path,
    sender: Option<&Path>,
    output: &Path,
) -> Result<DecryptReport, WorkflowError> {
    let key = load_key(private_key, KeyRole::Private)?;
    let sender_key = sender.map(|path| load_key(path, KeyRole::Public)).transpose()?;

    let container = codec::deserialize(&read(input)?)?;
    let plaintext = Zeroizing::new(match &sender_key {
        Some(sender) => decrypt_verified(&container, &key, sender)?,
        None => decrypt(&container, &key)?,
    });

    write(output, &plaintext)?;

    info!(
        input = %input.display(),
        output = %output.display(),
        bytes = plaintext.len(),
        verified = sender_key.is_some(),
        "recovered plaintext"
    );
    Ok(DecryptReport {
        output: output.to_path_buf(),
        bytes: plaintext.len(),
        verified_signer: sender_key.map(|k| k.owner().to_owned()),
    })
}

fn load_key(path: &Path, role: KeyRole) -> Result<KeyRecord, WorkflowError> {
    let record = keys::load(path).map_err(WorkflowError::KeyLoad)?;
    record.require_role(role).map_err(WorkflowError::KeyLoad)?;
    Ok(record)
}

fn read(path: &Path) -> Result<Vec<u8>, WorkflowError> {
    fs::read(path).map_err(|source| WorkflowError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn write(path: &Path, contents: &[u8]) -> Result<(), WorkflowError> {
    persist::write_atomic(path, contents, Visibility::Shared, Overwrite::Replace).map_err(
        |source| WorkflowError::Io {
            path: path.to_path_buf(),
            source,
        },
    )
}

/// `MAGIC || u32_be(len) || signature_json || plaintext`.
fn frame(block: &SignatureBlock, plaintext: &[u8]) -> Result<Zeroizing<Vec<u8>>, SignatureError> {
    let encoded = block.to_json()?;
    let len = u32::try_from(encoded.len()).map_err(|_| SignatureError::Signing {
        reason: "signature block too large".to_owned(),
    })?;

    let mut out = Vec::with_capacity(FRAME_MAGIC.len() + 4 + encoded.len() + plaintext.len());
    out.extend_from_slice(FRAME_MAGIC);
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&encoded);
    out.extend_from_slice(plaintext);
    Ok(Zeroizing::new(out))
}

/// Split a frame into its signature block and the signed bytes.
fn unframe(payload: &[u8]) -> Result<(SignatureBlock, &[u8]), SignatureError> {
    let rest = payload
        .strip_prefix(FRAME_MAGIC)
        .ok_or(SignatureError::InvalidSignature)?;
    let (len, rest) = rest
        .split_first_chunk::<4>()
        .ok_or(SignatureError::InvalidSignature)?;
    let len = usize::try_from(u32::from_be_bytes(*len))
        .map_err(|_| SignatureError::InvalidSignature)?;
    if len > rest.len() {
        return Err(SignatureError::InvalidSignature);
    }
    let (encoded, plaintext) = rest.split_at(len);
    Ok((SignatureBlock::from_json(encoded)?, plaintext))
}
