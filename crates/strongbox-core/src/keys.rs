//! Key records: generation, key files, and expiry validation.
//!
//! A [`KeyRecord`] is one view (public or private) of an RSA-2048 key pair,
//! stamped with its owner, creation time, and expiry time. Records are
//! immutable once built. Every consumer checks expiry through [`validate`]
//! immediately before using a record, so an expired key can never reach a
//! cryptographic primitive.
//!
//! Key files use an explicit schema owned by this module (`KeyFile` below).
//! The `rsa` crate's own encodings never appear on disk, so the primitives
//! library can change without invalidating key files.
//!
//! ```json
//! {
//!   "owner": "alice",
//!   "role": "private",
//!   "algorithm": "RSA-2048",
//!   "created_at": "2026-10-19T10:00:00Z",
//!   "expires_at": "2026-11-18T10:00:00Z",
//!   "key_data": { "kid": "…", "modulus": "…", "public_exponent": "…",
//!                 "private_exponent": "…", "primes": ["…", "…"] }
//! }
//! ```

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, SubsecRound, Utc};
use rsa::traits::{PrivateKeyParts, PublicKeyParts};
use rsa::{BigUint, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::b64;
use crate::crypto::{self, OsRng};
use crate::error::KeyError;
use crate::persist::{self, Overwrite, Visibility};

/// RSA modulus size for every generated and accepted key.
pub const MODULUS_BITS: usize = 2048;

/// Validity period used when the caller does not choose one.
pub const DEFAULT_VALIDITY_DAYS: u32 = 30;

/// Longest owner name accepted (owner names become file names).
const MAX_OWNER_LEN: usize = 64;

/// Which half of a key pair a record holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyRole {
    Public,
    Private,
}

impl fmt::Display for KeyRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Public => f.write_str("public"),
            Self::Private => f.write_str("private"),
        }
    }
}

/// Key algorithm identifier. Only one is supported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAlgorithm {
    /// RSA with a 2048-bit modulus, used for OAEP key wrapping and
    /// PKCS#1 v1.5 signatures.
    #[serde(rename = "RSA-2048")]
    Rsa2048,
}

impl fmt::Display for KeyAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa2048 => f.write_str("RSA-2048"),
        }
    }
}

#[derive(Clone)]
enum KeyMaterial {
    Public(RsaPublicKey),
    Private {
        public: RsaPublicKey,
        private: RsaPrivateKey,
    },
}

/// One validated view of an RSA key pair.
///
/// A private record holds everything the matching public record holds, plus
/// the private exponent and primes.
#[derive(Clone)]
pub struct KeyRecord {
    owner: String,
    algorithm: KeyAlgorithm,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    kid: String,
    material: KeyMaterial,
}

impl KeyRecord {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn role(&self) -> KeyRole {
        match self.material {
            KeyMaterial::Public(_) => KeyRole::Public,
            KeyMaterial::Private { .. } => KeyRole::Private,
        }
    }

    pub fn algorithm(&self) -> KeyAlgorithm {
        self.algorithm
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Fingerprint of the public half; identical for both views of a pair.
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Whether the record is expired at `now` (strictly after `expires_at`).
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The RSA public key. Available from both views.
    pub fn public_key(&self) -> &RsaPublicKey {
        match &self.material {
            KeyMaterial::Public(public) | KeyMaterial::Private { public, .. } => public,
        }
    }

    /// The RSA private key.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::WrongRole`] for a public record.
    pub fn private_key(&self) -> Result<&RsaPrivateKey, KeyError> {
        match &self.material {
            KeyMaterial::Private { private, .. } => Ok(private),
            KeyMaterial::Public(_) => Err(self.wrong_role(KeyRole::Private)),
        }
    }

    /// Require this record to have the given role.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::WrongRole`] on mismatch.
    pub fn require_role(&self, role: KeyRole) -> Result<(), KeyError> {
        if self.role() == role {
            Ok(())
        } else {
            Err(self.wrong_role(role))
        }
    }

    /// Derive the public view of this record.
    #[must_use]
    pub fn to_public(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            algorithm: self.algorithm,
            created_at: self.created_at,
            expires_at: self.expires_at,
            kid: self.kid.clone(),
            material: KeyMaterial::Public(self.public_key().clone()),
        }
    }

    /// Serialize to the key file schema (pretty JSON).
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Malformed`] if JSON serialization fails.
    pub fn to_json(&self) -> Result<Zeroizing<String>, KeyError> {
        let file = self.to_file();
        let mut json = serde_json::to_string_pretty(&file).map_err(|e| KeyError::Malformed {
            reason: format!("serialization failed: {e}"),
        })?;
        json.push('\n');
        Ok(Zeroizing::new(json))
    }

    /// Parse and structurally validate a key file. Expiry is NOT checked.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Malformed`] if fields are missing, unknown, or
    /// ill-typed, or if the key material is inconsistent.
    pub fn from_json(bytes: &[u8]) -> Result<Self, KeyError> {
        let file: KeyFile = serde_json::from_slice(bytes).map_err(|e| KeyError::Malformed {
            reason: e.to_string(),
        })?;
        Self::from_file(file)
    }

    fn from_file(file: KeyFile) -> Result<Self, KeyError> {
        let KeyFile {
            owner,
            role,
            algorithm,
            created_at,
            expires_at,
            key_data,
        } = file;

        validate_owner(&owner).map_err(|reason| malformed(format!("owner: {reason}")))?;
        if created_at > expires_at {
            return Err(malformed("created_at is later than expires_at"));
        }

        let n = decode_uint("modulus", &key_data.modulus)?;
        let e = decode_uint("public_exponent", &key_data.public_exponent)?;
        let public = RsaPublicKey::new(n.clone(), e.clone())
            .map_err(|err| malformed(format!("invalid public key: {err}")))?;
        if public.n().bits() != MODULUS_BITS {
            return Err(malformed(format!(
                "modulus is {} bits, expected {MODULUS_BITS}",
                public.n().bits()
            )));
        }

        let kid = crypto::fingerprint(&public);
        if kid != key_data.kid {
            return Err(malformed("kid does not match key material"));
        }

        let inferred = if key_data.private_exponent.is_some() {
            KeyRole::Private
        } else {
            KeyRole::Public
        };
        let material = match (role.unwrap_or(inferred), &key_data.private_exponent) {
            (KeyRole::Public, None) => {
                if !key_data.primes.is_empty() {
                    return Err(malformed("public key record carries primes"));
                }
                KeyMaterial::Public(public)
            }
            (KeyRole::Public, Some(_)) => {
                return Err(malformed("public key record carries a private exponent"));
            }
            (KeyRole::Private, None) => {
                return Err(malformed("private key record is missing private_exponent"));
            }
            (KeyRole::Private, Some(d)) => {
                if key_data.primes.len() < 2 {
                    return Err(malformed("private key record needs at least two primes"));
                }
                let d = decode_uint("private_exponent", d)?;
                let primes = key_data
                    .primes
                    .iter()
                    .map(|p| decode_uint("primes", p))
                    .collect::<Result<Vec<_>, _>>()?;
                let mut private = RsaPrivateKey::from_components(n, e, d, primes)
                    .map_err(|err| malformed(format!("invalid private key: {err}")))?;
                private
                    .validate()
                    .map_err(|err| malformed(format!("inconsistent private key: {err}")))?;
                private
                    .precompute()
                    .map_err(|err| malformed(format!("inconsistent private key: {err}")))?;
                KeyMaterial::Private { public, private }
            }
        };

        Ok(Self {
            owner,
            algorithm,
            created_at,
            expires_at,
            kid,
            material,
        })
    }

    fn to_file(&self) -> KeyFile {
        let public = self.public_key();
        let (private_exponent, primes) = match &self.material {
            KeyMaterial::Public(_) => (None, Vec::new()),
            KeyMaterial::Private { private, .. } => (
                Some(encode_uint(private.d())),
                private.primes().iter().map(encode_uint).collect(),
            ),
        };
        KeyFile {
            owner: self.owner.clone(),
            role: Some(self.role()),
            algorithm: self.algorithm,
            created_at: self.created_at,
            expires_at: self.expires_at,
            key_data: KeyData {
                kid: self.kid.clone(),
                modulus: encode_uint(public.n()),
                public_exponent: encode_uint(public.e()),
                private_exponent,
                primes,
            },
        }
    }

    fn wrong_role(&self, expected: KeyRole) -> KeyError {
        KeyError::WrongRole {
            owner: self.owner.clone(),
            expected,
            actual: self.role(),
        }
    }
}

impl fmt::Debug for KeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyRecord")
            .field("owner", &self.owner)
            .field("role", &self.role())
            .field("kid", &self.kid)
            .field("expires_at", &self.expires_at)
            .finish_non_exhaustive()
    }
}

/// Both views of a freshly generated key pair.
#[derive(Debug, Clone)]
pub struct KeyPair {
    pub public: KeyRecord,
    pub private: KeyRecord,
}

/// Paths written by [`KeyPair::write_to`].
#[derive(Debug, Clone)]
pub struct KeyPairPaths {
    pub public: PathBuf,
    pub private: PathBuf,
}

impl KeyPair {
    /// Write `<owner>_private.json` and `<owner>_public.json` into `dir`.
    ///
    /// Both files are published atomically; the private file is readable by
    /// the owner only. Unless `overwrite` is set, existing key files are left
    /// untouched and the call fails.
    ///
    /// The public file is written first, so an existing private key is only
    /// replaced once its new public half is already in place.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::Io`] if either file cannot be written. If the
    /// private file fails, the public file is put back the way it was.
    pub fn write_to(&self, dir: &Path, overwrite: bool) -> Result<KeyPairPaths, KeyError> {
        let mode = if overwrite {
            Overwrite::Replace
        } else {
            Overwrite::Refuse
        };
        let owner = self.private.owner();
        let private_path = dir.join(private_key_file_name(owner));
        let public_path = dir.join(public_key_file_name(owner));

        let private_json = self.private.to_json()?;
        let public_json = self.public.to_json()?;
        let previous_public = match mode {
            Overwrite::Replace => fs::read(&public_path).ok(),
            Overwrite::Refuse => None,
        };

        persist::write_atomic(&public_path, public_json.as_bytes(), Visibility::Shared, mode)
            .map_err(|source| KeyError::Io {
                path: public_path.clone(),
                source,
            })?;
        if let Err(source) = persist::write_atomic(
            &private_path,
            private_json.as_bytes(),
            Visibility::OwnerOnly,
            mode,
        ) {
            let restored = match previous_public {
                Some(old) => persist::write_atomic(
                    &public_path,
                    &old,
                    Visibility::Shared,
                    Overwrite::Replace,
                ),
                None => fs::remove_file(&public_path),
            };
            if let Err(err) = restored {
                warn!(
                    path = %public_path.display(),
                    error = %err,
                    "could not roll back public key file"
                );
            }
            return Err(KeyError::Io {
                path: private_path,
                source,
            });
        }

        info!(owner, path = %private_path.display(), "wrote key pair");
        Ok(KeyPairPaths {
            public: public_path,
            private: private_path,
        })
    }
}

/// File name of the private key file for `owner`.
pub fn private_key_file_name(owner: &str) -> String {
    format!("{owner}_private.json")
}

/// File name of the public key file for `owner`.
pub fn public_key_file_name(owner: &str) -> String {
    format!("{owner}_public.json")
}

/// Generate a fresh RSA-2048 key pair valid for `validity_days` from now.
///
/// # Errors
///
/// Returns [`KeyError::InvalidOwner`] for an unusable owner name and
/// [`KeyError::Generation`] if the primitive fails.
pub fn generate(owner: &str, validity_days: u32) -> Result<KeyPair, KeyError> {
    generate_at(owner, Duration::days(i64::from(validity_days)), Utc::now())
}

/// Generate a key pair as if the current time were `now`.
///
/// # Errors
///
/// Same as [`generate`]; also fails with [`KeyError::Generation`] for a
/// negative or overflowing validity period.
pub fn generate_at(
    owner: &str,
    validity: Duration,
    now: DateTime<Utc>,
) -> Result<KeyPair, KeyError> {
    validate_owner(owner).map_err(|reason| KeyError::InvalidOwner {
        owner: owner.to_owned(),
        reason,
    })?;
    if validity < Duration::zero() {
        return Err(KeyError::Generation {
            reason: "validity period must not be negative".to_owned(),
        });
    }

    let created_at = now.trunc_subsecs(0);
    let expires_at = created_at
        .checked_add_signed(validity)
        .ok_or_else(|| KeyError::Generation {
            reason: "validity period overflows the calendar".to_owned(),
        })?;

    let private = RsaPrivateKey::new(&mut OsRng, MODULUS_BITS).map_err(|e| {
        KeyError::Generation {
            reason: e.to_string(),
        }
    })?;
    let public = private.to_public_key();
    let kid = crypto::fingerprint(&public);

    info!(owner, kid = %kid, expires_at = %expires_at, "generated key pair");

    let private = KeyRecord {
        owner: owner.to_owned(),
        algorithm: KeyAlgorithm::Rsa2048,
        created_at,
        expires_at,
        kid,
        material: KeyMaterial::Private { public, private },
    };
    Ok(KeyPair {
        public: private.to_public(),
        private,
    })
}

/// Load a key file and check that it has not expired.
///
/// # Errors
///
/// - [`KeyError::NotFound`] if `path` is not a regular file.
/// - [`KeyError::Malformed`] if the record fails structural validation.
/// - [`KeyError::Expired`] if the record is past its expiry.
/// - [`KeyError::Io`] if the file cannot be read.
pub fn load(path: &Path) -> Result<KeyRecord, KeyError> {
    let record = read_record(path)?;
    validate(&record)?;
    debug!(owner = record.owner(), role = %record.role(), kid = record.kid(), "loaded key");
    Ok(record)
}

/// Load a key file without rejecting an expired record.
///
/// For diagnostics only; the result must still pass [`validate`] before it
/// is used for any cryptographic operation.
///
/// # Errors
///
/// Same as [`load`], minus [`KeyError::Expired`].
pub fn inspect(path: &Path) -> Result<KeyRecord, KeyError> {
    read_record(path)
}

/// Check the expiry invariant against the current time.
///
/// # Errors
///
/// Returns [`KeyError::Expired`] if `now > expires_at`.
pub fn validate(record: &KeyRecord) -> Result<&KeyRecord, KeyError> {
    validate_at(record, Utc::now())
}

/// Check the expiry invariant against `now`.
///
/// # Errors
///
/// Returns [`KeyError::Expired`] if `now > expires_at`.
pub fn validate_at(record: &KeyRecord, now: DateTime<Utc>) -> Result<&KeyRecord, KeyError> {
    if record.is_expired_at(now) {
        return Err(KeyError::Expired {
            owner: record.owner.clone(),
            expired_at: record.expires_at.to_rfc3339(),
        });
    }
    Ok(record)
}

fn read_record(path: &Path) -> Result<KeyRecord, KeyError> {
    match fs::metadata(path) {
        Ok(meta) if meta.is_file() => {}
        Ok(_) => {
            return Err(KeyError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            return Err(KeyError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(KeyError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    let bytes = Zeroizing::new(fs::read(path).map_err(|source| KeyError::Io {
        path: path.to_path_buf(),
        source,
    })?);
    KeyRecord::from_json(&bytes)
}

/// Owner names become file names, so keep them boring.
fn validate_owner(owner: &str) -> Result<(), String> {
    if owner.is_empty() {
        return Err("must not be empty".to_owned());
    }
    if owner.len() > MAX_OWNER_LEN {
        return Err(format!("must be at most {MAX_OWNER_LEN} characters"));
    }
    if owner.starts_with('.') {
        return Err("must not start with '.'".to_owned());
    }
    if let Some(c) = owner
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(format!("character {c:?} is not allowed"));
    }
    Ok(())
}

fn malformed(reason: impl Into<String>) -> KeyError {
    KeyError::Malformed {
        reason: reason.into(),
    }
}

fn decode_uint(field: &str, value: &str) -> Result<BigUint, KeyError> {
    let bytes = Zeroizing::new(b64::decode(field, value).map_err(malformed)?);
    if bytes.is_empty() {
        return Err(malformed(format!("field '{field}' is empty")));
    }
    Ok(BigUint::from_bytes_be(&bytes))
}

fn encode_uint(value: &BigUint) -> String {
    let bytes = Zeroizing::new(value.to_bytes_be());
    b64::encode(&bytes)
}

/// On-disk key file. Conversion to and from [`KeyRecord`] is the only place
/// the file layout is known.
#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct KeyFile {
    owner: String,
    /// Optional on input (inferred from the presence of private fields),
    /// always written on output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<KeyRole>,
    #[serde(default = "default_algorithm")]
    algorithm: KeyAlgorithm,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    key_data: KeyData,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(deny_unknown_fields)]
struct KeyData {
    kid: String,
    modulus: String,
    public_exponent: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    private_exponent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    primes: Vec<String>,
}

fn default_algorithm() -> KeyAlgorithm {
    KeyAlgorithm::Rsa2048
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{alice, bob, carol, expired};

    fn rewrite(record: &KeyRecord, edit: impl FnOnce(&mut serde_json::Value)) -> Vec<u8> {
        let mut value: serde_json::Value =
            serde_json::from_str(record.to_json().unwrap().as_str()).unwrap();
        edit(&mut value);
        serde_json::to_vec(&value).unwrap()
    }

    #[test]
    fn generate_stamps_owner_and_expiry() {
        let now = Utc::now();
        let pair = generate_at("carol", Duration::days(30), now).unwrap();
        assert_eq!(pair.private.owner(), "carol");
        assert_eq!(pair.private.role(), KeyRole::Private);
        assert_eq!(pair.public.role(), KeyRole::Public);
        assert_eq!(pair.public.kid(), pair.private.kid());
        assert_eq!(
            pair.private.expires_at() - pair.private.created_at(),
            Duration::days(30)
        );
        assert_eq!(pair.public.public_key().n().bits(), MODULUS_BITS);
    }

    #[test]
    fn generate_twice_gives_different_material() {
        assert_ne!(alice().public.kid(), bob().public.kid());
        assert_ne!(
            alice().public.public_key().n(),
            bob().public.public_key().n()
        );
    }

    #[test]
    fn generate_rejects_bad_owner_names() {
        for owner in ["", "../etc", ".hidden", "a b", "x/y"] {
            let err = generate(owner, 30).unwrap_err();
            assert!(matches!(err, KeyError::InvalidOwner { .. }), "{owner:?}");
            assert_eq!(err.kind(), ErrorKind::KeyGenerationFailure);
        }
    }

    #[test]
    fn generate_rejects_negative_validity() {
        let err = generate_at("dave", Duration::days(-1), Utc::now()).unwrap_err();
        assert!(matches!(err, KeyError::Generation { .. }));
    }

    #[test]
    fn private_json_roundtrip_preserves_record() {
        let original = &alice().private;
        let parsed = KeyRecord::from_json(original.to_json().unwrap().as_bytes()).unwrap();
        assert_eq!(parsed.owner(), original.owner());
        assert_eq!(parsed.role(), KeyRole::Private);
        assert_eq!(parsed.kid(), original.kid());
        assert_eq!(parsed.expires_at(), original.expires_at());
        assert_eq!(
            parsed.private_key().unwrap().d(),
            original.private_key().unwrap().d()
        );
    }

    #[test]
    fn public_json_has_no_private_fields() {
        let json = alice().public.to_json().unwrap();
        assert!(json.contains("\"role\": \"public\""));
        assert!(!json.contains("private_exponent"));
        assert!(!json.contains("primes"));
    }

    #[test]
    fn role_is_inferred_when_absent() {
        let bytes = rewrite(&alice().public, |v| {
            v.as_object_mut().unwrap().remove("role");
        });
        assert_eq!(KeyRecord::from_json(&bytes).unwrap().role(), KeyRole::Public);
    }

    #[test]
    fn public_record_with_private_exponent_is_malformed() {
        let private = alice().private.to_json().unwrap();
        let private: serde_json::Value = serde_json::from_str(&private).unwrap();
        let bytes = rewrite(&alice().public, |v| {
            v["key_data"]["private_exponent"] = private["key_data"]["private_exponent"].clone();
        });
        let err = KeyRecord::from_json(&bytes).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyMalformed);
    }

    #[test]
    fn private_record_without_private_fields_is_malformed() {
        let bytes = rewrite(&alice().private, |v| {
            let data = v["key_data"].as_object_mut().unwrap();
            data.remove("private_exponent");
            data.remove("primes");
        });
        assert_eq!(
            KeyRecord::from_json(&bytes).unwrap_err().kind(),
            ErrorKind::KeyMalformed
        );
    }

    #[test]
    fn missing_field_is_malformed() {
        let bytes = rewrite(&alice().public, |v| {
            v.as_object_mut().unwrap().remove("expires_at");
        });
        assert!(matches!(
            KeyRecord::from_json(&bytes),
            Err(KeyError::Malformed { .. })
        ));
    }

    #[test]
    fn unknown_field_is_malformed() {
        let bytes = rewrite(&alice().public, |v| {
            v["comment"] = serde_json::json!("hello");
        });
        assert!(matches!(
            KeyRecord::from_json(&bytes),
            Err(KeyError::Malformed { .. })
        ));
    }

    #[test]
    fn kid_mismatch_is_malformed() {
        let bytes = rewrite(&alice().public, |v| {
            v["key_data"]["kid"] = serde_json::json!(bob().public.kid());
        });
        assert!(matches!(
            KeyRecord::from_json(&bytes),
            Err(KeyError::Malformed { .. })
        ));
    }

    #[test]
    fn swapped_modulus_is_malformed() {
        let bob_json: serde_json::Value =
            serde_json::from_str(&bob().private.to_json().unwrap()).unwrap();
        let bytes = rewrite(&alice().private, |v| {
            v["key_data"]["modulus"] = bob_json["key_data"]["modulus"].clone();
            v["key_data"]["kid"] = serde_json::json!(bob().public.kid());
        });
        assert!(matches!(
            KeyRecord::from_json(&bytes),
            Err(KeyError::Malformed { .. })
        ));
    }

    #[test]
    fn short_modulus_is_malformed() {
        let short = RsaPrivateKey::new(&mut OsRng, MODULUS_BITS - 1).unwrap();
        let public = short.to_public_key();
        assert_eq!(public.size() * 8, MODULUS_BITS);
        let bytes = rewrite(&alice().public, |v| {
            v["key_data"]["modulus"] = serde_json::json!(encode_uint(public.n()));
            v["key_data"]["public_exponent"] = serde_json::json!(encode_uint(public.e()));
            v["key_data"]["kid"] = serde_json::json!(crypto::fingerprint(&public));
        });
        assert!(matches!(
            KeyRecord::from_json(&bytes),
            Err(KeyError::Malformed { .. })
        ));
    }

    #[test]
    fn validate_rejects_expired_record() {
        let err = validate(&expired().public).unwrap_err();
        assert!(matches!(err, KeyError::Expired { .. }));
        assert_eq!(err.kind(), ErrorKind::KeyExpired);
    }

    #[test]
    fn validate_at_boundary_is_inclusive() {
        let record = &alice().public;
        assert!(validate_at(record, record.expires_at()).is_ok());
        assert!(validate_at(record, record.expires_at() + Duration::seconds(1)).is_err());
    }

    #[test]
    fn private_key_on_public_record_is_wrong_role() {
        let err = alice().public.private_key().unwrap_err();
        assert!(matches!(
            err,
            KeyError::WrongRole {
                expected: KeyRole::Private,
                actual: KeyRole::Public,
                ..
            }
        ));
    }

    #[test]
    fn write_and_load_pair() {
        let dir = tempfile::tempdir().unwrap();
        let paths = alice().write_to(dir.path(), false).unwrap();
        assert!(paths.private.ends_with("alice_private.json"));
        assert!(paths.public.ends_with("alice_public.json"));

        let private = load(&paths.private).unwrap();
        let public = load(&paths.public).unwrap();
        assert_eq!(private.kid(), alice().private.kid());
        assert_eq!(public.role(), KeyRole::Public);
    }

    #[test]
    fn write_refuses_to_clobber_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        alice().write_to(dir.path(), false).unwrap();
        let err = alice().write_to(dir.path(), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert!(alice().write_to(dir.path(), true).is_ok());
    }

    #[test]
    fn failed_public_write_keeps_old_private_key() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("carol_private.json");
        let public = dir.path().join("carol_public.json");
        fs::write(&private, b"old private key").unwrap();
        fs::create_dir(&public).unwrap();
        fs::write(public.join("blocker"), b"x").unwrap();

        let err = carol().write_to(dir.path(), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert_eq!(fs::read(&private).unwrap(), b"old private key");
    }

    #[test]
    fn failed_private_write_restores_public_file() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("carol_private.json");
        let public = dir.path().join("carol_public.json");
        fs::write(&public, b"old public key").unwrap();
        fs::create_dir(&private).unwrap();
        fs::write(private.join("blocker"), b"x").unwrap();

        let err = carol().write_to(dir.path(), true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert_eq!(fs::read(&public).unwrap(), b"old public key");
    }

    #[test]
    fn refused_private_write_leaves_no_public_file() {
        let dir = tempfile::tempdir().unwrap();
        let private = dir.path().join("carol_private.json");
        fs::write(&private, b"old private key").unwrap();

        let err = carol().write_to(dir.path(), false).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::IoFailure);
        assert!(!dir.path().join("carol_public.json").exists());
        assert_eq!(fs::read(&private).unwrap(), b"old private key");
    }

    #[cfg(unix)]
    #[test]
    fn private_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let paths = alice().write_to(dir.path(), false).unwrap();
        let mode = fs::metadata(&paths.private).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = load(&dir.path().join("nobody_public.json")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::KeyNotFound);
    }

    #[test]
    fn load_directory_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(load(dir.path()).unwrap_err().kind(), ErrorKind::KeyNotFound);
    }

    #[test]
    fn load_expired_file_fails_but_inspect_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let paths = expired().write_to(dir.path(), false).unwrap();
        assert_eq!(load(&paths.public).unwrap_err().kind(), ErrorKind::KeyExpired);
        let record = inspect(&paths.public).unwrap();
        assert!(record.is_expired_at(Utc::now()));
    }

    #[test]
    fn debug_output_omits_key_material() {
        let debug = format!("{:?}", alice().private);
        assert!(debug.contains("alice"));
        assert!(!debug.contains("private_exponent"));
    }
}
