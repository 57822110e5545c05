//! Core library for Strongbox.
//!
//! Contains key pair management, the cryptographic primitives, detached
//! signatures, multi-recipient envelope encryption, the vault file codec, and
//! the sign-then-encrypt workflow that ties them together. This crate knows
//! nothing about argument parsing or console output; the `strongbox` binary
//! lives in `strongbox-cli`.

mod b64;
pub mod codec;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod persist;
pub mod signature;
pub mod workflow;

pub use error::{ErrorKind, Stage, WorkflowError};
pub use keys::{KeyPair, KeyRecord, KeyRole};
