//! Integration tests for the `strongbox` CLI binary.
//!
//! These tests exercise the CLI as a subprocess, verifying exit codes,
//! stdout/stderr output, and file-system side effects. Key pairs are
//! generated once per test binary through `gen-key` and shared read-only.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

use chrono::{Duration, Utc};

/// Helper: locate the `strongbox` binary built by `cargo test`.
fn strongbox_bin() -> String {
    let path = env!("CARGO_BIN_EXE_strongbox");
    assert!(
        Path::new(path).exists(),
        "strongbox binary not found at {path}"
    );
    path.to_owned()
}

/// Helper: run strongbox with args and return (`exit_code`, stdout, stderr).
fn run(args: &[&str]) -> (i32, String, String) {
    let output = Command::new(strongbox_bin())
        .args(args)
        .env_remove("STRONGBOX_LOG_LEVEL")
        .env_remove("STRONGBOX_LOG_FORMAT")
        .env_remove("STRONGBOX_KEY_DIR")
        .env_remove("STRONGBOX_KEY_DAYS")
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to execute strongbox");

    let code = output.status.code().unwrap_or(-1);
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (code, stdout, stderr)
}

/// Shared key directory with `alice`, `bob`, `mallory` (via `gen-key`) and an
/// expired `old` pair.
fn keyring() -> &'static Path {
    static DIR: OnceLock<tempfile::TempDir> = OnceLock::new();
    DIR.get_or_init(|| {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().to_str().unwrap();
        for owner in ["alice", "bob", "mallory"] {
            let (code, _, stderr) = run(&["gen-key", "--owner", owner, "--out-dir", out]);
            assert_eq!(code, 0, "gen-key {owner} failed: {stderr}");
        }
        strongbox_core::keys::generate_at(
            "old",
            Duration::days(1),
            Utc::now() - Duration::days(5),
        )
        .unwrap()
        .write_to(dir.path(), false)
        .unwrap();
        dir
    })
    .path()
}

fn public(owner: &str) -> String {
    keyring()
        .join(format!("{owner}_public.json"))
        .to_string_lossy()
        .into_owned()
}

fn private(owner: &str) -> String {
    keyring()
        .join(format!("{owner}_private.json"))
        .to_string_lossy()
        .into_owned()
}

fn s(path: &Path) -> &str {
    path.to_str().unwrap()
}

fn plaintext_file(dir: &Path) -> PathBuf {
    let path = dir.join("notes.txt");
    fs::write(&path, b"the launch codes are 0000\n").unwrap();
    path
}

// ── Version & help ───────────────────────────────────────────────────

#[test]
fn version_flag() {
    let (code, stdout, _) = run(&["--version"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("strongbox"));
}

#[test]
fn help_lists_commands() {
    let (code, stdout, _) = run(&["--help"]);
    assert_eq!(code, 0);
    for cmd in ["gen-key", "encrypt", "decrypt", "inspect", "key-info"] {
        assert!(stdout.contains(cmd), "help is missing {cmd}");
    }
}

#[test]
fn unknown_command_fails() {
    let (code, _, _) = run(&["shred"]);
    assert_ne!(code, 0);
}

// ── gen-key / key-info ───────────────────────────────────────────────

#[test]
fn gen_key_writes_both_files() {
    let dir = tempfile::tempdir().unwrap();
    let (code, stdout, _) = run(&[
        "gen-key",
        "--owner",
        "carol",
        "--days",
        "7",
        "--out-dir",
        s(dir.path()),
    ]);
    assert_eq!(code, 0);
    assert!(stdout.contains("carol"));
    assert!(dir.path().join("carol_private.json").is_file());
    assert!(dir.path().join("carol_public.json").is_file());

    let public: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join("carol_public.json")).unwrap()).unwrap();
    assert_eq!(public["role"], "public");
    assert!(public["key_data"].get("private_exponent").is_none());
}

#[test]
fn gen_key_refuses_to_overwrite_without_force() {
    let dir = tempfile::tempdir().unwrap();
    let args = ["gen-key", "--owner", "dave", "--out-dir", s(dir.path())];
    assert_eq!(run(&args).0, 0);
    let before = fs::read(dir.path().join("dave_private.json")).unwrap();

    let (code, _, stderr) = run(&args);
    assert_eq!(code, 1);
    assert!(stderr.contains("Error"));
    assert_eq!(fs::read(dir.path().join("dave_private.json")).unwrap(), before);
}

#[test]
fn gen_key_rejects_path_like_owner() {
    let dir = tempfile::tempdir().unwrap();
    let (code, _, stderr) = run(&["gen-key", "--owner", "../evil", "--out-dir", s(dir.path())]);
    assert_eq!(code, 1);
    assert!(stderr.contains("invalid owner name"));
}

#[test]
fn key_info_reports_valid_and_expired_keys() {
    let (code, stdout, _) = run(&["key-info", &public("alice")]);
    assert_eq!(code, 0);
    assert!(stdout.contains("alice"));
    assert!(stdout.contains("valid"));

    let (code, stdout, _) = run(&["key-info", &private("old")]);
    assert_eq!(code, 0);
    assert!(stdout.contains("expired"));
}

// ── encrypt / decrypt ────────────────────────────────────────────────

#[test]
fn encrypt_for_two_recipients_and_decrypt_with_each() {
    let dir = tempfile::tempdir().unwrap();
    let input = plaintext_file(dir.path());

    let (code, stdout, stderr) =
        run(&["encrypt", "-f", s(&input), "-k", &public("alice"), &public("bob")]);
    assert_eq!(code, 0, "{stderr}");
    assert!(stdout.contains("alice, bob"));
    let vault = dir.path().join("notes.txt.vault");
    assert!(vault.is_file());

    let (code, _, stderr) = run(&["decrypt", "-f", s(&vault), "-k", &private("alice")]);
    assert_eq!(code, 0, "{stderr}");
    let recovered = dir.path().join("notes.txt_recovered");
    assert_eq!(fs::read(&recovered).unwrap(), fs::read(&input).unwrap());

    let out = dir.path().join("bob.txt");
    let (code, _, _) = run(&["decrypt", "-f", s(&vault), "-k", &private("bob"), "-o", s(&out)]);
    assert_eq!(code, 0);
    assert_eq!(fs::read(&out).unwrap(), fs::read(&input).unwrap());
}

#[test]
fn non_recipient_cannot_decrypt() {
    let dir = tempfile::tempdir().unwrap();
    let input = plaintext_file(dir.path());
    assert_eq!(run(&["encrypt", "-f", s(&input), "-k", &public("alice")]).0, 0);

    let vault = dir.path().join("notes.txt.vault");
    let (code, _, stderr) = run(&["decrypt", "-f", s(&vault), "-k", &private("mallory")]);
    assert_eq!(code, 1);
    assert!(stderr.contains("decryption failed"));
    assert!(stderr.contains("DecryptionFailure"));
    assert!(!dir.path().join("notes.txt_recovered").exists());
}

#[test]
fn signed_vault_verifies_and_rejects_spoofed_sender() {
    let dir = tempfile::tempdir().unwrap();
    let input = plaintext_file(dir.path());
    let (code, stdout, stderr) = run(&[
        "encrypt",
        "-f",
        s(&input),
        "-k",
        &public("bob"),
        "--sign",
        &private("alice"),
    ]);
    assert_eq!(code, 0, "{stderr}");
    assert!(stdout.contains("Signed By"));
    let vault = dir.path().join("notes.txt.vault");

    let (code, stdout, _) = run(&[
        "decrypt",
        "-f",
        s(&vault),
        "-k",
        &private("bob"),
        "--verify",
        &public("alice"),
    ]);
    assert_eq!(code, 0);
    assert!(stdout.contains("verified"));

    let spoof_out = dir.path().join("spoofed.txt");
    let (code, _, stderr) = run(&[
        "decrypt",
        "-f",
        s(&vault),
        "-k",
        &private("bob"),
        "--verify",
        &public("mallory"),
        "-o",
        s(&spoof_out),
    ]);
    assert_eq!(code, 1);
    assert!(stderr.contains("verification failed"));
    assert!(stderr.contains("InvalidSignature"));
    assert!(!spoof_out.exists());
}

#[test]
fn expired_recipient_key_fails_at_key_load() {
    let dir = tempfile::tempdir().unwrap();
    let input = plaintext_file(dir.path());
    let (code, _, stderr) = run(&["encrypt", "-f", s(&input), "-k", &public("old")]);
    assert_eq!(code, 1);
    assert!(stderr.contains("key load failed"));
    assert!(stderr.contains("KeyExpired"));
    assert!(!dir.path().join("notes.txt.vault").exists());
}

#[test]
fn missing_key_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let input = plaintext_file(dir.path());
    let missing = dir.path().join("ghost_public.json");
    let (code, _, stderr) = run(&["encrypt", "-f", s(&input), "-k", s(&missing)]);
    assert_eq!(code, 1);
    assert!(stderr.contains("KeyNotFound"));
}

#[test]
fn tampered_vault_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = plaintext_file(dir.path());
    assert_eq!(run(&["encrypt", "-f", s(&input), "-k", &public("alice")]).0, 0);
    let vault = dir.path().join("notes.txt.vault");

    let mut doc: serde_json::Value = serde_json::from_slice(&fs::read(&vault).unwrap()).unwrap();
    doc["protected"]["cty"] = serde_json::json!("signed");
    fs::write(&vault, serde_json::to_vec_pretty(&doc).unwrap()).unwrap();

    let (code, _, stderr) = run(&["decrypt", "-f", s(&vault), "-k", &private("alice")]);
    assert_eq!(code, 1);
    assert!(stderr.contains("IntegrityFailure"));
    assert!(!dir.path().join("notes.txt_recovered").exists());
}

// ── inspect ──────────────────────────────────────────────────────────

#[test]
fn inspect_shows_algorithms_and_recipients() {
    let dir = tempfile::tempdir().unwrap();
    let input = plaintext_file(dir.path());
    assert_eq!(
        run(&["encrypt", "-f", s(&input), "-k", &public("alice"), &public("bob")]).0,
        0
    );

    let (code, stdout, _) = run(&["inspect", s(&dir.path().join("notes.txt.vault"))]);
    assert_eq!(code, 0);
    assert!(stdout.contains("A256GCM"));
    assert!(stdout.contains("RSA-OAEP-256"));
    assert!(stdout.contains("Recipients"));
}

#[test]
fn inspect_rejects_non_vault_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = plaintext_file(dir.path());
    let (code, _, stderr) = run(&["inspect", s(&input)]);
    assert_eq!(code, 1);
    assert!(stderr.contains("not a readable vault"));
}
