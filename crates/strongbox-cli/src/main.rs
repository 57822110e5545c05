//! `strongbox`: expiring RSA keys and multi-recipient file vaults.
//!
//! Thin front end over `strongbox-core`: parses arguments, loads defaults
//! from the environment, and prints results. All cryptography and file
//! publication happen in the core crate.

#![allow(clippy::print_stdout, clippy::print_stderr)]

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use strongbox_core::envelope::ContentType;
use strongbox_core::{WorkflowError, codec, keys, workflow};
use tracing_subscriber::EnvFilter;

use crate::config::{CliConfig, LogFormat};

// ── ANSI color helpers ───────────────────────────────────────────────

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const RED: &str = "\x1b[31m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

// ── CLI structure ────────────────────────────────────────────────────

/// Strongbox: encrypt files for one or many recipients.
#[derive(Parser)]
#[command(
    name = "strongbox",
    version,
    about = "Strongbox: expiring RSA keys, multi-recipient vaults, sign-then-encrypt",
    long_about = None,
    after_help = format!(
        "{DIM}Environment variables:{RESET}\n  \
         STRONGBOX_LOG_LEVEL    Log filter (default: warn)\n  \
         STRONGBOX_LOG_FORMAT   text or json (default: text)\n  \
         STRONGBOX_KEY_DIR      Directory for gen-key output (default: .)\n  \
         STRONGBOX_KEY_DAYS     Default key validity in days (default: 30)\n\n\
         {DIM}Examples:{RESET}\n  \
         strongbox gen-key --owner alice --days 90\n  \
         strongbox encrypt -f report.pdf -k alice_public.json bob_public.json\n  \
         strongbox encrypt -f report.pdf -k bob_public.json --sign alice_private.json\n  \
         strongbox decrypt -f report.pdf.vault -k bob_private.json --verify alice_public.json"
    ),
)]
struct Cli {
    /// Log filter for diagnostics on stderr (overrides `STRONGBOX_LOG_LEVEL`).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an RSA-2048 key pair with an expiry date.
    GenKey {
        /// Owner name; also the key file name prefix.
        #[arg(long)]
        owner: String,
        /// Validity period in days (default: `STRONGBOX_KEY_DAYS` or 30).
        #[arg(long)]
        days: Option<u32>,
        /// Directory to write the key files into (default: `STRONGBOX_KEY_DIR` or `.`).
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Replace existing key files for this owner.
        #[arg(long)]
        force: bool,
    },
    /// Encrypt a file for one or more recipients.
    Encrypt {
        /// File to encrypt.
        #[arg(short, long)]
        file: PathBuf,
        /// Recipient public key files.
        #[arg(short, long, visible_alias = "key", num_args = 1.., required = true)]
        keys: Vec<PathBuf>,
        /// Sign the file first with this private key file.
        #[arg(long)]
        sign: Option<PathBuf>,
        /// Output path (default: `<file>.vault`).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Decrypt a vault file with a recipient private key.
    Decrypt {
        /// Vault file to decrypt.
        #[arg(short, long)]
        file: PathBuf,
        /// Recipient private key file.
        #[arg(short, long)]
        key: PathBuf,
        /// Require a valid signature from this sender public key file.
        #[arg(long)]
        verify: Option<PathBuf>,
        /// Output path (default: `<file without .vault>_recovered`).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Show a vault's algorithms and recipients without decrypting it.
    Inspect {
        /// Vault file to describe.
        vault: PathBuf,
    },
    /// Show a key file's owner, role, key id, and validity.
    KeyInfo {
        /// Key file to describe.
        key: PathBuf,
    },
}

// ── Pretty output helpers ────────────────────────────────────────────

fn header(icon: &str, title: &str) {
    println!("{BOLD}{CYAN}{icon} {title}{RESET}");
    println!("{DIM}─────────────────────────────────────────{RESET}");
}

fn kv_line(key: &str, value: &str) {
    println!("  {DIM}{key:<20}{RESET} {WHITE}{value}{RESET}");
}

fn success(msg: &str) {
    println!("{GREEN}{BOLD}✓{RESET} {msg}");
}

fn warning(msg: &str) {
    println!("{YELLOW}{BOLD}⚠{RESET} {YELLOW}{msg}{RESET}");
}

fn short_kid(kid: &str) -> &str {
    kid.get(..16).unwrap_or(kid)
}

// ── Logging ──────────────────────────────────────────────────────────

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("warn"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}

// ── Command dispatch ─────────────────────────────────────────────────

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = CliConfig::from_env();
    init_tracing(
        cli.log_level.as_deref().unwrap_or(&config.log_level),
        config.log_format,
    );

    match run(&config, cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("  {RED}{BOLD}✗ Error:{RESET} {e:#}");
            if let Some(workflow_err) = e.downcast_ref::<WorkflowError>() {
                eprintln!(
                    "  {DIM}stage: {}  kind: {}{RESET}",
                    workflow_err.stage(),
                    workflow_err.kind()
                );
            }
            eprintln!();
            ExitCode::FAILURE
        }
    }
}

fn run(config: &CliConfig, cmd: Commands) -> Result<()> {
    match cmd {
        Commands::GenKey {
            owner,
            days,
            out_dir,
            force,
        } => cmd_gen_key(
            &owner,
            days.unwrap_or(config.key_days),
            out_dir.as_deref().unwrap_or(&config.key_dir),
            force,
        ),
        Commands::Encrypt {
            file,
            keys,
            sign,
            output,
        } => cmd_encrypt(&file, &keys, sign.as_deref(), output),
        Commands::Decrypt {
            file,
            key,
            verify,
            output,
        } => cmd_decrypt(&file, &key, verify.as_deref(), output),
        Commands::Inspect { vault } => cmd_inspect(&vault),
        Commands::KeyInfo { key } => cmd_key_info(&key),
    }
}

// ── Key commands ─────────────────────────────────────────────────────

fn cmd_gen_key(owner: &str, days: u32, dir: &Path, force: bool) -> Result<()> {
    let pair = keys::generate(owner, days).context("key generation failed")?;
    let paths = pair
        .write_to(dir, force)
        .with_context(|| format!("could not write key files to {}", dir.display()))?;

    header("🔑", "Key Pair Generated");
    kv_line("Owner", pair.private.owner());
    kv_line("Algorithm", &pair.private.algorithm().to_string());
    kv_line("Key ID", pair.private.kid());
    kv_line("Expires", &pair.private.expires_at().to_rfc3339());
    kv_line("Private Key", &paths.private.display().to_string());
    kv_line("Public Key", &paths.public.display().to_string());
    println!();
    success(&format!(
        "Share {} with senders; keep {} secret.",
        paths.public.display(),
        paths.private.display()
    ));
    Ok(())
}

fn cmd_key_info(path: &Path) -> Result<()> {
    let record = keys::inspect(path)
        .with_context(|| format!("could not read key file {}", path.display()))?;
    let now = Utc::now();

    header("⚷", &format!("Key: {}", record.owner()));
    kv_line("Role", &record.role().to_string());
    kv_line("Algorithm", &record.algorithm().to_string());
    kv_line("Key ID", record.kid());
    kv_line("Created", &record.created_at().to_rfc3339());
    kv_line("Expires", &record.expires_at().to_rfc3339());

    if record.is_expired_at(now) {
        kv_line("Status", &format!("{RED}expired{RESET}"));
        println!();
        warning("This key can no longer be used to encrypt, decrypt, or sign.");
    } else {
        let left = record.expires_at() - now;
        kv_line(
            "Status",
            &format!("{GREEN}valid{RESET} {DIM}({} days left){RESET}", left.num_days()),
        );
        println!();
    }
    Ok(())
}

// ── Vault commands ───────────────────────────────────────────────────

fn cmd_encrypt(
    file: &Path,
    recipients: &[PathBuf],
    signer: Option<&Path>,
    output: Option<PathBuf>,
) -> Result<()> {
    let output = output.unwrap_or_else(|| default_vault_path(file));
    let report = workflow::encrypt_file(file, recipients, signer, &output)?;

    header("🔒", "Encrypted");
    kv_line("Input", &file.display().to_string());
    kv_line("Vault", &report.output.display().to_string());
    kv_line("Recipients", &report.recipients.join(", "));
    if let Some(signer) = &report.signed_by {
        kv_line("Signed By", signer);
    }
    println!();
    success(&format!("File secured at {}", report.output.display()));
    Ok(())
}

fn cmd_decrypt(
    file: &Path,
    key: &Path,
    sender: Option<&Path>,
    output: Option<PathBuf>,
) -> Result<()> {
    let output = output.unwrap_or_else(|| default_recovered_path(file));
    let report = workflow::decrypt_file(file, key, sender, &output)?;

    header("🔓", "Decrypted");
    kv_line("Vault", &file.display().to_string());
    kv_line("Output", &report.output.display().to_string());
    kv_line("Bytes", &report.bytes.to_string());
    match &report.verified_signer {
        Some(signer) => kv_line("Signature", &format!("{GREEN}verified{RESET} ({signer})")),
        None => kv_line("Signature", &format!("{DIM}not checked{RESET}")),
    }
    println!();
    success(&format!("Recovered {}", report.output.display()));
    Ok(())
}

fn cmd_inspect(path: &Path) -> Result<()> {
    let bytes =
        std::fs::read(path).with_context(|| format!("could not read {}", path.display()))?;
    let container = codec::deserialize(&bytes)
        .with_context(|| format!("{} is not a readable vault", path.display()))?;

    header("🗄", &format!("Vault: {}", path.display()));
    kv_line("Cipher", container.header.cipher.id());
    kv_line("Key Wrap", container.header.key_wrap.id());
    let content = match container.header.content_type {
        ContentType::Raw => "raw".to_owned(),
        ContentType::Signed => format!("{MAGENTA}signed{RESET}"),
    };
    kv_line("Content", &content);
    kv_line("Ciphertext Bytes", &container.ciphertext.len().to_string());
    kv_line("Recipients", &container.recipients.len().to_string());
    for kid in container.recipient_kids() {
        println!("    {DIM}•{RESET} {CYAN}{}{RESET}", short_kid(kid));
    }
    println!();
    Ok(())
}

/// `report.pdf` → `report.pdf.vault`.
fn default_vault_path(file: &Path) -> PathBuf {
    let mut name = file.as_os_str().to_owned();
    name.push(".vault");
    PathBuf::from(name)
}

/// `report.pdf.vault` → `report.pdf_recovered`.
fn default_recovered_path(file: &Path) -> PathBuf {
    let base = if file.extension().is_some_and(|ext| ext == "vault") {
        file.with_extension("")
    } else {
        file.to_path_buf()
    };
    let mut name = base.into_os_string();
    name.push("_recovered");
    PathBuf::from(name)
}
