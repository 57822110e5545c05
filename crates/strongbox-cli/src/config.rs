//! CLI configuration for Strongbox.
//!
//! Loads defaults from `STRONGBOX_*` environment variables. Command-line
//! flags always take precedence over these values.

use std::path::PathBuf;

use strongbox_core::keys::DEFAULT_VALIDITY_DAYS;

/// Output format for diagnostic logs on stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// CLI configuration.
#[derive(Debug, Clone)]
pub struct CliConfig {
    /// Log filter (e.g., `warn`, `info`, `strongbox_core=debug`).
    pub log_level: String,
    /// Log line format.
    pub log_format: LogFormat,
    /// Directory `gen-key` writes key files into.
    pub key_dir: PathBuf,
    /// Validity period `gen-key` uses when `--days` is not given.
    pub key_days: u32,
}

impl CliConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `STRONGBOX_LOG_LEVEL`: log filter (default: `warn`)
    /// - `STRONGBOX_LOG_FORMAT`: `text` or `json` (default: `text`)
    /// - `STRONGBOX_KEY_DIR`: output directory for new keys (default: `.`)
    /// - `STRONGBOX_KEY_DAYS`: default key validity in days (default: `30`)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let log_level = lookup("STRONGBOX_LOG_LEVEL")
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "warn".to_owned());

        let log_format = match lookup("STRONGBOX_LOG_FORMAT")
            .unwrap_or_default()
            .to_lowercase()
            .as_str()
        {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };

        let key_dir = lookup("STRONGBOX_KEY_DIR")
            .filter(|v| !v.is_empty())
            .map_or_else(|| PathBuf::from("."), PathBuf::from);

        let key_days = lookup("STRONGBOX_KEY_DAYS")
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(DEFAULT_VALIDITY_DAYS);

        Self {
            log_level,
            log_format,
            key_dir,
            key_days,
        }
    }
}
