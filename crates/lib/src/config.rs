//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (default `config.json`, or `COURIER_CONFIG_PATH`)
//! with camelCase keys. Environment variables override individual secrets.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level application config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Account the agent runs as (e.g. "+15551234567"). Overridden by COURIER_PHONE_NUMBER env.
    #[serde(default)]
    pub phone_number: Option<String>,

    /// Where downloaded attachments are written (default "attachments").
    #[serde(default = "default_attachment_directory")]
    pub attachment_directory: PathBuf,

    /// SQLite database file (default "messages.db").
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// How to launch signal-cli.
    #[serde(default)]
    pub signal_cli: SignalCliConfig,

    /// Pending attachment request handling.
    #[serde(default)]
    pub pending: PendingConfig,
}

/// signal-cli launch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalCliConfig {
    /// Binary name or path (default "signal-cli").
    #[serde(default = "default_signal_cli_binary")]
    pub binary: String,

    /// Extra arguments placed before the `jsonRpc` subcommand (e.g. ["--config", "/var/lib/signal-cli"]).
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// Pending request expiry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingConfig {
    /// Seconds to wait for a getAttachment response before giving up (default 600). 0 waits forever.
    #[serde(default = "default_pending_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_attachment_directory() -> PathBuf {
    PathBuf::from("attachments")
}

fn default_database() -> PathBuf {
    PathBuf::from("messages.db")
}

fn default_signal_cli_binary() -> String {
    "signal-cli".to_string()
}

fn default_pending_timeout_secs() -> u64 {
    600
}

impl Default for Config {
    fn default() -> Self {
        Self {
            phone_number: None,
            attachment_directory: default_attachment_directory(),
            database: default_database(),
            signal_cli: SignalCliConfig::default(),
            pending: PendingConfig::default(),
        }
    }
}

impl Default for SignalCliConfig {
    fn default() -> Self {
        Self {
            binary: default_signal_cli_binary(),
            extra_args: Vec::new(),
        }
    }
}

impl Default for PendingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_pending_timeout_secs(),
        }
    }
}

impl PendingConfig {
    /// Expiry as a duration; `None` when disabled.
    pub fn ttl(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Resolve the phone number: env COURIER_PHONE_NUMBER overrides config.
pub fn resolve_phone_number(config: &Config) -> Option<String> {
    std::env::var("COURIER_PHONE_NUMBER")
        .ok()
        .and_then(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .or_else(|| {
            config
                .phone_number
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Phone number or a fatal startup error.
pub fn require_phone_number(config: &Config) -> Result<String> {
    resolve_phone_number(config).ok_or_else(|| {
        anyhow::anyhow!(
            "phone number not specified (set phoneNumber in the config file or COURIER_PHONE_NUMBER)"
        )
    })
}

/// Resolve config path from env or default (`config.json` in the working directory).
pub fn default_config_path() -> PathBuf {
    std::env::var("COURIER_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"))
}

/// Load config from `path` (or the default). Missing file => default config.
/// Returns the config and the path that was used (for resolving relative paths).
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

fn config_parent(config_path: &Path) -> &Path {
    config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."))
}

fn resolve_relative(config_path: &Path, p: &Path) -> PathBuf {
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        config_parent(config_path).join(p)
    }
}

/// Attachment directory; relative paths are resolved against the config file's parent.
pub fn resolve_attachment_dir(config: &Config, config_path: &Path) -> PathBuf {
    resolve_relative(config_path, &config.attachment_directory)
}

/// Database path; relative paths are resolved against the config file's parent.
pub fn resolve_database_path(config: &Config, config_path: &Path) -> PathBuf {
    resolve_relative(config_path, &config.database)
}
