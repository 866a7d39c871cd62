//! Startup preparation: write a template config, resolve runtime paths, create directories.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{self, Config, SignalCliConfig};

static DEFAULT_CONFIG: &str = include_str!("../config/config.json");

/// Everything the ingestion loop needs before it starts.
#[derive(Debug, Clone)]
pub struct Startup {
    pub phone_number: String,
    pub attachment_dir: PathBuf,
    pub database_path: PathBuf,
    pub pending_ttl: Option<Duration>,
    pub signal_cli: SignalCliConfig,
}

/// Create the config file from the template if missing, and the attachment directory.
/// Returns the attachment directory.
pub fn init_config(config_path: &Path) -> Result<PathBuf> {
    if let Some(dir) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating config directory {}", dir.display()))?;
    }

    if !config_path.exists() {
        std::fs::write(config_path, DEFAULT_CONFIG)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, leaving it", config_path.display());
    }

    let (config, _) = config::load_config(Some(config_path.to_path_buf()))?;
    let attachment_dir = config::resolve_attachment_dir(&config, config_path);
    ensure_dir(&attachment_dir)?;
    Ok(attachment_dir)
}

/// Validate config and resolve paths. Fails when no phone number is configured.
pub fn prepare(config: &Config, config_path: &Path) -> Result<Startup> {
    let phone_number = config::require_phone_number(config)?;
    let attachment_dir = config::resolve_attachment_dir(config, config_path);
    ensure_dir(&attachment_dir)?;
    let database_path = config::resolve_database_path(config, config_path);
    if let Some(dir) = database_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(dir)?;
    }
    Ok(Startup {
        phone_number,
        attachment_dir,
        database_path,
        pending_ttl: config.pending.ttl(),
        signal_cli: config.signal_cli.clone(),
    })
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating directory {}", dir.display()))?;
        log::info!("created directory {}", dir.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_config_parses() {
        let c: Config = serde_json::from_str(DEFAULT_CONFIG).unwrap();
        assert_eq!(c.database, PathBuf::from("messages.db"));
        assert_eq!(c.pending.timeout_secs, 600);
    }

    #[test]
    fn init_writes_template_once_and_creates_attachment_dir() {
        let dir = std::env::temp_dir().join(format!("courier-init-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");

        let attachments = init_config(&path).unwrap();
        assert_eq!(attachments, dir.join("attachments"));
        assert!(attachments.is_dir());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), DEFAULT_CONFIG);

        std::fs::write(&path, r#"{"attachmentDirectory": "files"}"#).unwrap();
        let attachments = init_config(&path).unwrap();
        assert_eq!(attachments, dir.join("files"));
        assert!(std::fs::read_to_string(&path).unwrap().contains("files"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn prepare_requires_phone_number() {
        if std::env::var("COURIER_PHONE_NUMBER").is_ok() {
            return;
        }
        let err = prepare(&Config::default(), Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(err.to_string().contains("phone number"));
    }
}
