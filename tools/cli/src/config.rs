//! On-disk CLI configuration.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sealpass_sync::SyncConfig;
use sealpass_vault::VaultConfig;

/// File name of the configuration inside the data directory.
pub const CONFIG_FILE: &str = "config.json";

/// File name of the key-value store inside the data directory.
pub const STORE_FILE: &str = "store.json";

/// Contents of `config.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub vault: VaultConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync: Option<SyncConfig>,
}

impl AppConfig {
    /// Load the configuration. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let json = match std::fs::read_to_string(path) {
            Ok(json) => json,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", path.display()))
            }
        };

        let config: Self = serde_json::from_str(&json)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        config.vault.validate().context("Invalid vault configuration")?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }
}

/// Resolve the data directory, defaulting to the platform data dir.
pub fn data_dir(explicit: Option<PathBuf>) -> Result<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir),
        None => dirs::data_dir()
            .map(|dir| dir.join("sealpass"))
            .context("No platform data directory; pass --data-dir"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load(&dir.path().join(CONFIG_FILE)).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(config.sync.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = AppConfig::default();
        config.vault.idle_timeout_secs = 60;
        config.sync = Some(SyncConfig::default());
        config.save(&path).unwrap();

        assert_eq!(AppConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_vault_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, r#"{"vault": {"kdf": {"iterations": 0}}}"#).unwrap();
        assert!(AppConfig::load(&path).is_err());
    }

    #[test]
    fn test_explicit_data_dir() {
        let dir = PathBuf::from("/tmp/sealpass-test");
        assert_eq!(data_dir(Some(dir.clone())).unwrap(), dir);
    }
}
