//! Application configuration management.
//!
//! This module handles loading and saving the configuration, which selects
//! the backend URL, where the session is stored and how the unlock gate
//! behaves.
//!
//! Configuration is stored at `~/.config/sessiongate/config.json`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::api::DEFAULT_API_BASE_URL;
use crate::auth::{
    Clock, CredentialStore, LocalPin, LockPolicy, PresenceRequest, SessionGate, SessionManager,
};
use crate::storage::{FileBackend, KeyringBackend, RecordBackend, SealedBackend};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "sessiongate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment overrides
pub const ENV_API_URL: &str = "SESSIONGATE_API_URL";
pub const ENV_STORAGE: &str = "SESSIONGATE_STORAGE";
pub const ENV_PASSPHRASE: &str = "SESSIONGATE_PASSPHRASE";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    /// Plain JSON file in the data directory.
    #[default]
    File,
    /// Encrypted file in the data directory, needs a passphrase.
    Sealed,
    /// OS keychain entry.
    Keyring,
}

impl std::str::FromStr for StorageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageKind::File),
            "sealed" => Ok(StorageKind::Sealed),
            "keyring" | "keychain" => Ok(StorageKind::Keyring),
            other => Err(anyhow::anyhow!("Unknown storage kind: {}", other)),
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_expiring_window_hours() -> i64 {
    24
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub storage: StorageKind,
    #[serde(default = "default_expiring_window_hours")]
    pub expiring_window_hours: i64,
    #[serde(default)]
    pub lock_policy: LockPolicy,
    /// Argon2 PHC hash of the local unlock PIN.
    #[serde(default)]
    pub presence_pin_hash: Option<String>,
    #[serde(default)]
    pub last_email: Option<String>,
    /// Only read from the environment, never written to disk.
    #[serde(skip)]
    pub passphrase: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            storage: StorageKind::default(),
            expiring_window_hours: default_expiring_window_hours(),
            lock_policy: LockPolicy::default(),
            presence_pin_hash: None,
            last_email: None,
            passphrase: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `SESSIONGATE_*` environment overrides.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, get: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = get(ENV_API_URL).filter(|v| !v.is_empty()) {
            self.api_base_url = url;
        }
        if let Some(kind) = get(ENV_STORAGE).filter(|v| !v.is_empty()) {
            self.storage = kind.parse()?;
        }
        if let Some(passphrase) = get(ENV_PASSPHRASE).filter(|v| !v.is_empty()) {
            self.passphrase = Some(passphrase);
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the session file.
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn expiring_window(&self) -> Duration {
        Duration::hours(self.expiring_window_hours.max(0))
    }

    /// Build the configured backend.
    pub fn backend(&self) -> Result<Box<dyn RecordBackend>> {
        let backend: Box<dyn RecordBackend> = match self.storage {
            StorageKind::File => Box::new(FileBackend::in_dir(Self::data_dir()?)),
            StorageKind::Sealed => {
                let passphrase = self.passphrase.as_deref().ok_or_else(|| {
                    anyhow::anyhow!("Sealed storage needs {} to be set", ENV_PASSPHRASE)
                })?;
                Box::new(SealedBackend::new(
                    FileBackend::in_dir(Self::data_dir()?),
                    passphrase,
                ))
            }
            StorageKind::Keyring => Box::new(
                KeyringBackend::default_entry().context("Failed to open keychain entry")?,
            ),
        };
        Ok(backend)
    }

    /// Wire a session manager over `backend` using this configuration.
    pub fn session_manager(
        &self,
        backend: Box<dyn RecordBackend>,
        clock: std::sync::Arc<dyn Clock>,
    ) -> SessionManager {
        let store = CredentialStore::with_clock(backend, clock);
        SessionManager::new(store, std::sync::Arc::new(SessionGate::new()))
            .with_policy(self.lock_policy)
            .with_refresh_window(self.expiring_window())
    }

    /// Whether protected commands must pass the PIN check first.
    pub fn requires_presence(&self) -> bool {
        self.presence_pin_hash.is_some()
    }

    /// PIN-based presence provider reading input through `input`.
    pub fn pin_presence<F>(&self, input: F) -> LocalPin
    where
        F: Fn(&PresenceRequest) -> Option<String> + Send + Sync + 'static,
    {
        LocalPin::new(self.presence_pin_hash.clone(), input)
    }
}
