//! Application configuration management.
//!
//! Configuration is stored at `~/.config/tripgate/config.json`. Every field
//! has a default, so a missing file (or missing keys) is fine. A few fields
//! can be overridden from the environment:
//!
//! - `TRIPGATE_APP_ORIGIN`
//! - `TRIPGATE_API_URL`
//! - `TRIPGATE_STORAGE` (`file`, `keyring` or `memory`)

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::SessionConfig;
use crate::guard::GuardConfig;
use crate::store::{DurableStore, FileStore, KeyringStore, MemoryStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "tripgate";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// HTTP request timeout in seconds
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Where the durable token copy is kept
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "keyring" => Ok(StorageBackend::Keyring),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(anyhow::anyhow!("Unknown storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Origin of the web application; the token cookie is scoped to it
    pub app_origin: String,
    /// Base URL of the issuing service (`/auth/login` is appended)
    pub api_base_url: String,
    pub storage: StorageBackend,
    pub protected_prefixes: Vec<String>,
    pub landing_path: String,
    pub protected_home: String,
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            app_origin: "http://localhost:3000".to_string(),
            api_base_url: "http://localhost:3000/api".to_string(),
            storage: StorageBackend::default(),
            protected_prefixes: vec!["/dashboard".to_string()],
            landing_path: "/".to_string(),
            protected_home: "/dashboard".to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load from the user config file, then apply environment overrides.
    pub fn load() -> Result<Self> {
        let mut config = Self::load_from(&Self::config_path()?)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_json::from_str(&contents).context("Failed to parse config file")
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply `TRIPGATE_*` overrides from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(origin) = lookup("TRIPGATE_APP_ORIGIN") {
            self.app_origin = origin;
        }
        if let Some(url) = lookup("TRIPGATE_API_URL") {
            self.api_base_url = url;
        }
        if let Some(storage) = lookup("TRIPGATE_STORAGE") {
            self.storage = storage.parse()?;
        }
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    pub fn cache_dir(&self) -> Result<PathBuf> {
        let cache_dir = dirs::cache_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Build the configured durable store.
    pub fn durable_store(&self) -> Result<Arc<dyn DurableStore>> {
        Ok(match self.storage {
            StorageBackend::File => Arc::new(FileStore::new(self.cache_dir()?)),
            StorageBackend::Keyring => Arc::new(KeyringStore::new()),
            StorageBackend::Memory => Arc::new(MemoryStore::new()),
        })
    }

    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            protected_prefixes: self.protected_prefixes.clone(),
            landing_path: self.landing_path.clone(),
            protected_home: self.protected_home.clone(),
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            landing_path: self.landing_path.clone(),
            protected_home: self.protected_home.clone(),
        }
    }
}
