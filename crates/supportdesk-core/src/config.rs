//! Application configuration management.
//!
//! This module handles loading and saving the widget client configuration:
//! which backend to talk to, which adapter flavor it speaks, and where the
//! session is persisted.
//!
//! Configuration is stored at `~/.config/supportdesk/config.json`; `SUPPORTDESK_*`
//! environment variables override individual fields.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::api::{AdapterConfig, BackendFlavor};
use crate::store::StoreKind;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "supportdesk";

/// Config file name
const CONFIG_FILE: &str = "config.json";

pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

pub const ENV_BASE_URL: &str = "SUPPORTDESK_BASE_URL";
pub const ENV_BACKEND: &str = "SUPPORTDESK_BACKEND";
pub const ENV_ORIGIN: &str = "SUPPORTDESK_ORIGIN";
pub const ENV_STORE: &str = "SUPPORTDESK_STORE";
pub const ENV_STORE_PASSPHRASE: &str = "SUPPORTDESK_STORE_PASSPHRASE";
pub const ENV_TIMEOUT: &str = "SUPPORTDESK_TIMEOUT_SECS";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub backend: BackendFlavor,
    pub origin: Option<String>,
    pub store: StoreKind,
    pub request_timeout_secs: u64,
    pub last_email: Option<String>,
    /// Only ever read from the environment, never written to disk
    #[serde(skip)]
    pub store_passphrase: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            backend: BackendFlavor::default(),
            origin: None,
            store: StoreKind::default(),
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            last_email: None,
            store_passphrase: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&contents)?)
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

    fn config_path() -> Result<PathBuf> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for the session file and logs
    pub fn session_dir(&self) -> Result<PathBuf> {
        let cache_dir =
            dirs::cache_dir().ok_or_else(|| anyhow!("Could not find cache directory"))?;
        Ok(cache_dir.join(APP_NAME))
    }

    /// Apply `SUPPORTDESK_*` overrides from the process environment
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_vars(|name| std::env::var(name).ok())
    }

    /// Apply overrides from any variable source
    pub fn apply_vars(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let var = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(base_url) = var(ENV_BASE_URL) {
            self.base_url = base_url;
        }
        if let Some(backend) = var(ENV_BACKEND) {
            self.backend = backend.parse().map_err(|e: String| anyhow!(e))?;
        }
        if let Some(origin) = var(ENV_ORIGIN) {
            self.origin = Some(origin);
        }
        if let Some(store) = var(ENV_STORE) {
            self.store = store.parse().map_err(|e: String| anyhow!(e))?;
        }
        if let Some(passphrase) = var(ENV_STORE_PASSPHRASE) {
            self.store_passphrase = Some(passphrase);
        }
        if let Some(timeout) = var(ENV_TIMEOUT) {
            self.request_timeout_secs = timeout
                .parse()
                .map_err(|_| anyhow!("{} must be a number of seconds, got '{}'", ENV_TIMEOUT, timeout))?;
        }
        Ok(())
    }

    pub fn adapter_config(&self) -> AdapterConfig {
        let config = AdapterConfig::new(self.base_url.clone()).with_timeout(self.request_timeout_secs);
        match self.origin {
            Some(ref origin) => config.with_origin(origin.clone()),
            None => config,
        }
    }
}
