//! Application configuration management.
//!
//! This module handles loading and saving the application configuration:
//! backend address, last used username, where the session token is kept and
//! what to show after login.
//!
//! Configuration is stored at `~/.config/sitescout/config.json`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::DEFAULT_API_BASE_URL;
use crate::auth::{FileTokenStore, KeyringTokenStore, ReturnPolicy, TokenStore};

/// Application name used for config/cache directory paths
const APP_NAME: &str = "sitescout";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Environment variable overriding the backend address
pub const API_URL_ENV: &str = "SITESCOUT_API_URL";

/// Where the session token is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenBackend {
    /// `session.json` in the cache directory
    #[default]
    File,
    /// OS keychain
    Keyring,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub last_username: Option<String>,
    pub token_backend: TokenBackend,
    pub return_policy: ReturnPolicy,
    pub log_dir: Option<PathBuf>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            let config = serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?;
            debug!(path = ?path, "Config loaded");
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
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

    /// Backend address: environment, then config file, then the default.
    pub fn api_base_url(&self) -> String {
        self.resolved_api_base_url(None)
    }

    /// Backend address with an explicit override (e.g. a command-line flag)
    /// taking precedence over the environment and the config file.
    pub fn resolved_api_base_url(&self, explicit: Option<&str>) -> String {
        pick_api_base_url(
            explicit,
            std::env::var(API_URL_ENV).ok().as_deref(),
            self.api_base_url.as_deref(),
        )
    }

    /// Persist `username` as the last used one without touching any other
    /// setting in the file.
    pub fn remember_username(username: &str) -> Result<()> {
        Self::remember_username_at(&Self::config_path()?, username)
    }

    /// Fails without writing when the existing file cannot be parsed.
    pub fn remember_username_at(path: &Path, username: &str) -> Result<()> {
        let mut on_disk = Self::load_from(path)?;
        if on_disk.last_username.as_deref() == Some(username) {
            return Ok(());
        }
        on_disk.last_username = Some(username.to_string());
        on_disk.save_to(path)
    }

    /// Open the token store selected by `token_backend`.
    pub fn open_token_store(&self) -> Result<Box<dyn TokenStore>> {
        match self.token_backend {
            TokenBackend::File => {
                let cache_dir = self.cache_dir().unwrap_or_else(|_| PathBuf::from("./cache"));
                Ok(Box::new(FileTokenStore::new(cache_dir)))
            }
            TokenBackend::Keyring => {
                let store = KeyringTokenStore::new().context("Failed to open keychain entry")?;
                Ok(Box::new(store))
            }
        }
    }
}

/// First non-blank of explicit override, environment, config file; else the default.
fn pick_api_base_url(explicit: Option<&str>, env: Option<&str>, file: Option<&str>) -> String {
    [explicit, env, file]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|url| !url.is_empty())
        .unwrap_or(DEFAULT_API_BASE_URL)
        .to_string()
}
