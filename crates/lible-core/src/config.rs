//! Application configuration management.
//!
//! This module handles loading and saving the console configuration: the
//! backend location, the names under which tokens are persisted, and the
//! session monitor timings.
//!
//! Configuration is stored at `~/.config/lible/config.json`. Environment
//! variables `LIBLE_API_URL` and `LIBLE_TOKEN_STORE` override the file.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::auth::SessionOptions;

/// Application name used for config/cache directory paths
const APP_NAME: &str = "lible";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const ENV_API_URL: &str = "LIBLE_API_URL";
const ENV_TOKEN_STORE: &str = "LIBLE_TOKEN_STORE";

/// Where access/refresh tokens are persisted between runs.
///
/// Defaults to an owner-only file in the cache directory; `keyring` uses the
/// OS credential store instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TokenStoreKind {
    Keyring,
    #[default]
    File,
    Memory,
}

impl FromStr for TokenStoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "keyring" => Ok(Self::Keyring),
            "file" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!("Unknown token store '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub auth_prefix: String,
    pub request_timeout_ms: u64,
    pub token_key: String,
    pub refresh_token_key: String,
    pub monitor_interval_secs: u64,
    pub expiry_warning_secs: u64,
    pub token_store: TokenStoreKind,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api".to_string(),
            auth_prefix: "/auth".to_string(),
            request_timeout_ms: 10_000,
            token_key: "lible_token".to_string(),
            refresh_token_key: "lible_refresh_token".to_string(),
            monitor_interval_secs: 60,
            expiry_warning_secs: 5 * 60,
            token_store: TokenStoreKind::default(),
            last_username: None,
        }
    }
}

impl Config {
    /// Load the config file (or defaults) and apply environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")?
        } else {
            Self::default()
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
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

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(kind) = lookup(ENV_TOKEN_STORE) {
            self.token_store = kind
                .parse()
                .with_context(|| format!("Invalid {}", ENV_TOKEN_STORE))?;
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

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            token_key: self.token_key.clone(),
            refresh_token_key: self.refresh_token_key.clone(),
            auth_prefix: self.auth_prefix.clone(),
            monitor_interval: Duration::from_secs(self.monitor_interval_secs.max(1)),
            warning_window: chrono::Duration::seconds(self.expiry_warning_secs as i64),
        }
    }
}
