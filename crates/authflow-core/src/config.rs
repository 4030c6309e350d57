//! Application configuration management.
//!
//! This module handles loading and saving the configuration, which includes
//! the API base URL, the authorization scheme, request timeout, credential
//! lifetimes, the refresh-credential backend and the guard routes.
//!
//! Configuration is stored at `~/.config/authflow/config.json`.

use std::path::PathBuf;

use anyhow::Result;
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "authflow";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Default API host. All endpoints are relative to this URL.
pub const DEFAULT_BASE_URL: &str = "https://norma.nomoreparties.space/api";

pub const DEFAULT_AUTH_SCHEME: &str = "Bearer";

/// HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Access tokens issued by the API live for 20 minutes.
pub const DEFAULT_ACCESS_LIFETIME_SECS: i64 = 20 * 60;

/// Where the long-lived refresh credential is persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefreshBackend {
    /// OS keychain
    #[default]
    Keyring,
    /// JSON file in the data directory
    File,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub base_url: String,
    pub auth_scheme: String,
    pub request_timeout_secs: u64,
    /// `None` keeps the access credential for the lifetime of the session.
    pub access_lifetime_secs: Option<i64>,
    pub refresh_backend: RefreshBackend,
    pub login_route: String,
    pub home_route: String,
    pub last_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            auth_scheme: DEFAULT_AUTH_SCHEME.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            access_lifetime_secs: Some(DEFAULT_ACCESS_LIFETIME_SECS),
            refresh_backend: RefreshBackend::default(),
            login_route: "/login".to_string(),
            home_route: "/".to_string(),
            last_email: None,
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

    /// Config pointing at a different API host, everything else default.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for credential files.
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}
