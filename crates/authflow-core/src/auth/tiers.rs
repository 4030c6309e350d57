//! Persistence tiers for credentials.
//!
//! A tier stores a single string value. The short-lived tier holds the access
//! credential (cookie-equivalent, optionally expiring), the persistent tier
//! holds the refresh credential until it is explicitly removed.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};

pub trait CredentialTier: Send + Sync {
    /// Current value, or `None` when absent or expired.
    fn load(&self) -> Result<Option<String>>;

    fn save(&self, value: &str) -> Result<()>;

    fn remove(&self) -> Result<()>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredValue {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl StoredValue {
    fn new(value: &str, lifetime: Option<Duration>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: lifetime.map(|l| Utc::now() + l),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.map(|at| Utc::now() >= at).unwrap_or(false)
    }
}

// ============================================================================
// In-memory tier
// ============================================================================

/// Process-local tier. Without a lifetime the value lives as long as the
/// process does, like a session cookie.
#[derive(Debug, Default)]
pub struct MemoryTier {
    lifetime: Option<Duration>,
    value: Mutex<Option<StoredValue>>,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lifetime(lifetime: Duration) -> Self {
        Self {
            lifetime: Some(lifetime),
            value: Mutex::new(None),
        }
    }
}

impl CredentialTier for MemoryTier {
    fn load(&self) -> Result<Option<String>> {
        let mut guard = self
            .value
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory tier lock poisoned"))?;
        if guard.as_ref().is_some_and(StoredValue::is_expired) {
            *guard = None;
        }
        Ok(guard.as_ref().map(|v| v.value.clone()))
    }

    fn save(&self, value: &str) -> Result<()> {
        let mut guard = self
            .value
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory tier lock poisoned"))?;
        *guard = Some(StoredValue::new(value, self.lifetime));
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        let mut guard = self
            .value
            .lock()
            .map_err(|_| anyhow::anyhow!("Memory tier lock poisoned"))?;
        *guard = None;
        Ok(())
    }
}

// ============================================================================
// File tier
// ============================================================================

/// JSON file holding the value and its expiry.
pub struct FileTier {
    path: PathBuf,
    lifetime: Option<Duration>,
}

impl FileTier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lifetime: None,
        }
    }

    pub fn with_lifetime(path: impl Into<PathBuf>, lifetime: Duration) -> Self {
        Self {
            path: path.into(),
            lifetime: Some(lifetime),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialTier for FileTier {
    fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents =
            std::fs::read_to_string(&self.path).context("Failed to read credential file")?;
        let stored: StoredValue =
            serde_json::from_str(&contents).context("Failed to parse credential file")?;

        if stored.is_expired() {
            return Ok(None);
        }
        Ok(Some(stored.value))
    }

    fn save(&self, value: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(&StoredValue::new(value, self.lifetime))?;

        let mut opts = OpenOptions::new();
        opts.create(true).write(true).truncate(true);

        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o600);
        }

        let mut file = opts.open(&self.path).context("Failed to open credential file")?;

        // An existing file keeps its old mode on open
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file.set_permissions(std::fs::Permissions::from_mode(0o600))?;
        }

        file.write_all(contents.as_bytes()).context("Failed to write credential file")?;
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        if self.path.exists() {
            std::fs::remove_file(&self.path).context("Failed to remove credential file")?;
        }
        Ok(())
    }
}

// ============================================================================
// Keyring tier
// ============================================================================

/// OS keychain entry.
pub struct KeyringTier {
    service: String,
    account: String,
}

impl KeyringTier {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, &self.account).context("Failed to create keyring entry")
    }
}

impl CredentialTier for KeyringTier {
    fn load(&self) -> Result<Option<String>> {
        match self.entry()?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve credential from keychain"),
        }
    }

    fn save(&self, value: &str) -> Result<()> {
        self.entry()?
            .set_password(value)
            .context("Failed to store credential in keychain")?;
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        }
    }
}
