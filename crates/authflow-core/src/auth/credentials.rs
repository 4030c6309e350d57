use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::Duration;
use tracing::{debug, warn};

use crate::config::{Config, RefreshBackend, APP_NAME};

use super::tiers::{CredentialTier, FileTier, KeyringTier, MemoryTier};

/// Access credential file in the data directory
const ACCESS_FILE: &str = "access.json";

/// Refresh credential file, used when the keychain backend is disabled
const REFRESH_FILE: &str = "refresh.json";

/// Keychain account name for the refresh credential
const REFRESH_ACCOUNT: &str = "refresh-token";

/// Short-lived token authorizing individual requests.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessCredential(String);

/// Long-lived token exchanged for a new credential pair.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshCredential(String);

impl AccessCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Build from a server value, dropping a leading `"<scheme> "` so the
    /// scheme is not sent twice.
    pub fn from_server(token: &str, scheme: &str) -> Self {
        let trimmed = token.trim();
        let stripped = trimmed
            .split_once(' ')
            .filter(|(prefix, _)| prefix.eq_ignore_ascii_case(scheme))
            .map(|(_, rest)| rest.trim_start())
            .unwrap_or(trimmed);
        Self(stripped.to_string())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl RefreshCredential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessCredential(<redacted>)")
    }
}

impl fmt::Debug for RefreshCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RefreshCredential(<redacted>)")
    }
}

/// Credentials returned together by login and refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialPair {
    pub access: AccessCredential,
    pub refresh: RefreshCredential,
}

impl CredentialPair {
    pub fn new(access: AccessCredential, refresh: RefreshCredential) -> Self {
        Self { access, refresh }
    }

    /// Build a pair from the raw strings of a login or refresh response.
    pub fn from_server(access: &str, refresh: &str, scheme: &str) -> Self {
        Self {
            access: AccessCredential::from_server(access, scheme),
            refresh: RefreshCredential::new(refresh),
        }
    }
}

/// What the store currently holds. Either half may be absent on its own,
/// e.g. the access credential expired while the refresh credential remains.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredCredentials {
    pub access: Option<AccessCredential>,
    pub refresh: Option<RefreshCredential>,
}

/// Credentials read together with the store generation they belong to.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub generation: u64,
    pub credentials: StoredCredentials,
}

/// Holds the access credential in the short-lived tier and the refresh
/// credential in the persistent tier.
///
/// Every `write` and `clear` runs under one lock and bumps the generation,
/// so a reader never sees a new access credential next to a stale refresh
/// credential.
pub struct CredentialStore {
    access: Box<dyn CredentialTier>,
    refresh: Box<dyn CredentialTier>,
    lock: Mutex<()>,
    generation: AtomicU64,
}

impl CredentialStore {
    pub fn new(access: Box<dyn CredentialTier>, refresh: Box<dyn CredentialTier>) -> Self {
        Self {
            access,
            refresh,
            lock: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    /// Store backed by two in-memory tiers.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryTier::new()), Box::new(MemoryTier::new()))
    }

    /// Store laid out per `config`: the access credential in a file under the
    /// data directory, the refresh credential in the keychain or a file.
    pub fn from_config(config: &Config) -> Result<Self> {
        let data_dir = config.data_dir()?;

        let access: Box<dyn CredentialTier> = match config.access_lifetime_secs {
            Some(secs) => Box::new(FileTier::with_lifetime(
                data_dir.join(ACCESS_FILE),
                Duration::seconds(secs),
            )),
            None => Box::new(FileTier::new(data_dir.join(ACCESS_FILE))),
        };

        let refresh: Box<dyn CredentialTier> = match config.refresh_backend {
            RefreshBackend::Keyring => Box::new(KeyringTier::new(APP_NAME, REFRESH_ACCOUNT)),
            RefreshBackend::File => Box::new(FileTier::new(data_dir.join(REFRESH_FILE))),
        };

        Ok(Self::new(access, refresh))
    }

    fn guard(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| anyhow::anyhow!("Credential store lock poisoned"))
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn read(&self) -> Result<StoredCredentials> {
        let _guard = self.guard()?;
        self.read_locked()
    }

    pub fn snapshot(&self) -> Result<Snapshot> {
        let _guard = self.guard()?;
        Ok(Snapshot {
            generation: self.generation(),
            credentials: self.read_locked()?,
        })
    }

    pub fn access(&self) -> Result<Option<AccessCredential>> {
        Ok(self.read()?.access)
    }

    pub fn refresh(&self) -> Result<Option<RefreshCredential>> {
        Ok(self.read()?.refresh)
    }

    pub fn write(&self, pair: &CredentialPair) -> Result<()> {
        let _guard = self.guard()?;
        self.write_locked(pair)
    }

    /// Apply `pair` only if nothing was written or cleared since `expected`.
    /// Returns whether the pair was applied.
    pub fn write_if_generation(&self, pair: &CredentialPair, expected: u64) -> Result<bool> {
        let _guard = self.guard()?;
        let current = self.generation();
        if current != expected {
            debug!(expected, current, "Discarding credentials from a superseded session");
            return Ok(false);
        }
        self.write_locked(pair)?;
        Ok(true)
    }

    pub fn clear(&self) -> Result<()> {
        let _guard = self.guard()?;
        self.clear_locked()
    }

    /// Clear only if nothing was written or cleared since `expected`, so a
    /// failure observed by an old request cannot wipe a newer login.
    /// Returns whether the store was cleared.
    pub fn clear_if_generation(&self, expected: u64) -> Result<bool> {
        let _guard = self.guard()?;
        let current = self.generation();
        if current != expected {
            debug!(expected, current, "Keeping credentials written by a newer session");
            return Ok(false);
        }
        self.clear_locked()?;
        Ok(true)
    }

    fn clear_locked(&self) -> Result<()> {
        let access = self.access.remove().context("Failed to clear access credential");
        let refresh = self.refresh.remove().context("Failed to clear refresh credential");
        self.generation.fetch_add(1, Ordering::AcqRel);
        access.and(refresh)
    }

    fn read_locked(&self) -> Result<StoredCredentials> {
        Ok(StoredCredentials {
            access: self.access.load()?.map(AccessCredential),
            refresh: self.refresh.load()?.map(RefreshCredential),
        })
    }

    fn write_locked(&self, pair: &CredentialPair) -> Result<()> {
        let previous_access = self.access.load().ok().flatten();

        self.access
            .save(pair.access.expose())
            .context("Failed to store access credential")?;

        if let Err(e) = self.refresh.save(pair.refresh.expose()) {
            // Roll back so the tiers keep agreeing with each other
            let rollback = match previous_access {
                Some(ref value) => self.access.save(value),
                None => self.access.remove(),
            };
            if let Err(rollback_err) = rollback {
                warn!(error = %rollback_err, "Failed to roll back access credential");
            }
            return Err(e).context("Failed to store refresh credential");
        }

        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}
