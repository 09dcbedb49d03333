//! Credential storage backends.
//!
//! Credentials are stored like browser cookies: a named value plus
//! attributes (expiry, secure-only, same-site policy). An expired entry
//! reads as absent.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, RwLock};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Entry name for the short-lived bearer credential
pub const ACCESS_TOKEN: &str = "access_token";

/// Entry name for the long-lived refresh credential
pub const REFRESH_TOKEN: &str = "refresh_token";

const SERVICE_NAME: &str = "epicboard";

/// Credentials file name in the cache directory
const CREDENTIALS_FILE: &str = "credentials.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    #[default]
    Strict,
    Lax,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookieAttributes {
    /// `None` means a session entry with no explicit expiry
    pub expires: Option<DateTime<Utc>>,
    pub secure: bool,
    pub same_site: SameSite,
}

impl CookieAttributes {
    /// Entry that lives until explicitly removed.
    pub fn session(secure: bool) -> Self {
        Self {
            expires: None,
            secure,
            same_site: SameSite::Strict,
        }
    }

    /// Entry that expires after `days`.
    pub fn persistent(secure: bool, days: i64) -> Self {
        Self {
            expires: Some(Utc::now() + Duration::days(days)),
            secure,
            same_site: SameSite::Strict,
        }
    }

    pub fn is_persistent(&self) -> bool {
        self.expires.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredential {
    pub value: String,
    pub attributes: CookieAttributes,
}

impl StoredCredential {
    pub fn new(value: impl Into<String>, attributes: CookieAttributes) -> Self {
        Self {
            value: value.into(),
            attributes,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.attributes
            .expires
            .map(|expires| Utc::now() >= expires)
            .unwrap_or(false)
    }
}

/// Shared key-value store for credentials.
///
/// Every in-flight request may read it and any token refresh may write it.
/// Implementations synchronize internally; concurrent writes are
/// last-write-wins.
pub trait CredentialStore: Send + Sync {
    /// Load the raw entry, including expired ones.
    fn load(&self, name: &str) -> Result<Option<StoredCredential>>;

    fn store(&self, name: &str, credential: StoredCredential) -> Result<()>;

    /// Remove an entry. Removing a missing entry is not an error.
    fn remove(&self, name: &str) -> Result<()>;

    /// Current value of a live entry. Empty values read as absent.
    fn get(&self, name: &str) -> Result<Option<String>> {
        Ok(self
            .load(name)?
            .filter(|c| !c.is_expired() && !c.value.is_empty())
            .map(|c| c.value))
    }

    fn set(&self, name: &str, value: &str, attributes: CookieAttributes) -> Result<()> {
        self.store(name, StoredCredential::new(value, attributes))
    }

    /// Remove both the access and refresh tokens.
    fn clear(&self) -> Result<()> {
        self.remove(ACCESS_TOKEN)?;
        self.remove(REFRESH_TOKEN)
    }
}

// ============================================================================
// In-memory store
// ============================================================================

/// Process-local store, used by tests and short-lived sessions.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, StoredCredential>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with an access/refresh pair as session entries.
    pub fn with_tokens(access_token: Option<&str>, refresh_token: Option<&str>) -> Self {
        let store = Self::new();
        {
            let mut entries = store.entries.write().unwrap_or_else(|e| e.into_inner());
            if let Some(token) = access_token {
                entries.insert(
                    ACCESS_TOKEN.to_string(),
                    StoredCredential::new(token, CookieAttributes::session(true)),
                );
            }
            if let Some(token) = refresh_token {
                entries.insert(
                    REFRESH_TOKEN.to_string(),
                    StoredCredential::new(token, CookieAttributes::session(true)),
                );
            }
        }
        store
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self, name: &str) -> Result<Option<StoredCredential>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("Credential store lock poisoned"))?;
        Ok(entries.get(name).cloned())
    }

    fn store(&self, name: &str, credential: StoredCredential) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("Credential store lock poisoned"))?;
        entries.insert(name.to_string(), credential);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("Credential store lock poisoned"))?;
        entries.remove(name);
        Ok(())
    }
}

// ============================================================================
// File store
// ============================================================================

/// Cookie-jar style store persisted as JSON in the cache directory.
pub struct FileCredentialStore {
    cache_dir: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    pub fn new(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            lock: Mutex::new(()),
        }
    }

    fn credentials_path(&self) -> PathBuf {
        self.cache_dir.join(CREDENTIALS_FILE)
    }

    fn read_all(&self) -> Result<HashMap<String, StoredCredential>> {
        let path = self.credentials_path();
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let contents =
            std::fs::read_to_string(&path).context("Failed to read credentials file")?;
        let mut entries: HashMap<String, StoredCredential> =
            serde_json::from_str(&contents).context("Failed to parse credentials file")?;
        entries.retain(|_, c| !c.is_expired());
        Ok(entries)
    }

    fn write_all(&self, entries: &HashMap<String, StoredCredential>) -> Result<()> {
        let path = self.credentials_path();
        std::fs::create_dir_all(&self.cache_dir)
            .context("Failed to create credentials directory")?;
        let contents = serde_json::to_string_pretty(entries)?;
        std::fs::write(&path, contents).context("Failed to write credentials file")?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            if let Err(e) = std::fs::set_permissions(&path, perms) {
                warn!(error = %e, "Failed to restrict credentials file permissions");
            }
        }
        Ok(())
    }

    fn modify(&self, f: impl FnOnce(&mut HashMap<String, StoredCredential>)) -> Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("Credential store lock poisoned"))?;
        let mut entries = self.read_all()?;
        f(&mut entries);
        self.write_all(&entries)
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self, name: &str) -> Result<Option<StoredCredential>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("Credential store lock poisoned"))?;
        Ok(self.read_all()?.remove(name))
    }

    fn store(&self, name: &str, credential: StoredCredential) -> Result<()> {
        self.modify(|entries| {
            entries.insert(name.to_string(), credential);
        })
    }

    fn remove(&self, name: &str) -> Result<()> {
        self.modify(|entries| {
            entries.remove(name);
        })
    }
}

// ============================================================================
// OS keychain store
// ============================================================================

/// Store backed by the OS keychain. Each entry holds the serialized
/// credential with its attributes.
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, name: &str) -> Result<Entry> {
        Entry::new(&self.service, name).context("Failed to create keyring entry")
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CredentialStore for KeyringCredentialStore {
    fn load(&self, name: &str) -> Result<Option<StoredCredential>> {
        match self.entry(name)?.get_password() {
            Ok(raw) => {
                let credential = serde_json::from_str(&raw)
                    .context("Failed to parse credential from keychain")?;
                Ok(Some(credential))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve credential from keychain"),
        }
    }

    fn store(&self, name: &str, credential: StoredCredential) -> Result<()> {
        let raw = serde_json::to_string(&credential)?;
        self.entry(name)?
            .set_password(&raw)
            .context("Failed to store credential in keychain")
    }

    fn remove(&self, name: &str) -> Result<()> {
        match self.entry(name)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => {
                debug!(name = name, "Keychain delete failed");
                Err(e).context("Failed to delete credential from keychain")
            }
        }
    }
}
