//! Credential storage for platform tokens and API keys
//!
//! Secrets are addressed by a service name (`socialdeck.{platform}`, or
//! `socialdeck.ai` for the content generator) and a key such as
//! `access_token`. Storage is layered:
//!
//! - `KeyringStore`: the OS keyring (primary)
//! - `PlainFileStore`: a TOML file readable only by the owner (fallback)
//! - `MemoryStore`: process-local, used by tests and mock mode
//! - `CredentialManager`: environment overrides, then the stores in order
//!
//! ```no_run
//! use libsocialdeck::credentials::{CredentialConfig, CredentialManager};
//!
//! # fn example() -> libsocialdeck::Result<()> {
//! let manager = CredentialManager::new(CredentialConfig::default())?;
//! manager.store("socialdeck.telegram", "bot_token", "123:abc")?;
//! let token = manager.retrieve("socialdeck.telegram", "bot_token")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{CredentialError, DeckError, Result};
use crate::types::Platform;

/// Service name under which a platform's secrets are stored
pub fn service_name(platform: Platform) -> String {
    format!("socialdeck.{}", platform.as_str())
}

/// Service name for the AI provider key
pub const AI_SERVICE: &str = "socialdeck.ai";

/// Keys a platform's client and OAuth flow read from its service
pub fn credential_keys(platform: Platform) -> &'static [&'static str] {
    match platform {
        Platform::Twitter | Platform::LinkedIn => {
            &["access_token", "refresh_token", "token_expires_at", "client_secret"]
        }
        Platform::Facebook => &["page_access_token"],
        Platform::Telegram => &["bot_token"],
        Platform::Instagram | Platform::YouTube | Platform::WhatsApp | Platform::GitHub => {
            &["access_token"]
        }
    }
}

/// The credential a platform client publishes with
pub fn primary_credential_key(platform: Platform) -> &'static str {
    credential_keys(platform).first().copied().unwrap_or("access_token")
}

/// Common interface for all storage backends
pub trait CredentialStore: Send + Sync {
    fn store(&self, service: &str, key: &str, value: &str) -> Result<()>;

    /// Returns `CredentialError::NotFound` when the entry is absent
    fn retrieve(&self, service: &str, key: &str) -> Result<String>;

    /// Deleting a missing entry is not an error
    fn delete(&self, service: &str, key: &str) -> Result<()>;

    fn exists(&self, service: &str, key: &str) -> Result<bool>;

    /// Identifier used in logs, e.g. "keyring"
    fn backend_name(&self) -> &str;
}

/// OS-native keyring storage (Keychain, Credential Manager, Secret Service)
pub struct KeyringStore;

impl KeyringStore {
    /// Fails with `KeyringUnavailable` when no keyring can be reached
    pub fn new() -> Result<Self> {
        keyring::Entry::new("socialdeck.test", "availability_check").map_err(|e| {
            CredentialError::KeyringUnavailable(format!("OS keyring not accessible: {}", e))
        })?;
        Ok(Self)
    }

    fn entry(service: &str, key: &str) -> Result<keyring::Entry> {
        keyring::Entry::new(service, key)
            .map_err(|e| CredentialError::KeyringUnavailable(e.to_string()).into())
    }
}

impl CredentialStore for KeyringStore {
    fn store(&self, service: &str, key: &str, value: &str) -> Result<()> {
        Self::entry(service, key)?
            .set_password(value)
            .map_err(|e| CredentialError::Keyring(e.to_string()))?;
        tracing::debug!("Stored credential for {}.{} in OS keyring", service, key);
        Ok(())
    }

    fn retrieve(&self, service: &str, key: &str) -> Result<String> {
        match Self::entry(service, key)?.get_password() {
            Ok(password) => Ok(password),
            Err(keyring::Error::NoEntry) => {
                Err(CredentialError::NotFound(format!("{}.{}", service, key)).into())
            }
            Err(e) => Err(CredentialError::Keyring(e.to_string()).into()),
        }
    }

    fn delete(&self, service: &str, key: &str) -> Result<()> {
        match Self::entry(service, key)?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CredentialError::Keyring(e.to_string()).into()),
        }
    }

    fn exists(&self, service: &str, key: &str) -> Result<bool> {
        match Self::entry(service, key)?.get_password() {
            Ok(_) => Ok(true),
            Err(keyring::Error::NoEntry) => Ok(false),
            Err(e) => Err(CredentialError::Keyring(e.to_string()).into()),
        }
    }

    fn backend_name(&self) -> &str {
        "keyring"
    }
}

type CredentialTable = BTreeMap<String, BTreeMap<String, String>>;

/// Owner-only TOML file, one table per service
///
/// ```toml
/// ["socialdeck.telegram"]
/// bot_token = "123:abc"
/// ```
pub struct PlainFileStore {
    file: PathBuf,
    lock: RwLock<()>,
}

impl PlainFileStore {
    /// `dir` is the credential directory; the file is `credentials.toml` inside it
    pub fn new(dir: PathBuf) -> Self {
        Self {
            file: dir.join("credentials.toml"),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.file
    }

    fn read_table(&self) -> Result<CredentialTable> {
        if !self.file.exists() {
            return Ok(CredentialTable::new());
        }
        let metadata = std::fs::symlink_metadata(&self.file).map_err(CredentialError::Io)?;
        if metadata.file_type().is_symlink() {
            return Err(CredentialError::Format(format!(
                "{} is a symlink; refusing to read credentials through it",
                self.file.display()
            ))
            .into());
        }
        let content = std::fs::read_to_string(&self.file).map_err(CredentialError::Io)?;
        toml::from_str(&content).map_err(|e| CredentialError::Format(e.to_string()).into())
    }

    fn write_table(&self, table: &CredentialTable) -> Result<()> {
        if let Some(parent) = self.file.parent() {
            std::fs::create_dir_all(parent).map_err(CredentialError::Io)?;
        }
        let content =
            toml::to_string(table).map_err(|e| CredentialError::Format(e.to_string()))?;
        std::fs::write(&self.file, content).map_err(CredentialError::Io)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&self.file, std::fs::Permissions::from_mode(0o600))
                .map_err(CredentialError::Io)?;
        }
        Ok(())
    }
}

impl CredentialStore for PlainFileStore {
    fn store(&self, service: &str, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        let mut table = self.read_table()?;
        table
            .entry(service.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
        self.write_table(&table)?;
        tracing::debug!(
            "Stored credential for {}.{} in {}",
            service,
            key,
            self.file.display()
        );
        Ok(())
    }

    fn retrieve(&self, service: &str, key: &str) -> Result<String> {
        let _guard = self.lock.read().unwrap_or_else(|e| e.into_inner());
        self.read_table()?
            .get(service)
            .and_then(|entries| entries.get(key))
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(format!("{}.{}", service, key)).into())
    }

    fn delete(&self, service: &str, key: &str) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());
        let mut table = self.read_table()?;
        let removed = table
            .get_mut(service)
            .map(|entries| entries.remove(key).is_some())
            .unwrap_or(false);
        if removed {
            table.retain(|_, entries| !entries.is_empty());
            self.write_table(&table)?;
        }
        Ok(())
    }

    fn exists(&self, service: &str, key: &str) -> Result<bool> {
        let _guard = self.lock.read().unwrap_or_else(|e| e.into_inner());
        Ok(self
            .read_table()?
            .get(service)
            .is_some_and(|entries| entries.contains_key(key)))
    }

    fn backend_name(&self) -> &str {
        "plain_file"
    }
}

/// Process-local store
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<(String, String), String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CredentialStore for MemoryStore {
    fn store(&self, service: &str, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert((service.to_string(), key.to_string()), value.to_string());
        Ok(())
    }

    fn retrieve(&self, service: &str, key: &str) -> Result<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&(service.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(format!("{}.{}", service, key)).into())
    }

    fn delete(&self, service: &str, key: &str) -> Result<()> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&(service.to_string(), key.to_string()));
        Ok(())
    }

    fn exists(&self, service: &str, key: &str) -> Result<bool> {
        Ok(self
            .entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&(service.to_string(), key.to_string())))
    }

    fn backend_name(&self) -> &str {
        "memory"
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// OS keyring, falling back to the plain file when unavailable
    #[default]
    Keyring,
    /// Owner-only TOML file
    Plain,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    #[serde(default)]
    pub storage: StorageBackend,

    /// Directory for file storage (unused by the keyring)
    #[serde(default = "default_credential_path")]
    pub path: String,
}

fn default_credential_path() -> String {
    "~/.config/socialdeck/credentials".to_string()
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            storage: StorageBackend::Keyring,
            path: default_credential_path(),
        }
    }
}

impl CredentialConfig {
    pub fn expand_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.path).to_string())
    }
}

/// Environment variable that overrides a stored credential
///
/// `("socialdeck.twitter", "access_token")` maps to `SOCIALDECK_TWITTER_ACCESS_TOKEN`.
pub fn env_var_name(service: &str, key: &str) -> String {
    let scope = service.strip_prefix("socialdeck.").unwrap_or(service);
    format!("SOCIALDECK_{}_{}", scope, key)
        .to_uppercase()
        .replace(['.', '-'], "_")
}

/// Facade over the configured stores
pub struct CredentialManager {
    stores: Vec<Box<dyn CredentialStore>>,
}

impl CredentialManager {
    /// Build the store list from configuration
    ///
    /// With `storage = "keyring"` the keyring comes first and the plain file
    /// is kept as a fallback, so credentials written on a headless machine
    /// stay readable.
    pub fn new(config: CredentialConfig) -> Result<Self> {
        let mut stores: Vec<Box<dyn CredentialStore>> = Vec::new();

        if config.storage == StorageBackend::Keyring {
            match KeyringStore::new() {
                Ok(store) => {
                    tracing::debug!("Using OS keyring for credential storage");
                    stores.push(Box::new(store));
                }
                Err(e) => {
                    tracing::warn!("{}. Falling back to the credentials file.", e);
                }
            }
        }

        stores.push(Box::new(PlainFileStore::new(config.expand_path())));
        Ok(Self { stores })
    }

    /// Manager over explicit stores, first one receives writes
    pub fn with_stores(stores: Vec<Box<dyn CredentialStore>>) -> Result<Self> {
        if stores.is_empty() {
            return Err(CredentialError::NoStoreAvailable.into());
        }
        Ok(Self { stores })
    }

    /// Manager backed only by process memory
    pub fn in_memory() -> Self {
        Self {
            stores: vec![Box::new(MemoryStore::new())],
        }
    }

    pub fn store(&self, service: &str, key: &str, value: &str) -> Result<()> {
        let store = self
            .stores
            .first()
            .ok_or(CredentialError::NoStoreAvailable)?;
        store.store(service, key, value)?;
        tracing::debug!(
            "Stored credential for {}.{} using {} backend",
            service,
            key,
            store.backend_name()
        );
        Ok(())
    }

    /// Environment first, then each store in order
    pub fn retrieve(&self, service: &str, key: &str) -> Result<String> {
        if let Ok(value) = std::env::var(env_var_name(service, key)) {
            if !value.is_empty() {
                return Ok(value);
            }
        }

        for store in &self.stores {
            match store.retrieve(service, key) {
                Ok(value) => return Ok(value),
                Err(DeckError::Credential(CredentialError::NotFound(_))) => continue,
                Err(e) => return Err(e),
            }
        }

        Err(CredentialError::NotFound(format!("{}.{}", service, key)).into())
    }

    /// Like `retrieve`, but absence is `None` rather than an error
    pub fn retrieve_optional(&self, service: &str, key: &str) -> Result<Option<String>> {
        match self.retrieve(service, key) {
            Ok(value) => Ok(Some(value)),
            Err(DeckError::Credential(CredentialError::NotFound(_))) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Remove from every store
    pub fn delete(&self, service: &str, key: &str) -> Result<()> {
        for store in &self.stores {
            store.delete(service, key)?;
        }
        Ok(())
    }

    pub fn exists(&self, service: &str, key: &str) -> Result<bool> {
        if std::env::var(env_var_name(service, key)).is_ok_and(|v| !v.is_empty()) {
            return Ok(true);
        }
        for store in &self.stores {
            if store.exists(service, key)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn backends(&self) -> Vec<&str> {
        self.stores.iter().map(|s| s.backend_name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn test_env_var_name() {
        assert_eq!(
            env_var_name("socialdeck.twitter", "access_token"),
            "SOCIALDECK_TWITTER_ACCESS_TOKEN"
        );
        assert_eq!(env_var_name(AI_SERVICE, "api_key"), "SOCIALDECK_AI_API_KEY");
        assert_eq!(
            env_var_name("socialdeck.oauth-state", "linkedin"),
            "SOCIALDECK_OAUTH_STATE_LINKEDIN"
        );
    }

    #[test]
    fn test_credential_keys() {
        assert!(credential_keys(Platform::Telegram).contains(&"bot_token"));
        assert!(credential_keys(Platform::LinkedIn).contains(&"client_secret"));
        assert!(!credential_keys(Platform::GitHub).contains(&"client_secret"));
        assert_eq!(primary_credential_key(Platform::Facebook), "page_access_token");
        assert_eq!(primary_credential_key(Platform::Twitter), "access_token");
    }

    #[test]
    fn test_service_name() {
        assert_eq!(service_name(Platform::LinkedIn), "socialdeck.linkedin");
        assert_eq!(service_name(Platform::WhatsApp), "socialdeck.whatsapp");
    }

    #[test]
    fn test_plain_file_store_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = PlainFileStore::new(dir.path().to_path_buf());

        assert!(!store.exists("socialdeck.telegram", "bot_token").unwrap());
        store
            .store("socialdeck.telegram", "bot_token", "123:abc")
            .unwrap();
        store
            .store("socialdeck.github", "access_token", "ghp_x")
            .unwrap();

        assert_eq!(
            store.retrieve("socialdeck.telegram", "bot_token").unwrap(),
            "123:abc"
        );
        assert!(store.exists("socialdeck.github", "access_token").unwrap());

        store.delete("socialdeck.telegram", "bot_token").unwrap();
        assert!(matches!(
            store.retrieve("socialdeck.telegram", "bot_token"),
            Err(DeckError::Credential(CredentialError::NotFound(_)))
        ));
        // Deleting again is fine
        store.delete("socialdeck.telegram", "bot_token").unwrap();
        assert!(store.exists("socialdeck.github", "access_token").unwrap());
    }

    #[cfg(unix)]
    #[test]
    fn test_plain_file_store_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let store = PlainFileStore::new(dir.path().to_path_buf());
        store.store("socialdeck.ai", "api_key", "sk-test").unwrap();

        let mode = std::fs::metadata(store.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_plain_file_store_rejects_garbage() {
        let dir = TempDir::new().unwrap();
        let store = PlainFileStore::new(dir.path().to_path_buf());
        std::fs::write(store.path(), "not [valid toml").unwrap();
        assert!(matches!(
            store.retrieve("socialdeck.ai", "api_key"),
            Err(DeckError::Credential(CredentialError::Format(_)))
        ));
    }

    #[test]
    fn test_manager_falls_through_stores() {
        let first = MemoryStore::new();
        let second = MemoryStore::new();
        second
            .store("socialdeck.facebook", "page_token", "fb-token")
            .unwrap();

        let manager =
            CredentialManager::with_stores(vec![Box::new(first), Box::new(second)]).unwrap();
        assert_eq!(manager.backends(), vec!["memory", "memory"]);
        assert_eq!(
            manager
                .retrieve("socialdeck.facebook", "page_token")
                .unwrap(),
            "fb-token"
        );
        assert_eq!(
            manager
                .retrieve_optional("socialdeck.facebook", "missing")
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_manager_requires_a_store() {
        assert!(matches!(
            CredentialManager::with_stores(Vec::new()),
            Err(DeckError::Credential(CredentialError::NoStoreAvailable))
        ));
    }

    #[test]
    #[serial]
    fn test_manager_env_override() {
        let manager = CredentialManager::in_memory();
        manager
            .store("socialdeck.youtube", "access_token", "stored")
            .unwrap();

        std::env::set_var("SOCIALDECK_YOUTUBE_ACCESS_TOKEN", "from-env");
        let value = manager.retrieve("socialdeck.youtube", "access_token");
        let exists = manager.exists("socialdeck.youtube", "refresh_token");
        std::env::remove_var("SOCIALDECK_YOUTUBE_ACCESS_TOKEN");

        assert_eq!(value.unwrap(), "from-env");
        assert!(!exists.unwrap());
        assert_eq!(
            manager
                .retrieve("socialdeck.youtube", "access_token")
                .unwrap(),
            "stored"
        );
    }
}
