//! Key/value stores and the persisted device identity
//!
//! `IdentityStore` reads each field under its current key first and falls back
//! to the legacy `sabil_*` key; a legacy hit is copied forward so later reads
//! never touch the old name again.

use crate::error::{ErrorContext, RuptError, RuptResult};
use crate::traits::KeyValueStore;
use crate::types::LocalIdentity;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};

pub const DEVICE_ID_KEY: &str = "rupt_device_id";
pub const LEGACY_DEVICE_ID_KEY: &str = "sabil_device_id";
pub const DEVICE_IDENTITY_KEY: &str = "rupt_device_identity";
pub const LEGACY_DEVICE_IDENTITY_KEY: &str = "sabil_device_identity";

fn poisoned(component: &str) -> RuptError {
    RuptError::Storage {
        message: "store lock poisoned".to_string(),
        source: None,
        context: ErrorContext::new(component),
    }
}

/// In-process store, used by tests and hosts without durable storage
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: RwLock::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (k.into(), v.into()))
                    .collect(),
            ),
        }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> RuptResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| poisoned("memory_store"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> RuptResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned("memory_store"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> RuptResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned("memory_store"))?;
        entries.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk. Writes go through a temp file
/// and a rename.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: RwLock<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open the store, creating parent directories as needed. A missing file is
    /// an empty store.
    pub fn open<P: AsRef<Path>>(path: P) -> RuptResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let entries = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            if raw.trim().is_empty() {
                BTreeMap::new()
            } else {
                serde_json::from_str(&raw).map_err(|e| RuptError::Storage {
                    message: format!("Failed to parse store file {}: {}", path.display(), e),
                    source: Some(Box::new(e)),
                    context: ErrorContext::new("file_store")
                        .with_operation("open")
                        .with_suggestion("Delete the file to reset the stored identity"),
                })?
            }
        } else {
            BTreeMap::new()
        };

        info!("Key/value store opened at: {}", path.display());
        Ok(Self {
            path,
            entries: RwLock::new(entries),
        })
    }

    /// Default location: `<data_dir>/rupt/identity.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::data_dir().map(|d| d.join("rupt").join("identity.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> RuptResult<()> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)?;
        std::fs::rename(&tmp, &self.path)?;
        debug!("Flushed {} entries to {}", entries.len(), self.path.display());
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> RuptResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| poisoned("file_store"))?;
        Ok(entries.get(key).cloned())
    }

    /// The in-memory map changes only once the new contents are on disk
    fn set(&self, key: &str, value: &str) -> RuptResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned("file_store"))?;
        let mut updated = entries.clone();
        updated.insert(key.to_string(), value.to_string());
        self.flush(&updated)?;
        *entries = updated;
        Ok(())
    }

    fn remove(&self, key: &str) -> RuptResult<()> {
        let mut entries = self.entries.write().map_err(|_| poisoned("file_store"))?;
        if !entries.contains_key(key) {
            return Ok(());
        }
        let mut updated = entries.clone();
        updated.remove(key);
        self.flush(&updated)?;
        *entries = updated;
        Ok(())
    }
}

/// Typed access to the persisted device id and identity fingerprint
#[derive(Clone)]
pub struct IdentityStore {
    store: Arc<dyn KeyValueStore>,
}

impl IdentityStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    fn read_with_fallback(&self, key: &str, legacy_key: &str) -> Option<String> {
        match self.store.get(key) {
            Ok(Some(value)) => return Some(value),
            Ok(None) => {}
            Err(e) => {
                e.log();
                return None;
            }
        }

        match self.store.get(legacy_key) {
            Ok(Some(value)) => {
                info!(key, legacy_key, "Migrating identity value from legacy key");
                if let Err(e) = self.store.set(key, &value) {
                    warn!(key, error = %e, "Failed to copy legacy value forward");
                }
                Some(value)
            }
            Ok(None) => None,
            Err(e) => {
                e.log();
                None
            }
        }
    }

    fn write(&self, key: &str, value: Option<&str>) {
        let result = match value {
            Some(value) => self.store.set(key, value),
            None => self.store.remove(key),
        };
        if let Err(e) = result {
            e.log();
        }
    }

    pub fn device_id(&self) -> Option<String> {
        self.read_with_fallback(DEVICE_ID_KEY, LEGACY_DEVICE_ID_KEY)
    }

    pub fn set_device_id(&self, device_id: Option<&str>) {
        self.write(DEVICE_ID_KEY, device_id);
    }

    pub fn device_identity(&self) -> Option<String> {
        self.read_with_fallback(DEVICE_IDENTITY_KEY, LEGACY_DEVICE_IDENTITY_KEY)
    }

    pub fn set_device_identity(&self, identity: Option<&str>) {
        self.write(DEVICE_IDENTITY_KEY, identity);
    }

    pub fn load(&self) -> LocalIdentity {
        LocalIdentity {
            device_id: self.device_id(),
            device_identity: self.device_identity(),
        }
    }
}

impl std::fmt::Debug for IdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityStore").finish_non_exhaustive()
    }
}
