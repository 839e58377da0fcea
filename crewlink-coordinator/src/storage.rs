//! Durable key-value storage
//!
//! Two namespaces: `Sync` for small cross-device settings (the bearer
//! token), `Local` for larger device-local state (the unread ledger, the
//! analytics buffer). Values are JSON.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde_json::Value;

use crewlink_utils::{paths, CrewlinkError, Result};

/// Storage namespace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Small, synchronized across devices
    Sync,
    /// Larger, device-local
    Local,
}

/// Abstract durable key-value storage
pub trait Storage: Send + Sync {
    fn get(&self, ns: Namespace, key: &str) -> Result<Option<Value>>;
    fn set(&self, ns: Namespace, key: &str, value: Value) -> Result<()>;
    fn remove(&self, ns: Namespace, key: &str) -> Result<()>;
}

/// Write-through JSON file store, one file per namespace
pub struct FileStorage {
    sync: Mutex<StoreFile>,
    local: Mutex<StoreFile>,
}

struct StoreFile {
    path: PathBuf,
    entries: HashMap<String, Value>,
}

impl StoreFile {
    fn load(path: PathBuf) -> Result<Self> {
        let entries = if path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|e| CrewlinkError::FileRead {
                path: path.clone(),
                source: e,
            })?;
            serde_json::from_str(&text)
                .map_err(|e| CrewlinkError::storage(format!("Corrupt store {}: {}", path.display(), e)))?
        } else {
            HashMap::new()
        };
        Ok(Self { path, entries })
    }

    fn persist(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.entries)
            .map_err(|e| CrewlinkError::storage(e.to_string()))?;
        // Write-then-rename so a crash mid-write never corrupts the store
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text).map_err(|e| CrewlinkError::FileWrite {
            path: tmp.clone(),
            source: e,
        })?;
        std::fs::rename(&tmp, &self.path).map_err(|e| CrewlinkError::FileWrite {
            path: self.path.clone(),
            source: e,
        })?;
        Ok(())
    }
}

impl FileStorage {
    /// Open stores at explicit paths (parents must exist)
    pub fn open(sync_path: impl AsRef<Path>, local_path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            sync: Mutex::new(StoreFile::load(sync_path.as_ref().to_path_buf())?),
            local: Mutex::new(StoreFile::load(local_path.as_ref().to_path_buf())?),
        })
    }

    /// Open the default XDG-located stores, creating the data dir
    pub fn open_default() -> Result<Self> {
        let dir = paths::data_dir();
        paths::ensure_dir(&dir)?;
        Self::open(paths::sync_store_file(), paths::local_store_file())
    }

    fn file(&self, ns: Namespace) -> &Mutex<StoreFile> {
        match ns {
            Namespace::Sync => &self.sync,
            Namespace::Local => &self.local,
        }
    }
}

impl Storage for FileStorage {
    fn get(&self, ns: Namespace, key: &str) -> Result<Option<Value>> {
        let store = self
            .file(ns)
            .lock()
            .map_err(|_| CrewlinkError::storage("store lock poisoned"))?;
        Ok(store.entries.get(key).cloned())
    }

    fn set(&self, ns: Namespace, key: &str, value: Value) -> Result<()> {
        let mut store = self
            .file(ns)
            .lock()
            .map_err(|_| CrewlinkError::storage("store lock poisoned"))?;
        store.entries.insert(key.to_string(), value);
        store.persist()
    }

    fn remove(&self, ns: Namespace, key: &str) -> Result<()> {
        let mut store = self
            .file(ns)
            .lock()
            .map_err(|_| CrewlinkError::storage("store lock poisoned"))?;
        if store.entries.remove(key).is_some() {
            store.persist()?;
        }
        Ok(())
    }
}

/// In-memory store for tests
#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<(Namespace, String), Value>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get(&self, ns: Namespace, key: &str) -> Result<Option<Value>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| CrewlinkError::storage("store lock poisoned"))?;
        Ok(entries.get(&(ns, key.to_string())).cloned())
    }

    fn set(&self, ns: Namespace, key: &str, value: Value) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CrewlinkError::storage("store lock poisoned"))?;
        entries.insert((ns, key.to_string()), value);
        Ok(())
    }

    fn remove(&self, ns: Namespace, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| CrewlinkError::storage("store lock poisoned"))?;
        entries.remove(&(ns, key.to_string()));
        Ok(())
    }
}
