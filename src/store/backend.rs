use std::collections::HashMap;

use thiserror::Error;

/// Failures raised by a storage capability. They never leave
/// [`LocalEventStore`](super::LocalEventStore); it degrades instead.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage quota exceeded: value of {size} bytes exceeds limit of {limit} bytes")]
    QuotaExceeded { size: usize, limit: usize },

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Persistent,
    InMemory,
}

/// String key-value surface the local buffer is built on.
pub trait KeyValueStore: Send {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set_raw(&mut self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;
    fn kind(&self) -> StoreKind;
}

/// Process-local map. Lives only as long as the page that owns it.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get_raw(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.get(key).cloned())
    }

    fn set_raw(&mut self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.entries.remove(key);
        Ok(())
    }

    fn kind(&self) -> StoreKind {
        StoreKind::InMemory
    }
}

const PROBE_KEY: &str = "__analytics_probe__";

/// Capability probe run once when a store is selected: a value must survive a
/// write/read round trip and be removable.
pub fn probe(store: &mut dyn KeyValueStore) -> Result<(), StorageError> {
    store.set_raw(PROBE_KEY, "1")?;
    let read_back = store.get_raw(PROBE_KEY)?;
    store.remove(PROBE_KEY)?;
    match read_back.as_deref() {
        Some("1") => Ok(()),
        _ => Err(StorageError::Unavailable(
            "probe value did not survive a round trip".into(),
        )),
    }
}
