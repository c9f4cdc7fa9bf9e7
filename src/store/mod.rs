//! Local event buffer.
//!
//! Wraps a [`KeyValueStore`] capability chosen once at construction. The
//! buffer holds at most `buffer_capacity` events under `analytics_events`
//! (oldest evicted first) and the session record under `analytics_session`.
//! Any storage failure swaps the capability for a fresh [`MemoryStore`] for
//! the remainder of the store's lifetime; nothing is raised to callers.

pub mod backend;
mod migrations;
pub mod sqlite;

use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

pub use backend::{KeyValueStore, MemoryStore, StorageError, StoreKind};
pub use sqlite::SqliteStore;

use crate::{
    config::TrackerConfig,
    models::{Event, EventType, SessionRecord},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub const EVENTS_KEY: &str = "analytics_events";
pub const SESSION_KEY: &str = "analytics_session";

/// Snapshot of the local buffer, computed on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocalStats {
    pub total_events: usize,
    pub session_data: Option<SessionRecord>,
    pub recent_events: Vec<Event>,
    pub page_views: usize,
    pub clicks: usize,
}

impl LocalStats {
    /// Short text used by the development debug affordance.
    pub fn summary(&self) -> String {
        format!(
            "Events: {}\nClicks: {}\nVisits: {}",
            self.total_events, self.clicks, self.page_views
        )
    }
}

pub struct LocalEventStore {
    backend: Mutex<Box<dyn KeyValueStore>>,
    namespace: String,
    capacity: usize,
    recent: usize,
}

impl LocalEventStore {
    /// Opens the persistent SQLite buffer at `path`, falling back to memory
    /// when the file cannot be opened.
    pub fn open(path: impl AsRef<Path>, config: &TrackerConfig) -> Self {
        match SqliteStore::open(path.as_ref()) {
            Ok(store) => {
                log_info!("Buffering analytics events in {}", path.as_ref().display());
                Self::with_backend(Box::new(store), config)
            }
            Err(err) => {
                log_warn!("Local storage unavailable ({err:#}); using in-memory store");
                Self::with_backend(Box::new(MemoryStore::new()), config)
            }
        }
    }

    pub fn in_memory(config: &TrackerConfig) -> Self {
        Self::with_backend(Box::new(MemoryStore::new()), config)
    }

    /// Selects `backend` if it passes the capability probe, otherwise an
    /// in-memory map.
    pub fn with_backend(mut capability: Box<dyn KeyValueStore>, config: &TrackerConfig) -> Self {
        if let Err(err) = backend::probe(capability.as_mut()) {
            log_warn!("Storage probe failed ({err}); using in-memory store");
            capability = Box::new(MemoryStore::new());
        }

        Self {
            backend: Mutex::new(capability),
            namespace: config.key_namespace.clone(),
            capacity: config.buffer_capacity.max(1),
            recent: config.recent_events,
        }
    }

    pub fn kind(&self) -> StoreKind {
        self.lock().kind()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.get_as(key)
    }

    pub fn set<T: Serialize>(&self, key: &str, value: &T) {
        let serialized = match serde_json::to_string(value) {
            Ok(serialized) => serialized,
            Err(err) => {
                log_warn!("Could not serialize value for '{key}': {err}");
                return;
            }
        };
        let key = self.namespaced(key);
        self.run(|store| store.set_raw(&key, &serialized));
    }

    pub fn remove(&self, key: &str) {
        let key = self.namespaced(key);
        self.run(|store| store.remove(&key));
    }

    /// Appends one event in a single read-modify-write, evicting the oldest
    /// entries beyond capacity.
    pub fn append_event(&self, event: &Event) {
        let key = self.namespaced(EVENTS_KEY);
        let capacity = self.capacity;
        self.run(|store| {
            let mut events: Vec<Event> = read_json(store, &key)?.unwrap_or_default();
            events.push(event.clone());
            if events.len() > capacity {
                let overflow = events.len() - capacity;
                events.drain(..overflow);
            }
            store.set_raw(&key, &serde_json::to_string(&events)?)
        });
    }

    pub fn events(&self) -> Vec<Event> {
        self.get_as(EVENTS_KEY).unwrap_or_default()
    }

    pub fn session(&self) -> Option<SessionRecord> {
        self.get_as(SESSION_KEY)
    }

    /// Creates the session record lazily and folds one event into its
    /// counters. A different session id starts a fresh record.
    pub fn touch_session(&self, session_id: &str, event_type: &EventType, at: DateTime<Utc>) {
        let key = self.namespaced(SESSION_KEY);
        self.run(|store| {
            let mut record = match read_json::<SessionRecord>(store, &key)? {
                Some(record) if record.session_id == session_id => record,
                _ => SessionRecord::new(session_id, at),
            };
            record.record(event_type, at);
            store.set_raw(&key, &serde_json::to_string(&record)?)
        });
    }

    pub fn read_stats(&self) -> LocalStats {
        let events = self.events();
        let recent_start = events.len().saturating_sub(self.recent);
        LocalStats {
            total_events: events.len(),
            session_data: self.session(),
            recent_events: events[recent_start..].to_vec(),
            page_views: count_of(&events, &EventType::PageView),
            clicks: count_of(&events, &EventType::Click),
        }
    }

    pub fn clear(&self) {
        self.remove(EVENTS_KEY);
        self.remove(SESSION_KEY);
    }

    fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let key = self.namespaced(key);
        self.run(|store| read_json(store, &key)).flatten()
    }

    fn namespaced(&self, key: &str) -> String {
        format!("{}{}", self.namespace, key)
    }

    fn lock(&self) -> MutexGuard<'_, Box<dyn KeyValueStore>> {
        match self.backend.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Runs `op` against the current capability. On failure the capability
    /// is replaced by memory and `op` is retried once there.
    fn run<T>(
        &self,
        op: impl Fn(&mut dyn KeyValueStore) -> Result<T, StorageError>,
    ) -> Option<T> {
        let mut guard = self.lock();
        match op(guard.as_mut()) {
            Ok(value) => Some(value),
            Err(err) => {
                if guard.kind() == StoreKind::InMemory {
                    log_warn!("In-memory analytics store failed: {err}");
                    return None;
                }
                log_warn!("Local storage failed ({err}); degrading to in-memory store");
                *guard = Box::new(MemoryStore::new());
                match op(guard.as_mut()) {
                    Ok(value) => Some(value),
                    Err(err) => {
                        log_warn!("In-memory analytics store failed: {err}");
                        None
                    }
                }
            }
        }
    }
}

/// Reads and parses one key. Backend failures propagate; unparseable
/// contents are treated as absent.
fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>, StorageError> {
    let Some(raw) = store.get_raw(key)? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(err) => {
            log_warn!("Discarding unreadable '{key}': {err}");
            Ok(None)
        }
    }
}

fn count_of(events: &[Event], event_type: &EventType) -> usize {
    events
        .iter()
        .filter(|event| &event.event_type == event_type)
        .count()
}
