use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

pub const DEFAULT_ENDPOINT_PATH: &str = "/api/analytics/track";
pub const DEFAULT_BUFFER_CAPACITY: usize = 1000;
pub const DEFAULT_MILESTONES: [u32; 4] = [25, 50, 75, 90];

const ORIGIN_ENV: &str = "PLANTAS_ANALYTICS_ORIGIN";
const DEBUG_ENV: &str = "PLANTAS_ANALYTICS_DEBUG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TrackerConfig {
    /// Serving origin, e.g. `https://plantas.example`. The collector lives at
    /// `origin + endpoint_path`.
    pub origin: String,
    pub endpoint_path: String,
    pub buffer_capacity: usize,
    pub recent_events: usize,
    pub scroll_debounce_ms: u64,
    pub dwell_interval_secs: u64,
    /// Ascending scroll-depth thresholds in percent.
    pub milestones: Vec<u32>,
    /// Prefix applied to every local storage key. Empty keeps the bare
    /// `analytics_*` names.
    pub key_namespace: String,
    pub debug: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:3000".into(),
            endpoint_path: DEFAULT_ENDPOINT_PATH.into(),
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
            recent_events: 10,
            scroll_debounce_ms: 1000,
            dwell_interval_secs: 30,
            milestones: DEFAULT_MILESTONES.to_vec(),
            key_namespace: String::new(),
            debug: false,
        }
    }
}

impl TrackerConfig {
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = origin.into();
        self
    }

    pub fn endpoint_url(&self) -> String {
        format!(
            "{}{}",
            self.origin.trim_end_matches('/'),
            self.endpoint_path
        )
    }

    pub fn scroll_debounce(&self) -> Duration {
        Duration::from_millis(self.scroll_debounce_ms)
    }

    pub fn dwell_interval(&self) -> Duration {
        // A zero period would spin the dwell ticker.
        Duration::from_secs(self.dwell_interval_secs.max(1))
    }

    /// Debug affordances are offered on explicit request or when serving from
    /// a local development host.
    pub fn debug_enabled(&self) -> bool {
        self.debug || is_local_origin(&self.origin)
    }

    /// Milestones sorted ascending with duplicates and out-of-range values dropped.
    pub fn normalized_milestones(&self) -> Vec<u32> {
        let mut milestones: Vec<u32> = self
            .milestones
            .iter()
            .copied()
            .filter(|m| (1..=100).contains(m))
            .collect();
        milestones.sort_unstable();
        milestones.dedup();
        milestones
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(origin) = std::env::var(ORIGIN_ENV) {
            if !origin.trim().is_empty() {
                self.origin = origin.trim().to_string();
            }
        }
        if let Ok(value) = std::env::var(DEBUG_ENV) {
            self.debug = value == "1" || value.eq_ignore_ascii_case("true");
        }
    }
}

fn is_local_origin(origin: &str) -> bool {
    let host = origin
        .split("://")
        .nth(1)
        .unwrap_or(origin)
        .split(['/', ':'])
        .next()
        .unwrap_or_default();
    host == "localhost" || host == "127.0.0.1"
}

/// JSON-file backed tracker configuration.
pub struct ConfigStore {
    path: PathBuf,
    data: RwLock<TrackerConfig>,
}

impl ConfigStore {
    /// Loads `path` if it exists. An unreadable file is an error; a file that
    /// does not parse falls back to defaults.
    pub fn new(path: PathBuf) -> Result<Self> {
        let mut data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read tracker config from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            TrackerConfig::default()
        };
        data.apply_env_overrides();

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn config(&self) -> TrackerConfig {
        match self.data.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn update(&self, config: TrackerConfig) -> Result<()> {
        let mut guard = match self.data.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = config;
        self.persist(&guard)
    }

    fn persist(&self, data: &TrackerConfig) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write tracker config to {}", self.path.display()))
    }
}
