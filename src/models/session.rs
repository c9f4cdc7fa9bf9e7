use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::EventType;

/// Persisted under `analytics_session`. Field names follow the stored JSON
/// (`sessionId`, `startTime`, ...), which other page scripts read directly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub page_views: u64,
    pub clicks: u64,
    pub last_activity: DateTime<Utc>,
}

impl SessionRecord {
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            start_time: now,
            page_views: 0,
            clicks: 0,
            last_activity: now,
        }
    }

    /// Bumps the running counters for one recorded event.
    pub fn record(&mut self, event_type: &EventType, at: DateTime<Utc>) {
        match event_type {
            EventType::PageView => self.page_views += 1,
            EventType::Click => self.clicks += 1,
            _ => {}
        }
        if at > self.last_activity {
            self.last_activity = at;
        }
    }
}
