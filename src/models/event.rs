//! Event envelope shared by the dispatcher (wire body) and the local buffer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Kind of observation an [`Event`] records.
///
/// Serialized as a bare string so caller-supplied custom names round-trip
/// verbatim through the wire format and the local buffer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventType {
    PageView,
    Click,
    Scroll,
    ScrollMilestone,
    TimeOnPage,
    PageExit,
    LeadCapture,
    Conversion,
    Custom(String),
}

impl EventType {
    pub fn as_str(&self) -> &str {
        match self {
            EventType::PageView => "page_view",
            EventType::Click => "click",
            EventType::Scroll => "scroll",
            EventType::ScrollMilestone => "scroll_milestone",
            EventType::TimeOnPage => "time_on_page",
            EventType::PageExit => "page_exit",
            EventType::LeadCapture => "lead_capture",
            EventType::Conversion => "conversion",
            EventType::Custom(name) => name.as_str(),
        }
    }
}

impl From<String> for EventType {
    fn from(value: String) -> Self {
        match value.as_str() {
            "page_view" => EventType::PageView,
            "click" => EventType::Click,
            "scroll" => EventType::Scroll,
            "scroll_milestone" => EventType::ScrollMilestone,
            "time_on_page" => EventType::TimeOnPage,
            "page_exit" => EventType::PageExit,
            "lead_capture" => EventType::LeadCapture,
            "conversion" => EventType::Conversion,
            _ => EventType::Custom(value),
        }
    }
}

impl From<&str> for EventType {
    fn from(value: &str) -> Self {
        EventType::from(value.to_string())
    }
}

impl From<EventType> for String {
    fn from(value: EventType) -> Self {
        match value {
            EventType::Custom(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One observed interaction or lifecycle signal. Never mutated after it is
/// handed to the dispatcher or the buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub event_type: EventType,
    pub page_url: String,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_href: Option<String>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Event {
    pub fn new(
        event_type: EventType,
        page_url: impl Into<String>,
        session_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_type,
            page_url: page_url.into(),
            session_id: session_id.into(),
            timestamp: Some(timestamp),
            element_id: None,
            element_text: None,
            element_href: None,
            metadata: Map::new(),
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_element(
        mut self,
        element_id: impl Into<String>,
        element_text: impl Into<String>,
        element_href: Option<String>,
    ) -> Self {
        self.element_id = Some(element_id.into());
        self.element_text = Some(element_text.into());
        self.element_href = element_href;
        self
    }

    /// Convenience accessor used by stats and tests.
    pub fn metadata_value(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }
}
