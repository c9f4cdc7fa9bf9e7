use serde_json::{Map, Value};

use super::EngagementTracker;

/// What instrumented page components get handed: a cheap, cloneable handle
/// with fire-and-forget calls. Components own no tracking logic.
#[derive(Clone)]
pub struct TrackingHook {
    tracker: EngagementTracker,
}

impl TrackingHook {
    pub fn new(tracker: EngagementTracker) -> Self {
        Self { tracker }
    }

    pub fn track_page_view(&self, page_name: &str) {
        self.tracker.track_named_page_view(page_name);
    }

    pub fn track_click(&self, element_id: &str, element_text: &str, location: &str) {
        self.tracker
            .track_reported_click(element_id, element_text, location);
    }

    pub fn track_conversion(&self, conversion_type: &str, value: Option<f64>) {
        self.tracker.track_conversion(conversion_type, value);
    }

    pub fn track_custom_event(&self, name: &str, metadata: Map<String, Value>) {
        self.tracker.track_custom_event(name, metadata);
    }

    pub fn track_lead_capture(&self, source: &str) {
        self.tracker.track_lead_capture(source);
    }
}

impl From<&EngagementTracker> for TrackingHook {
    fn from(tracker: &EngagementTracker) -> Self {
        Self::new(tracker.clone())
    }
}
