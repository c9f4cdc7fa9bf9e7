use std::sync::{Arc, Mutex, MutexGuard, Weak};

use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};
use tokio::{
    runtime::Handle,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    config::TrackerConfig,
    dispatch::EventDispatcher,
    models::{Event, EventType},
    session::SessionIdentity,
    store::{LocalEventStore, LocalStats},
};

use super::{
    clicks::{element_label, element_text, nearest_interesting, truncate_text},
    dom::{ClickSignal, DomObserver},
    scroll::{scroll_percent, ScrollProgress},
};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

/// Per-page-view state. Reset only by building a new tracker (a reload).
struct PageState {
    started: bool,
    unloaded: bool,
    loaded_at: Instant,
    scroll: ScrollProgress,
    debounce: Option<JoinHandle<()>>,
}

struct TrackerInner {
    config: TrackerConfig,
    dom: Arc<dyn DomObserver>,
    identity: SessionIdentity,
    dispatcher: EventDispatcher,
    store: LocalEventStore,
    state: Mutex<PageState>,
    last_timestamp: Mutex<Option<DateTime<Utc>>>,
    dwell_cancel: CancellationToken,
}

impl Drop for TrackerInner {
    fn drop(&mut self) {
        self.dwell_cancel.cancel();
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = state.debounce.take() {
            handle.abort();
        }
    }
}

/// Turns host signals into events and forwards them to the dispatcher and the
/// local buffer.
///
/// Built once per page load and shared by cloning (or through a
/// [`TrackingHook`](super::TrackingHook)). Every entry point is infallible:
/// failures are logged and the page carries on.
#[derive(Clone)]
pub struct EngagementTracker {
    inner: Arc<TrackerInner>,
}

impl EngagementTracker {
    pub fn new(
        config: TrackerConfig,
        dom: Arc<dyn DomObserver>,
        identity: SessionIdentity,
        dispatcher: EventDispatcher,
        store: LocalEventStore,
    ) -> Self {
        let milestones = config.normalized_milestones();
        Self {
            inner: Arc::new(TrackerInner {
                config,
                dom,
                identity,
                dispatcher,
                store,
                state: Mutex::new(PageState {
                    started: false,
                    unloaded: false,
                    loaded_at: Instant::now(),
                    scroll: ScrollProgress::new(milestones),
                    debounce: None,
                }),
                last_timestamp: Mutex::new(None),
                dwell_cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.inner.dispatcher
    }

    pub fn store(&self) -> &LocalEventStore {
        &self.inner.store
    }

    pub fn session_id(&self) -> String {
        self.inner.identity.get_or_create_session_id()
    }

    pub fn enable_tracking(&self) {
        self.inner.dispatcher.enable();
        log_info!("Analytics enabled");
    }

    pub fn disable_tracking(&self) {
        self.inner.dispatcher.disable();
        log_info!("Analytics disabled");
    }

    /// Page load: records the page view and starts the dwell ticker. Only the
    /// first call has any effect.
    pub fn start(&self) {
        {
            let mut state = self.inner.lock_state();
            if state.started || state.unloaded {
                return;
            }
            state.started = true;
            state.loaded_at = Instant::now();
        }

        let dom = &self.inner.dom;
        let mut metadata = Map::new();
        metadata.insert("title".into(), json!(dom.document_title()));
        metadata.insert("referrer".into(), json!(dom.referrer()));
        metadata.insert("screen_size".into(), json!(dom.screen_size().to_string()));
        metadata.insert("viewport".into(), json!(dom.viewport_size().to_string()));
        metadata.insert("user_agent".into(), json!(dom.user_agent()));
        self.inner.emit(EventType::PageView, metadata);

        self.spawn_dwell_ticker();
        log_info!(
            "Analytics initialized - session {}",
            self.inner.identity.get_or_create_session_id()
        );
    }

    /// Document-level click. Only the nearest allow-listed element on the
    /// propagation path produces an event.
    pub fn on_click(&self, signal: &ClickSignal) {
        if self.inner.is_unloaded() {
            return;
        }
        let Some(element) = nearest_interesting(&signal.path) else {
            return;
        };

        let viewport = self.inner.dom.viewport_size();
        let rect = element.rect;
        let mut metadata = Map::new();
        metadata.insert("tag_name".into(), json!(element.tag_name));
        metadata.insert(
            "position".into(),
            json!({
                "x": pixels(rect.left),
                "y": pixels(rect.top),
                "width": pixels(rect.width),
                "height": pixels(rect.height),
            }),
        );
        metadata.insert("visible".into(), json!(rect.fits_within(viewport)));
        metadata.insert("click_x".into(), json!(signal.client_x));
        metadata.insert("click_y".into(), json!(signal.client_y));

        let text = element_text(element);
        log_debug!("Click tracked: {text}");
        let event = self
            .inner
            .build_event(EventType::Click, metadata)
            .with_element(
                element_label(element),
                text,
                Some(element.href.clone().unwrap_or_default()),
            );
        self.inner.record(event);
    }

    /// Scroll signal. Fires newly crossed milestones immediately and
    /// (re)arms the debounced `scroll` report.
    pub fn on_scroll(&self) {
        if self.inner.is_unloaded() {
            return;
        }
        let metrics = self.inner.dom.scroll_metrics();
        let Some(percent) = scroll_percent(&metrics) else {
            log_debug!("Content does not overflow the viewport; scroll ignored");
            return;
        };

        let crossed = self.inner.lock_state().scroll.observe(percent);
        for milestone in crossed {
            let mut metadata = Map::new();
            metadata.insert("scroll_percent".into(), json!(milestone));
            metadata.insert("scroll_position".into(), json!(pixels(metrics.scroll_y)));
            metadata.insert("page_height".into(), json!(pixels(metrics.document_height)));
            self.inner.emit(EventType::ScrollMilestone, metadata);
            log_debug!("Scroll milestone: {milestone}%");
        }

        let Some(runtime) = self.inner.runtime() else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        let quiet = self.inner.config.scroll_debounce();
        let scroll_position = pixels(metrics.scroll_y);

        let mut state = self.inner.lock_state();
        if let Some(pending) = state.debounce.take() {
            pending.abort();
        }
        state.debounce = Some(runtime.spawn(async move {
            time::sleep(quiet).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut metadata = Map::new();
            metadata.insert("scroll_percent".into(), json!(percent));
            metadata.insert("scroll_position".into(), json!(scroll_position));
            inner.emit(EventType::Scroll, metadata);
        }));
    }

    /// Page teardown. Reports the final dwell time through the reliable path
    /// and stops all timers. Later calls are ignored.
    pub fn on_unload(&self) {
        let loaded_at = {
            let mut state = self.inner.lock_state();
            if state.unloaded {
                return;
            }
            state.unloaded = true;
            if let Some(pending) = state.debounce.take() {
                pending.abort();
            }
            state.loaded_at
        };
        self.inner.dwell_cancel.cancel();

        let event = self
            .inner
            .build_event(EventType::PageExit, dwell_metadata(loaded_at));
        self.inner.dispatcher.send_reliable(&event);
        self.inner.buffer(&event);
    }

    /// Business event named by the caller; the name becomes the event type
    /// verbatim.
    pub fn track_custom_event(&self, name: &str, metadata: Map<String, Value>) {
        let mut metadata = metadata;
        metadata.insert("custom_event".into(), json!(true));
        self.inner.emit(EventType::from(name), metadata);
        log_debug!("Custom event tracked: {name}");
    }

    pub fn track_conversion(&self, conversion_type: &str, value: Option<f64>) {
        let mut metadata = Map::new();
        metadata.insert("conversion_type".into(), json!(conversion_type));
        metadata.insert("value".into(), value.map(number_value).unwrap_or(Value::Null));
        metadata.insert("timestamp".into(), json!(Utc::now().to_rfc3339()));
        self.inner.emit(EventType::Conversion, metadata);
        log_debug!("Conversion tracked: {conversion_type}");
    }

    pub fn track_lead_capture(&self, source: &str) {
        let mut metadata = Map::new();
        metadata.insert("source".into(), json!(source));
        self.inner.emit(EventType::LeadCapture, metadata);
    }

    /// Page view reported by instrumented UI under a logical page name.
    pub fn track_named_page_view(&self, page: &str) {
        let mut metadata = Map::new();
        metadata.insert("page".into(), json!(page));
        self.inner.emit(EventType::PageView, metadata);
    }

    /// Click reported by instrumented UI that already knows what was clicked.
    pub fn track_reported_click(&self, element_id: &str, element_text: &str, location: &str) {
        let mut metadata = Map::new();
        metadata.insert("location".into(), json!(location));
        let event = self
            .inner
            .build_event(EventType::Click, metadata)
            .with_element(element_id, truncate_text(element_text), None);
        self.inner.record(event);
    }

    pub fn local_stats(&self) -> LocalStats {
        self.inner.store.read_stats()
    }

    /// Text for the development debug affordance; `None` outside debug mode.
    pub fn debug_summary(&self) -> Option<String> {
        if !self.inner.config.debug_enabled() {
            return None;
        }
        Some(self.local_stats().summary())
    }

    fn spawn_dwell_ticker(&self) {
        let Some(runtime) = self.inner.runtime() else {
            return;
        };
        let weak = Arc::downgrade(&self.inner);
        let token = self.inner.dwell_cancel.clone();
        let period = self.inner.config.dwell_interval();

        runtime.spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if !emit_time_on_page(&weak) {
                            break;
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });
    }
}

fn emit_time_on_page(weak: &Weak<TrackerInner>) -> bool {
    let Some(inner) = weak.upgrade() else {
        return false;
    };
    let loaded_at = inner.lock_state().loaded_at;
    inner.emit(EventType::TimeOnPage, dwell_metadata(loaded_at));
    true
}

impl TrackerInner {
    fn lock_state(&self) -> MutexGuard<'_, PageState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn is_unloaded(&self) -> bool {
        self.lock_state().unloaded
    }

    fn runtime(&self) -> Option<Handle> {
        match Handle::try_current() {
            Ok(handle) => Some(handle),
            Err(err) => {
                log_warn!("No async runtime available, timers disabled: {err}");
                None
            }
        }
    }

    /// Timestamps never run backwards within one page view, even if the wall
    /// clock does.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let mut last = match self.last_timestamp.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let now = Utc::now();
        let stamped = match *last {
            Some(previous) if previous > now => previous,
            _ => now,
        };
        *last = Some(stamped);
        stamped
    }

    fn build_event(&self, event_type: EventType, metadata: Map<String, Value>) -> Event {
        Event::new(
            event_type,
            self.dom.page_url(),
            self.identity.get_or_create_session_id(),
            self.next_timestamp(),
        )
        .with_metadata(metadata)
    }

    fn emit(&self, event_type: EventType, metadata: Map<String, Value>) {
        let event = self.build_event(event_type, metadata);
        self.record(event);
    }

    fn record(&self, event: Event) {
        self.dispatcher.send(&event);
        self.buffer(&event);
    }

    fn buffer(&self, event: &Event) {
        self.store.append_event(event);
        let at = event.timestamp.unwrap_or_else(Utc::now);
        self.store
            .touch_session(&event.session_id, &event.event_type, at);
    }
}

fn dwell_metadata(loaded_at: Instant) -> Map<String, Value> {
    let seconds = loaded_at.elapsed().as_secs_f64().round() as u64;
    let minutes = (seconds as f64 / 60.0).round() as u64;
    let mut metadata = Map::new();
    metadata.insert("time_seconds".into(), json!(seconds));
    metadata.insert("time_minutes".into(), json!(minutes));
    metadata
}

/// Layout measurements are reported in whole pixels.
fn pixels(value: f64) -> i64 {
    value.round() as i64
}

/// Whole numbers go out as JSON integers so `0` stays `0`, not `0.0`.
fn number_value(value: f64) -> Value {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        json!(value as i64)
    } else {
        json!(value)
    }
}
