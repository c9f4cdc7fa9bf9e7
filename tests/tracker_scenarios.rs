use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use plantas_analytics::{
    dispatch::DispatchError,
    store::StoreKind,
    ClickSignal, DomObserver, ElementInfo, EngagementTracker, Event, EventDispatcher, EventType,
    LocalEventStore, MemoryStore, NetworkSender, Rect, ScrollMetrics, SessionIdentity, Size,
    TrackerConfig, TrackingHook, UnloadSender,
};
use serde_json::{json, Map, Value};

struct FakePage {
    scroll: Mutex<ScrollMetrics>,
}

impl FakePage {
    fn new() -> Self {
        Self {
            scroll: Mutex::new(ScrollMetrics {
                scroll_y: 0.0,
                document_height: 3000.0,
                viewport_height: 1000.0,
            }),
        }
    }

    /// Scrolls so that `percent` of the scrollable range is covered.
    fn scroll_to(&self, percent: f64) {
        let mut scroll = self.scroll.lock().unwrap();
        let range = scroll.document_height - scroll.viewport_height;
        scroll.scroll_y = range * percent / 100.0;
    }

    fn set_heights(&self, document_height: f64, viewport_height: f64) {
        let mut scroll = self.scroll.lock().unwrap();
        scroll.document_height = document_height;
        scroll.viewport_height = viewport_height;
    }
}

impl DomObserver for FakePage {
    fn page_url(&self) -> String {
        "https://plantas.example/plantas-medicinales/manzanilla/".into()
    }
    fn document_title(&self) -> String {
        "Manzanilla: usos y beneficios".into()
    }
    fn referrer(&self) -> String {
        "https://search.example/".into()
    }
    fn screen_size(&self) -> Size {
        Size::new(1920, 1080)
    }
    fn viewport_size(&self) -> Size {
        Size::new(1280, 1000)
    }
    fn user_agent(&self) -> String {
        "Mozilla/5.0 (X11; Linux x86_64)".into()
    }
    fn scroll_metrics(&self) -> ScrollMetrics {
        *self.scroll.lock().unwrap()
    }
}

#[derive(Default)]
struct RecordingNetwork {
    bodies: Mutex<Vec<Value>>,
}

impl RecordingNetwork {
    fn event_types(&self) -> Vec<String> {
        self.bodies
            .lock()
            .unwrap()
            .iter()
            .map(|body| body["event_type"].as_str().unwrap_or_default().to_string())
            .collect()
    }
}

#[async_trait]
impl NetworkSender for RecordingNetwork {
    async fn post_json(&self, _url: &str, body: String) -> Result<(), DispatchError> {
        self.bodies
            .lock()
            .unwrap()
            .push(serde_json::from_str(&body).unwrap());
        Ok(())
    }
}

#[derive(Default)]
struct RecordingBeacon {
    bodies: Mutex<Vec<Value>>,
}

impl UnloadSender for RecordingBeacon {
    fn send_beacon(&self, _url: &str, body: Vec<u8>) -> Result<(), DispatchError> {
        self.bodies
            .lock()
            .unwrap()
            .push(serde_json::from_slice(&body).unwrap());
        Ok(())
    }
}

struct Harness {
    tracker: EngagementTracker,
    page: Arc<FakePage>,
    network: Arc<RecordingNetwork>,
    beacon: Arc<RecordingBeacon>,
}

impl Harness {
    fn new() -> Self {
        Self::with_config(TrackerConfig::default().with_origin("https://plantas.example"))
    }

    fn with_config(config: TrackerConfig) -> Self {
        let page = Arc::new(FakePage::new());
        let network = Arc::new(RecordingNetwork::default());
        let beacon = Arc::new(RecordingBeacon::default());
        let dispatcher =
            EventDispatcher::new(config.endpoint_url(), network.clone(), beacon.clone());
        let store = LocalEventStore::in_memory(&config);
        let tracker = EngagementTracker::new(
            config,
            page.clone(),
            SessionIdentity::new(Box::new(MemoryStore::new())),
            dispatcher,
            store,
        );
        Self {
            tracker,
            page,
            network,
            beacon,
        }
    }

    fn buffered(&self) -> Vec<Event> {
        self.tracker.store().events()
    }

    fn buffered_of(&self, event_type: EventType) -> Vec<Event> {
        self.buffered()
            .into_iter()
            .filter(|event| event.event_type == event_type)
            .collect()
    }
}

/// Lets spawned delivery tasks run.
async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
}

fn meta(event: &Event, key: &str) -> Value {
    event.metadata_value(key).cloned().unwrap_or(Value::Null)
}

#[tokio::test(start_paused = true)]
async fn scroll_to_half_then_leave_after_45_seconds() {
    let h = Harness::new();
    h.tracker.start();

    h.page.scroll_to(50.0);
    h.tracker.on_scroll();
    tokio::time::sleep(Duration::from_secs(2)).await;
    tokio::time::sleep(Duration::from_secs(43)).await;
    h.tracker.on_unload();
    settle().await;

    let events = h.buffered();
    let types: Vec<EventType> = events.iter().map(|e| e.event_type.clone()).collect();
    assert_eq!(
        types,
        vec![
            EventType::PageView,
            EventType::ScrollMilestone,
            EventType::ScrollMilestone,
            EventType::Scroll,
            EventType::TimeOnPage,
            EventType::PageExit,
        ]
    );
    assert_eq!(meta(&events[1], "scroll_percent"), json!(25));
    assert_eq!(meta(&events[2], "scroll_percent"), json!(50));
    assert_eq!(meta(&events[3], "scroll_percent"), json!(50));
    assert_eq!(meta(&events[1], "scroll_position"), json!(1000));
    assert_eq!(meta(&events[1], "page_height"), json!(3000));
    assert_eq!(meta(&events[3], "scroll_position"), json!(1000));
    assert_eq!(meta(&events[4], "time_seconds"), json!(30));
    assert_eq!(meta(&events[4], "time_minutes"), json!(1));
    assert_eq!(meta(&events[5], "time_seconds"), json!(45));

    // The exit goes through the reliable path only.
    let beacons = h.beacon.bodies.lock().unwrap();
    assert_eq!(beacons.len(), 1);
    assert_eq!(beacons[0]["event_type"], "page_exit");
    assert_eq!(beacons[0]["metadata"]["time_seconds"], 45);
    let sent = h.network.event_types();
    assert_eq!(sent.len(), 5);
    assert!(!sent.contains(&"page_exit".to_string()));
}

#[tokio::test(start_paused = true)]
async fn page_view_carries_page_facts() {
    let h = Harness::new();
    h.tracker.start();
    h.tracker.start();
    settle().await;

    let views = h.buffered_of(EventType::PageView);
    assert_eq!(views.len(), 1);
    let view = &views[0];
    assert_eq!(view.page_url, "https://plantas.example/plantas-medicinales/manzanilla/");
    assert_eq!(meta(view, "title"), json!("Manzanilla: usos y beneficios"));
    assert_eq!(meta(view, "screen_size"), json!("1920x1080"));
    assert_eq!(meta(view, "viewport"), json!("1280x1000"));
    assert_eq!(meta(view, "referrer"), json!("https://search.example/"));
    assert!(view.timestamp.is_some());
}

#[tokio::test(start_paused = true)]
async fn click_outside_allow_list_emits_nothing() {
    let h = Harness::new();
    h.tracker.on_click(&ClickSignal::new(vec![
        ElementInfo::new("P").with_text("La manzanilla es una planta..."),
        ElementInfo::new("ARTICLE").with_class("plant-body"),
        ElementInfo::new("BODY"),
    ]));
    settle().await;

    assert!(h.buffered().is_empty());
    assert!(h.network.event_types().is_empty());
}

#[tokio::test(start_paused = true)]
async fn click_on_nested_cta_reports_nearest_match_once() {
    let h = Harness::new();
    let signal = ClickSignal::new(vec![
        ElementInfo::new("SPAN").with_text("ignored"),
        ElementInfo::new("A")
            .with_class("btn cta")
            .with_href("https://shop.example/guia")
            .with_text("   Descargar guía gratuita   ")
            .with_rect(Rect::new(100.4, 200.6, 240.0, 48.0)),
        ElementInfo::new("DIV").with_class("checkout"),
    ])
    .at(180.0, 220.0);

    h.tracker.on_click(&signal);
    settle().await;

    let clicks = h.buffered_of(EventType::Click);
    assert_eq!(clicks.len(), 1);
    let click = &clicks[0];
    assert_eq!(click.element_id.as_deref(), Some("btn cta"));
    assert_eq!(click.element_text.as_deref(), Some("Descargar guía gratuita"));
    assert_eq!(click.element_href.as_deref(), Some("https://shop.example/guia"));
    assert_eq!(meta(click, "tag_name"), json!("A"));
    assert_eq!(meta(click, "visible"), json!(true));
    assert_eq!(meta(click, "click_x"), json!(180.0));
    assert_eq!(
        click.metadata["position"],
        json!({"x": 100, "y": 201, "width": 240, "height": 48})
    );

    assert_eq!(h.network.event_types(), vec!["click".to_string()]);
    assert_eq!(h.tracker.store().session().unwrap().clicks, 1);
}

#[tokio::test(start_paused = true)]
async fn burst_of_scrolls_collapses_to_last_value() {
    let h = Harness::new();
    for percent in [5.0, 12.0, 18.0, 22.0, 24.0] {
        h.page.scroll_to(percent);
        h.tracker.on_scroll();
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    tokio::time::sleep(Duration::from_millis(1500)).await;

    let scrolls = h.buffered_of(EventType::Scroll);
    assert_eq!(scrolls.len(), 1);
    assert_eq!(meta(&scrolls[0], "scroll_percent"), json!(24));
    assert!(h.buffered_of(EventType::ScrollMilestone).is_empty());
}

#[tokio::test(start_paused = true)]
async fn coarse_jump_emits_every_milestone_once() {
    let h = Harness::new();
    h.page.scroll_to(10.0);
    h.tracker.on_scroll();
    h.page.scroll_to(95.0);
    h.tracker.on_scroll();
    h.page.scroll_to(100.0);
    h.tracker.on_scroll();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let milestones: Vec<Value> = h
        .buffered_of(EventType::ScrollMilestone)
        .iter()
        .map(|e| meta(e, "scroll_percent"))
        .collect();
    assert_eq!(milestones, vec![json!(25), json!(50), json!(75), json!(90)]);
    assert_eq!(h.buffered_of(EventType::Scroll).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn page_shorter_than_viewport_is_not_scroll_tracked() {
    let h = Harness::new();
    h.page.set_heights(600.0, 1000.0);
    h.tracker.on_scroll();
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(h.buffered().is_empty());
}

#[tokio::test(start_paused = true)]
async fn conversion_keeps_zero_value() {
    let h = Harness::new();
    h.tracker.track_conversion("guide_download", Some(0.0));
    h.tracker.track_conversion("affiliate_click", None);
    settle().await;

    let conversions = h.buffered_of(EventType::Conversion);
    assert_eq!(conversions.len(), 2);
    assert_eq!(meta(&conversions[0], "conversion_type"), json!("guide_download"));
    assert_eq!(meta(&conversions[0], "value"), json!(0));
    assert_eq!(meta(&conversions[1], "value"), Value::Null);

    let bodies = h.network.bodies.lock().unwrap();
    assert_eq!(bodies[0]["metadata"]["value"], json!(0));
}

#[tokio::test(start_paused = true)]
async fn custom_event_name_is_used_verbatim() {
    let h = Harness::new();
    let mut metadata = Map::new();
    metadata.insert("plant".into(), json!("jengibre"));
    h.tracker.track_custom_event("recipe_print", metadata);
    settle().await;

    let events = h.buffered();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type.as_str(), "recipe_print");
    assert_eq!(meta(&events[0], "plant"), json!("jengibre"));
    assert_eq!(meta(&events[0], "custom_event"), json!(true));
    assert_eq!(h.network.event_types(), vec!["recipe_print".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn every_event_shares_one_session_id() {
    let h = Harness::new();
    h.tracker.start();
    h.page.scroll_to(80.0);
    h.tracker.on_scroll();
    h.tracker.track_conversion("guide_download", Some(0.0));
    tokio::time::sleep(Duration::from_secs(31)).await;
    h.tracker.on_unload();

    let expected = h.tracker.session_id();
    let events = h.buffered();
    assert!(events.len() >= 6);
    assert!(events.iter().all(|e| e.session_id == expected));
    assert!(events
        .windows(2)
        .all(|w| w[0].timestamp <= w[1].timestamp));

    let record = h.tracker.store().session().unwrap();
    assert_eq!(record.session_id, expected);
    assert_eq!(record.page_views, 1);
}

#[tokio::test(start_paused = true)]
async fn unload_stops_timers_and_later_signals() {
    let h = Harness::new();
    h.tracker.start();
    h.page.scroll_to(30.0);
    h.tracker.on_scroll();
    h.tracker.on_unload();
    h.tracker.on_unload();

    h.page.scroll_to(90.0);
    h.tracker.on_scroll();
    h.tracker
        .on_click(&ClickSignal::new(vec![ElementInfo::new("BUTTON")]));
    tokio::time::sleep(Duration::from_secs(120)).await;

    assert_eq!(h.buffered_of(EventType::PageExit).len(), 1);
    assert!(h.buffered_of(EventType::TimeOnPage).is_empty());
    assert!(h.buffered_of(EventType::Scroll).is_empty());
    assert!(h.buffered_of(EventType::Click).is_empty());
    assert_eq!(h.beacon.bodies.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dwell_ticker_reports_every_interval() {
    let h = Harness::new();
    h.tracker.start();
    tokio::time::sleep(Duration::from_secs(95)).await;

    let seconds: Vec<Value> = h
        .buffered_of(EventType::TimeOnPage)
        .iter()
        .map(|e| meta(e, "time_seconds"))
        .collect();
    assert_eq!(seconds, vec![json!(30), json!(60), json!(90)]);
}

#[tokio::test(start_paused = true)]
async fn disabled_tracking_still_buffers_locally() {
    let h = Harness::new();
    h.tracker.disable_tracking();
    h.tracker.track_conversion("guide_download", Some(0.0));
    h.tracker.on_unload();
    settle().await;

    assert!(h.network.event_types().is_empty());
    assert!(h.beacon.bodies.lock().unwrap().is_empty());
    assert_eq!(h.buffered().len(), 2);

    h.tracker.enable_tracking();
    h.tracker.track_lead_capture("guia-gratuita");
    settle().await;
    assert_eq!(h.network.event_types(), vec!["lead_capture".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn hook_reports_collaborator_calls() {
    let h = Harness::new();
    let hook = TrackingHook::from(&h.tracker);

    hook.track_page_view("home");
    hook.track_click("hero-cta", "Ver Enciclopedia Completa", "hero");
    hook.track_conversion("affiliate_checkout", Some(27.5));
    hook.track_custom_event("faq_open", Map::new());
    settle().await;

    let events = h.buffered();
    assert_eq!(events.len(), 4);
    assert_eq!(meta(&events[0], "page"), json!("home"));
    assert_eq!(events[1].element_id.as_deref(), Some("hero-cta"));
    assert_eq!(events[1].element_text.as_deref(), Some("Ver Enciclopedia Completa"));
    assert_eq!(meta(&events[1], "location"), json!("hero"));
    assert_eq!(meta(&events[2], "value"), json!(27.5));
    assert_eq!(events[3].event_type, EventType::Custom("faq_open".into()));

    let stats = h.tracker.local_stats();
    assert_eq!(stats.page_views, 1);
    assert_eq!(stats.clicks, 1);
    assert_eq!(stats.total_events, 4);
}

#[tokio::test(start_paused = true)]
async fn debug_summary_only_for_local_origins() {
    let remote = Harness::new();
    remote.tracker.start();
    assert!(remote.tracker.debug_summary().is_none());

    let local = Harness::with_config(TrackerConfig::default().with_origin("http://localhost:3000"));
    local.tracker.start();
    assert_eq!(
        local.tracker.debug_summary().as_deref(),
        Some("Events: 1\nClicks: 0\nVisits: 1")
    );
}

#[tokio::test(start_paused = true)]
async fn buffer_capacity_applies_to_tracked_events() {
    let config = TrackerConfig {
        buffer_capacity: 5,
        ..TrackerConfig::default().with_origin("https://plantas.example")
    };
    let h = Harness::with_config(config);
    for n in 0..8 {
        let mut metadata = Map::new();
        metadata.insert("n".into(), json!(n));
        h.tracker.track_custom_event("tick", metadata);
    }

    let ns: Vec<Value> = h.buffered().iter().map(|e| meta(e, "n")).collect();
    assert_eq!(ns, vec![json!(3), json!(4), json!(5), json!(6), json!(7)]);
    assert_eq!(h.tracker.store().kind(), StoreKind::InMemory);
}
