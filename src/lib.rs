pub mod config;
pub mod dispatch;
pub mod models;
pub mod session;
pub mod store;
pub mod tracker;
pub mod utils;

use std::{path::Path, sync::Arc};

use anyhow::Result;

pub use config::{ConfigStore, TrackerConfig};
pub use dispatch::{BeaconQueue, EventDispatcher, HttpSender, NetworkSender, UnloadSender};
pub use models::{Event, EventType, SessionRecord};
pub use session::SessionIdentity;
pub use store::{KeyValueStore, LocalEventStore, LocalStats, MemoryStore, SqliteStore};
pub use tracker::{
    ClickSignal, DomObserver, ElementInfo, EngagementTracker, Rect, ScrollMetrics, Size,
    TrackingHook,
};
pub use utils::init_logging;

/// Builds the page's tracker with the production transports.
///
/// `buffer_path` selects the persistent event buffer (memory when `None` or
/// when the file cannot be used). `tab_scope` is the storage that lives as
/// long as the browsing context and keeps the session id across reloads.
/// The tracker is not started; call [`EngagementTracker::start`] on load.
pub fn bootstrap(
    config: TrackerConfig,
    dom: Arc<dyn DomObserver>,
    buffer_path: Option<&Path>,
    tab_scope: Box<dyn KeyValueStore>,
) -> Result<EngagementTracker> {
    let network = Arc::new(HttpSender::new()?);
    let beacons = Arc::new(BeaconQueue::new()?);
    let dispatcher = EventDispatcher::new(config.endpoint_url(), network, beacons);

    let store = match buffer_path {
        Some(path) => LocalEventStore::open(path, &config),
        None => LocalEventStore::in_memory(&config),
    };

    log::info!("Analytics collector at {}", dispatcher.endpoint());

    Ok(EngagementTracker::new(
        config,
        dom,
        SessionIdentity::new(tab_scope),
        dispatcher,
        store,
    ))
}
