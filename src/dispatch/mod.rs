pub mod transport;

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc,
};

use tokio::runtime::Handle;

pub use transport::{BeaconQueue, DispatchError, HttpSender, NetworkSender, UnloadSender};

use crate::models::Event;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

/// Sends event envelopes to the collector.
///
/// Both paths are at-most-once. A failed delivery logs exactly one warning
/// and bumps [`failed_deliveries`](Self::failed_deliveries); nothing reaches
/// the caller.
pub struct EventDispatcher {
    endpoint: String,
    network: Arc<dyn NetworkSender>,
    unload: Arc<dyn UnloadSender>,
    tracking: AtomicBool,
    failures: Arc<AtomicU64>,
}

impl EventDispatcher {
    pub fn new(
        endpoint: impl Into<String>,
        network: Arc<dyn NetworkSender>,
        unload: Arc<dyn UnloadSender>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            network,
            unload,
            tracking: AtomicBool::new(true),
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn enable(&self) {
        self.tracking.store(true, Ordering::SeqCst);
        log_debug!("Analytics delivery enabled");
    }

    pub fn disable(&self) {
        self.tracking.store(false, Ordering::SeqCst);
        log_debug!("Analytics delivery disabled");
    }

    pub fn is_tracking(&self) -> bool {
        self.tracking.load(Ordering::SeqCst)
    }

    pub fn failed_deliveries(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Best-effort POST on the current runtime. Returns immediately.
    pub fn send(&self, event: &Event) {
        if !self.is_tracking() {
            return;
        }

        let body = match serde_json::to_string(event) {
            Ok(body) => body,
            Err(err) => {
                self.record_failure(&DispatchError::Serialization(err), event);
                return;
            }
        };

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(err) => {
                self.record_failure(&DispatchError::Rejected(err.to_string()), event);
                return;
            }
        };

        let network = Arc::clone(&self.network);
        let failures = Arc::clone(&self.failures);
        let endpoint = self.endpoint.clone();
        let event_type = event.event_type.clone();
        runtime.spawn(async move {
            if let Err(err) = network.post_json(&endpoint, body).await {
                failures.fetch_add(1, Ordering::SeqCst);
                log_warn!("Analytics event '{event_type}' not delivered: {err}");
            }
        });
    }

    /// Hands the event to the teardown-surviving channel. Used for page exit.
    pub fn send_reliable(&self, event: &Event) {
        if !self.is_tracking() {
            return;
        }

        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(err) => {
                self.record_failure(&DispatchError::Serialization(err), event);
                return;
            }
        };

        if let Err(err) = self.unload.send_beacon(&self.endpoint, body) {
            self.record_failure(&err, event);
        }
    }

    fn record_failure(&self, err: &DispatchError, event: &Event) {
        self.failures.fetch_add(1, Ordering::SeqCst);
        log_warn!("Analytics event '{}' not delivered: {err}", event.event_type);
    }
}
