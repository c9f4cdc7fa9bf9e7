//! Per-tab correlation identity.

use std::sync::Mutex;

use chrono::Utc;
use rand::{distributions::Uniform, Rng};

use crate::store::KeyValueStore;

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

pub const SESSION_ID_KEY: &str = "analytics_session_id";

const RANDOM_SUFFIX_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Hands out one session id per browsing context.
///
/// The id is kept in a tab-scoped store so it survives reloads within the
/// tab. When that store fails the id lives only in this process.
pub struct SessionIdentity {
    scope: Mutex<Option<Box<dyn KeyValueStore>>>,
    cached: Mutex<Option<String>>,
}

impl SessionIdentity {
    pub fn new(scope: Box<dyn KeyValueStore>) -> Self {
        Self {
            scope: Mutex::new(Some(scope)),
            cached: Mutex::new(None),
        }
    }

    /// No tab-scoped storage at all: ids do not survive a reload.
    pub fn transient() -> Self {
        Self {
            scope: Mutex::new(None),
            cached: Mutex::new(None),
        }
    }

    pub fn get_or_create_session_id(&self) -> String {
        let mut cached = match self.cached.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(id) = cached.as_ref() {
            return id.clone();
        }

        let mut scope = match self.scope.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let stored = match scope.as_ref().map(|store| store.get_raw(SESSION_ID_KEY)) {
            Some(Ok(value)) => value.filter(|id| !id.is_empty()),
            Some(Err(err)) => {
                log_warn!("Session storage unreadable ({err}); keeping session id in memory");
                *scope = None;
                None
            }
            None => None,
        };

        let id = match stored {
            Some(id) => id,
            None => {
                let id = generate_session_id();
                if let Some(store) = scope.as_mut() {
                    if let Err(err) = store.set_raw(SESSION_ID_KEY, &id) {
                        log_warn!(
                            "Session storage unavailable ({err}); session id will not survive a reload"
                        );
                        *scope = None;
                    }
                }
                log_info!("Analytics session started: {id}");
                id
            }
        };

        *cached = Some(id.clone());
        id
    }
}

/// `session_<unix millis>_<9 base-36 chars>`. Unique enough for one site's
/// traffic; not suitable where unpredictability matters.
pub fn generate_session_id() -> String {
    let mut rng = rand::thread_rng();
    let alphabet = Uniform::from(0..BASE36.len());
    let suffix: String = (0..RANDOM_SUFFIX_LEN)
        .map(|_| BASE36[rng.sample(alphabet)] as char)
        .collect();
    format!("session_{}_{}", Utc::now().timestamp_millis(), suffix)
}
