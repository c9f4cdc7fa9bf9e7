//! Delivery capabilities used by the dispatcher.
//!
//! [`HttpSender`] posts on the async runtime and gives up on the first
//! failure. [`BeaconQueue`] owns a worker thread that keeps draining after
//! the tracker is gone, which is what page-exit delivery needs.

use std::{
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
    time::Duration,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header::CONTENT_TYPE, Client};
use thiserror::Error;

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

const REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("collector responded with status {0}")]
    Status(u16),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("delivery rejected: {0}")]
    Rejected(String),

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<reqwest::Error> for DispatchError {
    fn from(err: reqwest::Error) -> Self {
        DispatchError::Transport(err.to_string())
    }
}

/// Best-effort request to the collector. Implementations must not retry.
#[async_trait]
pub trait NetworkSender: Send + Sync {
    async fn post_json(&self, url: &str, body: String) -> Result<(), DispatchError>;
}

/// Hands a payload to a delivery channel that outlives the page. Must not
/// block on the network.
pub trait UnloadSender: Send + Sync {
    fn send_beacon(&self, url: &str, body: Vec<u8>) -> Result<(), DispatchError>;
}

#[derive(Clone)]
pub struct HttpSender {
    client: Client,
}

impl HttpSender {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("failed to build analytics HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl NetworkSender for HttpSender {
    async fn post_json(&self, url: &str, body: String) -> Result<(), DispatchError> {
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DispatchError::Status(response.status().as_u16()));
        }
        Ok(())
    }
}

enum BeaconCommand {
    Deliver { url: String, body: Vec<u8> },
    Shutdown,
}

struct BeaconQueueInner {
    sender: Mutex<mpsc::Sender<BeaconCommand>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for BeaconQueueInner {
    fn drop(&mut self) {
        let mut guard = match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(handle) = guard.take() {
            let sender = match self.sender.lock() {
                Ok(sender) => sender,
                Err(poisoned) => poisoned.into_inner(),
            };
            // Queued beacons ahead of the shutdown marker are still delivered.
            if let Err(err) = sender.send(BeaconCommand::Shutdown) {
                log_error!("Failed to send shutdown to beacon thread: {err}");
            }
            drop(sender);
            // Joining on a runtime thread would stall the executor for as long
            // as the queued deliveries take; the worker drains on its own.
            if tokio::runtime::Handle::try_current().is_ok() {
                log_debug!("Detaching beacon thread to drain off the runtime");
                return;
            }
            if let Err(join_err) = handle.join() {
                log_error!("Failed to join beacon thread: {join_err:?}");
            }
        }
    }
}

/// Fire-and-forget delivery queue drained by a dedicated thread. Dropping the
/// last handle flushes whatever is queued before the thread exits. Off a tokio
/// runtime the drop waits for that flush; on one it returns immediately.
#[derive(Clone)]
pub struct BeaconQueue {
    inner: Arc<BeaconQueueInner>,
}

impl BeaconQueue {
    pub fn new() -> Result<Self> {
        let (command_tx, command_rx) = mpsc::channel::<BeaconCommand>();

        let worker = thread::Builder::new()
            .name("plantas-beacon".into())
            .spawn(move || {
                let client = match reqwest::blocking::Client::builder()
                    .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
                    .build()
                {
                    Ok(client) => Some(client),
                    Err(err) => {
                        log_error!("Beacon client unavailable, beacons will be dropped: {err}");
                        None
                    }
                };

                while let Ok(command) = command_rx.recv() {
                    match command {
                        BeaconCommand::Deliver { url, body } => {
                            let Some(client) = client.as_ref() else {
                                log_warn!("Dropping beacon to {url}: no client");
                                continue;
                            };
                            deliver_beacon(client, &url, body);
                        }
                        BeaconCommand::Shutdown => break,
                    }
                }

                log_info!("Beacon thread shutting down");
            })
            .with_context(|| "failed to spawn beacon worker thread")?;

        Ok(Self {
            inner: Arc::new(BeaconQueueInner {
                sender: Mutex::new(command_tx),
                worker: Mutex::new(Some(worker)),
            }),
        })
    }
}

fn deliver_beacon(client: &reqwest::blocking::Client, url: &str, body: Vec<u8>) {
    match client
        .post(url)
        .header(CONTENT_TYPE, "application/json")
        .body(body)
        .send()
    {
        Ok(response) if response.status().is_success() => {}
        Ok(response) => log_warn!("Beacon to {url} answered {}", response.status()),
        Err(err) => log_warn!("Beacon to {url} failed: {err}"),
    }
}

impl UnloadSender for BeaconQueue {
    fn send_beacon(&self, url: &str, body: Vec<u8>) -> Result<(), DispatchError> {
        let sender = match self.inner.sender.lock() {
            Ok(sender) => sender,
            Err(poisoned) => poisoned.into_inner(),
        };
        sender
            .send(BeaconCommand::Deliver {
                url: url.to_string(),
                body,
            })
            .map_err(|_| DispatchError::Rejected("beacon thread is gone".into()))
    }
}
