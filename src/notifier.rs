// src/notifier.rs
//
// Best-effort delivery of alert payloads. The frame loop only ever calls
// `submit`, which never blocks and never fails; everything that can go wrong
// happens inside detached delivery tasks and ends in a log line.
//
// Pipeline:
//   submit() --try_send--> bounded queue --> dispatcher --spawn--> delivery task (POST, timeout)
//                                                   \-- semaphore caps deliveries in flight

use crate::escalation::AlertPayload;
use crate::pipeline::PipelineMetrics;
use crate::types::NotifierConfig;
use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub trait Notifier: Send + Sync {
    /// Hand a payload off for delivery. Submission order is preserved;
    /// completion order is not.
    fn submit(&self, payload: AlertPayload);
}

// ============================================================================
// HTTP
// ============================================================================

pub struct HttpNotifier {
    sender: Mutex<Option<mpsc::Sender<AlertPayload>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    url: String,
    queue_capacity: usize,
    drain_timeout: Duration,
    metrics: PipelineMetrics,
}

impl HttpNotifier {
    /// Spawns the dispatcher, so this must run inside a tokio runtime.
    pub fn new(config: &NotifierConfig, metrics: PipelineMetrics) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let dispatcher = tokio::spawn(dispatch(
            receiver,
            client,
            config.url.clone(),
            config.max_in_flight,
            metrics.clone(),
        ));

        Ok(Self {
            sender: Mutex::new(Some(sender)),
            dispatcher: Mutex::new(Some(dispatcher)),
            url: config.url.clone(),
            queue_capacity: config.queue_capacity,
            drain_timeout: timeout + Duration::from_secs(1),
            metrics,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Stop accepting payloads and give in-flight deliveries a bounded
    /// amount of time to finish.
    pub async fn close(&self) {
        let sender = match self.sender.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(sender);

        let dispatcher = match self.dispatcher.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        let Some(dispatcher) = dispatcher else {
            return;
        };

        match tokio::time::timeout(self.drain_timeout, dispatcher).await {
            Ok(Ok(())) => debug!("Notifier drained"),
            Ok(Err(e)) => error!("Notifier dispatcher failed: {}", e),
            Err(_) => warn!(
                "Deliveries still pending after {:.1}s, abandoning them",
                self.drain_timeout.as_secs_f64()
            ),
        }
    }
}

impl Notifier for HttpNotifier {
    fn submit(&self, payload: AlertPayload) {
        let guard = match self.sender.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(sender) = guard.as_ref() else {
            warn!("Notifier closed, dropping {}", payload.status.as_str());
            self.metrics.inc(&self.metrics.deliveries_dropped);
            return;
        };

        match sender.try_send(payload) {
            Ok(()) => {}
            Err(TrySendError::Full(payload)) => {
                warn!(
                    "Notification queue full ({} pending), dropping {}",
                    self.queue_capacity,
                    payload.status.as_str()
                );
                self.metrics.inc(&self.metrics.deliveries_dropped);
            }
            Err(TrySendError::Closed(payload)) => {
                error!(
                    "Notification dispatcher gone, dropping {}",
                    payload.status.as_str()
                );
                self.metrics.inc(&self.metrics.deliveries_dropped);
            }
        }
    }
}

async fn dispatch(
    mut receiver: mpsc::Receiver<AlertPayload>,
    client: reqwest::Client,
    url: String,
    max_in_flight: usize,
    metrics: PipelineMetrics,
) {
    let limiter = Arc::new(Semaphore::new(max_in_flight));
    let url: Arc<str> = Arc::from(url);

    while let Some(payload) = receiver.recv().await {
        let permit = match limiter.clone().acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let client = client.clone();
        let url = Arc::clone(&url);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            deliver(&client, &url, &payload, &metrics).await;
            drop(permit);
        });
    }

    // Queue closed: wait until every delivery has returned its slot
    let slots = u32::try_from(max_in_flight).unwrap_or(u32::MAX);
    let _ = limiter.acquire_many(slots).await;
}

async fn deliver(
    client: &reqwest::Client,
    url: &str,
    payload: &AlertPayload,
    metrics: &PipelineMetrics,
) {
    match client.post(url).json(payload).send().await {
        Ok(response) if response.status().is_success() => {
            metrics.inc(&metrics.deliveries_succeeded);
            info!(">> SENT: {}", payload.status.as_str());
        }
        Ok(response) => {
            let status = response.status();
            error!(
                "Notification endpoint returned {} for {}: {}",
                status,
                payload.status.as_str(),
                response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<no body>".to_string()),
            );
            metrics.inc(&metrics.deliveries_failed);
        }
        Err(e) => {
            error!(
                "Delivery of {} to {} failed: {}",
                payload.status.as_str(),
                url,
                e
            );
            metrics.inc(&metrics.deliveries_failed);
        }
    }
}

// ============================================================================
// DRY RUN
// ============================================================================

/// Logs payloads instead of sending them.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn submit(&self, payload: AlertPayload) {
        info!(
            "(dry run) {}: {}{}",
            payload.status.as_str(),
            payload.msg.replace('\n', " | "),
            payload
                .play_audio
                .map(|a| format!(" [play_audio={}]", a))
                .unwrap_or_default()
        );
    }
}

/// Keeps every submitted payload in order.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    payloads: Mutex<Vec<AlertPayload>>,
}

#[cfg(test)]
impl RecordingNotifier {
    pub fn payloads(&self) -> Vec<AlertPayload> {
        self.payloads.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl Notifier for RecordingNotifier {
    fn submit(&self, payload: AlertPayload) {
        self.payloads.lock().unwrap().push(payload);
    }
}
