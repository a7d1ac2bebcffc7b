// src/pipeline/metrics.rs
//
// Counters shared between the frame loop and the delivery tasks.
// Logged as a summary at the end of every stream.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PipelineMetrics {
    pub total_frames: Arc<AtomicU64>,
    pub frames_with_tracks: Arc<AtomicU64>,
    pub malformed_frames: Arc<AtomicU64>,
    pub tracks_observed: Arc<AtomicU64>,
    pub critical_notifications: Arc<AtomicU64>,
    pub alert_notifications: Arc<AtomicU64>,
    pub safe_notifications: Arc<AtomicU64>,
    pub deliveries_succeeded: Arc<AtomicU64>,
    pub deliveries_failed: Arc<AtomicU64>,
    pub deliveries_dropped: Arc<AtomicU64>,
    pub started_at: Instant,
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            total_frames: Arc::new(AtomicU64::new(0)),
            frames_with_tracks: Arc::new(AtomicU64::new(0)),
            malformed_frames: Arc::new(AtomicU64::new(0)),
            tracks_observed: Arc::new(AtomicU64::new(0)),
            critical_notifications: Arc::new(AtomicU64::new(0)),
            alert_notifications: Arc::new(AtomicU64::new(0)),
            safe_notifications: Arc::new(AtomicU64::new(0)),
            deliveries_succeeded: Arc::new(AtomicU64::new(0)),
            deliveries_failed: Arc::new(AtomicU64::new(0)),
            deliveries_dropped: Arc::new(AtomicU64::new(0)),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, counter: &AtomicU64, n: u64) {
        counter.fetch_add(n, Ordering::Relaxed);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.total_frames.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            total_frames: self.total_frames.load(Ordering::Relaxed),
            frames_with_tracks: self.frames_with_tracks.load(Ordering::Relaxed),
            malformed_frames: self.malformed_frames.load(Ordering::Relaxed),
            tracks_observed: self.tracks_observed.load(Ordering::Relaxed),
            fps: self.fps(),
            critical_notifications: self.critical_notifications.load(Ordering::Relaxed),
            alert_notifications: self.alert_notifications.load(Ordering::Relaxed),
            safe_notifications: self.safe_notifications.load(Ordering::Relaxed),
            deliveries_succeeded: self.deliveries_succeeded.load(Ordering::Relaxed),
            deliveries_failed: self.deliveries_failed.load(Ordering::Relaxed),
            deliveries_dropped: self.deliveries_dropped.load(Ordering::Relaxed),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSummary {
    pub total_frames: u64,
    pub frames_with_tracks: u64,
    pub malformed_frames: u64,
    pub tracks_observed: u64,
    pub fps: f64,
    pub critical_notifications: u64,
    pub alert_notifications: u64,
    pub safe_notifications: u64,
    pub deliveries_succeeded: u64,
    pub deliveries_failed: u64,
    pub deliveries_dropped: u64,
    pub elapsed_secs: f64,
}

impl MetricsSummary {
    pub fn notifications(&self) -> u64 {
        self.critical_notifications + self.alert_notifications + self.safe_notifications
    }
}
