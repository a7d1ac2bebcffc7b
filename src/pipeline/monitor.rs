// src/pipeline/monitor.rs
//
// Per-frame orchestration: classify -> advance timers -> escalate -> prune.
// Frames are processed strictly in order on a single thread; only payload
// delivery leaves this thread.

use crate::escalation::{departure_report, AlertPayload, EscalationPolicy, NotificationStatus};
use crate::loiter_timer;
use crate::notifier::Notifier;
use crate::pipeline::PipelineMetrics;
use crate::track_store::TrackStateStore;
use crate::types::{Frame, TrackId};
use crate::zone::{Occupancy, ZoneLayout};
use std::sync::Arc;
use tracing::{info, warn};

/// A payload emitted for one track, in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub track_id: TrackId,
    pub frame_id: u64,
    pub timestamp_ms: f64,
    pub payload: AlertPayload,
}

#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame_id: u64,
    /// Most severe zone occupied by any track this frame
    pub occupancy: Occupancy,
    pub track_zones: Vec<(TrackId, Occupancy)>,
    pub notifications: Vec<Notification>,
}

impl FrameReport {
    pub fn status_text(&self) -> &'static str {
        self.occupancy.status_text()
    }
}

pub struct PerimeterMonitor {
    layout: ZoneLayout,
    policy: EscalationPolicy,
    store: TrackStateStore,
    notifier: Arc<dyn Notifier>,
    metrics: PipelineMetrics,
    report_on_departure: bool,
    last_timestamp_ms: f64,
    last_frame_id: u64,
}

impl PerimeterMonitor {
    pub fn new(
        layout: ZoneLayout,
        notifier: Arc<dyn Notifier>,
        metrics: PipelineMetrics,
        report_on_departure: bool,
    ) -> Self {
        let policy = EscalationPolicy::from_layout(&layout);
        Self {
            layout,
            policy,
            store: TrackStateStore::new(),
            notifier,
            metrics,
            report_on_departure,
            last_timestamp_ms: 0.0,
            last_frame_id: 0,
        }
    }

    pub fn process_frame(&mut self, frame: &Frame) -> FrameReport {
        let now_ms = frame.timestamp_ms;
        if now_ms < self.last_timestamp_ms {
            warn!(
                "Frame {} timestamp went backwards ({:.0}ms < {:.0}ms)",
                frame.frame_id, now_ms, self.last_timestamp_ms
            );
        }
        self.last_timestamp_ms = now_ms;
        self.last_frame_id = frame.frame_id;

        self.metrics.inc(&self.metrics.total_frames);
        if !frame.tracks.is_empty() {
            self.metrics.inc(&self.metrics.frames_with_tracks);
            self.metrics
                .add(&self.metrics.tracks_observed, frame.tracks.len() as u64);
        }

        let mut notifications = Vec::new();
        let mut track_zones = Vec::with_capacity(frame.tracks.len());

        for track in &frame.tracks {
            let occupancy = self.layout.occupancy(track.bbox.feet_point());
            track_zones.push((track.id, occupancy));

            let state = self.store.get_or_create(track.id);
            let reading = loiter_timer::advance(state, occupancy, now_ms);
            if let Some(payload) = self.policy.evaluate(state, reading, now_ms) {
                notifications.push(Notification {
                    track_id: track.id,
                    frame_id: frame.frame_id,
                    timestamp_ms: now_ms,
                    payload,
                });
            }
        }

        let ids = frame.track_ids();
        notifications.extend(self.prune(&ids, frame.frame_id, now_ms));

        for notification in &notifications {
            self.publish(notification);
        }

        FrameReport {
            frame_id: frame.frame_id,
            occupancy: track_zones
                .iter()
                .map(|(_, o)| *o)
                .max()
                .unwrap_or(Occupancy::Clear),
            track_zones,
            notifications,
        }
    }

    /// End of stream. Remaining tracks are only closed out when departure
    /// reports are enabled; otherwise they are dropped silently.
    pub fn finish(&mut self) -> Vec<Notification> {
        let closing = self.prune(&[], self.last_frame_id, self.last_timestamp_ms);
        for notification in &closing {
            self.publish(notification);
        }
        closing
    }

    /// Evict tracks missing from `ids`, building departure reports if enabled.
    fn prune(&mut self, ids: &[TrackId], frame_id: u64, now_ms: f64) -> Vec<Notification> {
        let evicted = self.store.prune(ids);
        if !self.report_on_departure {
            return Vec::new();
        }
        evicted
            .into_iter()
            .filter_map(|(track_id, mut state)| {
                departure_report(&mut state, now_ms).map(|payload| Notification {
                    track_id,
                    frame_id,
                    timestamp_ms: now_ms,
                    payload,
                })
            })
            .collect()
    }

    pub fn store(&self) -> &TrackStateStore {
        &self.store
    }

    fn publish(&self, notification: &Notification) {
        let payload = &notification.payload;
        match payload.status {
            NotificationStatus::Critical => {
                self.metrics.inc(&self.metrics.critical_notifications);
                warn!("🚨 Track #{}: {}", notification.track_id, payload.msg);
            }
            NotificationStatus::Alert => {
                self.metrics.inc(&self.metrics.alert_notifications);
                warn!(
                    "⚠️  Track #{}: {} (audio: {})",
                    notification.track_id,
                    payload.msg,
                    payload.play_audio.unwrap_or(0)
                );
            }
            NotificationStatus::Safe => {
                self.metrics.inc(&self.metrics.safe_notifications);
                info!(
                    "✅ Track #{}: {}",
                    notification.track_id,
                    payload.msg.replace('\n', " ")
                );
            }
        }
        self.notifier.submit(payload.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::escalation::Mode;
    use crate::notifier::RecordingNotifier;
    use crate::types::{BoundingBox, Point, TrackObservation};
    use crate::zone::{Zone, ZoneKind};
    use std::sync::atomic::Ordering;

    // Danger: x in [0, 100], alert: x in [100, 300]; both span y in [0, 100]
    fn layout() -> ZoneLayout {
        let rect = |x0: f32, x1: f32| {
            vec![
                Point::new(x0, 0.0),
                Point::new(x1, 0.0),
                Point::new(x1, 100.0),
                Point::new(x0, 100.0),
            ]
        };
        ZoneLayout::new(
            Zone::new(ZoneKind::Danger, rect(0.0, 100.0), 2.0),
            Zone::new(ZoneKind::Alert, rect(100.0, 300.0), 2.0),
        )
    }

    /// Box whose feet point lands at (x, 50).
    fn track_at(id: TrackId, x: f32) -> TrackObservation {
        TrackObservation {
            id,
            bbox: BoundingBox::new(x - 10.0, 10.0, x + 10.0, 50.0),
        }
    }

    const DANGER_X: f32 = 50.0;
    const ALERT_X: f32 = 200.0;
    const OUTSIDE_X: f32 = 500.0;

    fn frame(frame_id: u64, t_ms: f64, tracks: Vec<TrackObservation>) -> Frame {
        Frame {
            frame_id,
            timestamp_ms: t_ms,
            tracks,
        }
    }

    fn monitor(report_on_departure: bool) -> (PerimeterMonitor, Arc<RecordingNotifier>) {
        let recorder = Arc::new(RecordingNotifier::default());
        let monitor = PerimeterMonitor::new(
            layout(),
            recorder.clone(),
            PipelineMetrics::new(),
            report_on_departure,
        );
        (monitor, recorder)
    }

    /// Feed one track through (x, t_ms) waypoints, one frame each.
    fn run(monitor: &mut PerimeterMonitor, id: TrackId, path: &[(f32, f64)]) {
        for (i, &(x, t)) in path.iter().enumerate() {
            monitor.process_frame(&frame(i as u64, t, vec![track_at(id, x)]));
            for (_, state) in monitor.store().iter() {
                assert!(
                    !(state.danger_timer_start_ms.is_some()
                        && state.alert_timer_start_ms.is_some()),
                    "timers must be exclusive"
                );
            }
        }
    }

    #[test]
    fn test_loiter_episode_end_to_end() {
        let (mut monitor, recorder) = monitor(false);
        let mut path: Vec<(f32, f64)> = (0..=21).map(|i| (DANGER_X, i as f64 * 100.0)).collect();
        path.extend((21..=50).map(|i| (ALERT_X, i as f64 * 100.0)));
        path.extend((51..=60).map(|i| (ALERT_X, i as f64 * 100.0)));
        path.push((OUTSIDE_X, 6000.0));
        run(&mut monitor, 7, &path);

        let payloads = recorder.payloads();
        let statuses: Vec<_> = payloads.iter().map(|p| p.status).collect();
        assert_eq!(
            statuses,
            vec![
                NotificationStatus::Critical,
                NotificationStatus::Alert,
                NotificationStatus::Safe
            ]
        );
        assert_eq!(
            payloads[0].msg,
            "Loitering in front of house for 2.1 second(s)"
        );
        assert_eq!(payloads[1].play_audio, Some(0));
        assert_eq!(
            payloads[2].msg,
            "Target left.\nTotal duration loitering in front of house: 2.1 second(s)\nTotal duration loitering in alert zone: 3.9 second(s)"
        );
    }

    #[test]
    fn test_short_alert_visit_is_silent() {
        let (mut monitor, recorder) = monitor(false);
        let path: Vec<(f32, f64)> = (0..=10).map(|i| (ALERT_X, i as f64 * 100.0)).collect();
        run(&mut monitor, 9, &path);
        monitor.process_frame(&frame(11, 1100.0, vec![]));

        assert!(recorder.payloads().is_empty());
        assert!(monitor.store().is_empty());
    }

    #[test]
    fn test_departure_without_report_by_default() {
        let (mut monitor, recorder) = monitor(false);
        run(&mut monitor, 3, &[(DANGER_X, 0.0), (DANGER_X, 2500.0)]);
        assert_eq!(recorder.payloads().len(), 1);

        let report = monitor.process_frame(&frame(2, 2600.0, vec![]));
        assert!(report.notifications.is_empty());
        assert_eq!(recorder.payloads().len(), 1);
        assert!(monitor.store().get(3).is_none());
    }

    #[test]
    fn test_departure_report_when_enabled() {
        let (mut monitor, recorder) = monitor(true);
        run(&mut monitor, 3, &[(DANGER_X, 0.0), (DANGER_X, 2500.0)]);

        let report = monitor.process_frame(&frame(2, 3000.0, vec![]));
        assert_eq!(report.notifications.len(), 1);
        assert_eq!(report.notifications[0].track_id, 3);
        let payloads = recorder.payloads();
        assert_eq!(payloads[1].status, NotificationStatus::Safe);
        assert!(payloads[1].msg.contains("front of house: 3.0 second(s)"));
    }

    #[test]
    fn test_finish_flushes_only_when_enabled() {
        let (mut quiet, quiet_rec) = monitor(false);
        run(&mut quiet, 1, &[(ALERT_X, 0.0), (ALERT_X, 2500.0)]);
        assert!(quiet.finish().is_empty());
        assert_eq!(quiet_rec.payloads().len(), 1);
        assert!(quiet.store().is_empty());

        let (mut flushing, flushing_rec) = monitor(true);
        run(&mut flushing, 1, &[(ALERT_X, 0.0), (ALERT_X, 2500.0)]);
        let closing = flushing.finish();
        assert_eq!(closing.len(), 1);
        assert_eq!(closing[0].payload.status, NotificationStatus::Safe);
        assert!(closing[0].payload.msg.contains("alert zone: 2.5 second(s)"));
        assert_eq!(flushing_rec.payloads().len(), 2);
    }

    #[test]
    fn test_independent_tracks_and_frame_occupancy() {
        let (mut monitor, recorder) = monitor(false);
        let report = monitor.process_frame(&frame(
            0,
            0.0,
            vec![track_at(1, DANGER_X), track_at(2, ALERT_X), track_at(3, OUTSIDE_X)],
        ));
        assert_eq!(report.occupancy, Occupancy::Danger);
        assert_eq!(report.status_text(), "People in danger zone");
        assert_eq!(
            report.track_zones,
            vec![
                (1, Occupancy::Danger),
                (2, Occupancy::Alert),
                (3, Occupancy::Clear)
            ]
        );

        let report = monitor.process_frame(&frame(
            1,
            2100.0,
            vec![track_at(1, DANGER_X), track_at(2, ALERT_X)],
        ));
        let ids: Vec<TrackId> = report.notifications.iter().map(|n| n.track_id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(recorder.payloads()[1].play_audio, Some(1));
        assert_eq!(monitor.store().get(1).unwrap().mode, Mode::Critical);
        assert_eq!(monitor.store().get(2).unwrap().mode, Mode::Alert);
        assert!(monitor.store().get(3).is_none());
    }

    #[test]
    fn test_empty_frame_reports_clear() {
        let (mut monitor, _) = monitor(false);
        let report = monitor.process_frame(&frame(0, 0.0, vec![]));
        assert_eq!(report.occupancy, Occupancy::Clear);
        assert_eq!(report.status_text(), "CLEAR");
    }

    #[test]
    fn test_metrics_count_notifications() {
        let metrics = PipelineMetrics::new();
        let mut monitor = PerimeterMonitor::new(
            layout(),
            Arc::new(RecordingNotifier::default()),
            metrics.clone(),
            false,
        );
        for (i, x) in [DANGER_X, DANGER_X, OUTSIDE_X].iter().enumerate() {
            monitor.process_frame(&frame(i as u64, i as f64 * 2100.0, vec![track_at(4, *x)]));
        }
        assert_eq!(metrics.total_frames.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.critical_notifications.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.safe_notifications.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.summary().notifications(), 2);
    }
}
