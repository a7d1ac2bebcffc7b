use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub notifier: NotifierConfig,
    pub loiter: LoiterConfig,
    pub zones: ZoneConfig,
    pub detection: DetectionConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Endpoint receiving the JSON payloads via POST
    pub url: String,
    /// When false, payloads are only logged (dry run)
    pub enabled: bool,
    /// Upper bound for a single delivery, connect + response
    pub timeout_secs: u64,
    /// Deliveries allowed to be in flight at once
    pub max_in_flight: usize,
    /// Payloads waiting for a delivery slot before new ones are dropped
    pub queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoiterConfig {
    pub danger_limit_secs: f64,
    pub alert_limit_secs: f64,
    /// Send the closing SAFE report for tracks that vanish while escalated
    pub report_on_departure: bool,
}

/// Zone polygons as ratios of the frame size, scaled to pixels per session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneConfig {
    pub frame_width: u32,
    pub frame_height: u32,
    pub alert: Vec<[f32; 2]>,
    pub danger: Vec<[f32; 2]>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    pub confidence_threshold: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub dir: String,
    pub extension: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub events_dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

// ============================================================================
// GEOMETRY + TRACK INPUT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box `[x1, y1, x2, y2]` in frame pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox(pub [f32; 4]);

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self([x1, y1, x2, y2])
    }

    /// Horizontal midpoint of the bottom edge, where the subject stands.
    pub fn feet_point(&self) -> Point {
        let [x1, _, x2, y2] = self.0;
        Point::new((x1 + x2) * 0.5, y2)
    }

    pub fn is_finite(&self) -> bool {
        self.0.iter().all(|v| v.is_finite())
    }
}

pub type TrackId = i64;

/// One tracked subject as reported by the tracking collaborator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackObservation {
    pub id: TrackId,
    pub bbox: BoundingBox,
}

/// All tracks observed in a single frame, stamped with the stream clock.
#[derive(Debug, Clone)]
pub struct Frame {
    pub frame_id: u64,
    pub timestamp_ms: f64,
    pub tracks: Vec<TrackObservation>,
}

impl Frame {
    pub fn empty(frame_id: u64, timestamp_ms: f64) -> Self {
        Self {
            frame_id,
            timestamp_ms,
            tracks: Vec::new(),
        }
    }

    pub fn track_ids(&self) -> Vec<TrackId> {
        self.tracks.iter().map(|t| t.id).collect()
    }
}
