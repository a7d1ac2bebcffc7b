// src/zone.rs
//
// Perimeter zones and point membership. A track is classified by its feet
// point; danger is checked before alert so overlapping regions resolve to the
// more severe zone.

use crate::types::{LoiterConfig, Point, ZoneConfig};
use anyhow::{bail, Result};
use serde::Serialize;

/// Edge tolerance in pixels for boundary hits.
const EDGE_EPSILON: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Alert,
    Danger,
}

impl ZoneKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alert => "alert",
            Self::Danger => "danger",
        }
    }
}

/// Where a track stands this frame. Ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize)]
pub enum Occupancy {
    #[default]
    Clear,
    Alert,
    Danger,
}

impl Occupancy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Clear => "CLEAR",
            Self::Alert => "ALERT",
            Self::Danger => "DANGER",
        }
    }

    /// Frame-level status line for the most severe occupancy.
    pub fn status_text(&self) -> &'static str {
        match self {
            Self::Clear => "CLEAR",
            Self::Alert => "People around the house",
            Self::Danger => "People in danger zone",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Zone {
    pub kind: ZoneKind,
    pub polygon: Vec<Point>,
    /// Dwell beyond this triggers escalation
    pub loiter_limit_ms: f64,
}

impl Zone {
    pub fn new(kind: ZoneKind, polygon: Vec<Point>, loiter_limit_secs: f64) -> Self {
        Self {
            kind,
            polygon,
            loiter_limit_ms: loiter_limit_secs * 1000.0,
        }
    }

    pub fn contains(&self, point: Point) -> bool {
        classify(point, &self.polygon)
    }
}

/// Non-strict point-in-polygon: points on an edge or vertex count as inside.
///
/// Crossing-number test after an explicit boundary check, so the result does
/// not depend on polygon winding.
pub fn classify(point: Point, polygon: &[Point]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let (px, py) = (point.x as f64, point.y as f64);

    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (xi, yi) = (polygon[i].x as f64, polygon[i].y as f64);
        let (xj, yj) = (polygon[j].x as f64, polygon[j].y as f64);

        if on_segment(px, py, xi, yi, xj, yj) {
            return true;
        }

        if (yi > py) != (yj > py) {
            let x_cross = xi + (py - yi) * (xj - xi) / (yj - yi);
            if px < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

fn on_segment(px: f64, py: f64, ax: f64, ay: f64, bx: f64, by: f64) -> bool {
    let cross = (bx - ax) * (py - ay) - (by - ay) * (px - ax);
    let length = ((bx - ax).powi(2) + (by - ay).powi(2)).sqrt();
    if cross.abs() > EDGE_EPSILON * length.max(1.0) {
        return false;
    }
    px >= ax.min(bx) - EDGE_EPSILON
        && px <= ax.max(bx) + EDGE_EPSILON
        && py >= ay.min(by) - EDGE_EPSILON
        && py <= ay.max(by) + EDGE_EPSILON
}

/// The two session zones, immutable once built.
#[derive(Debug, Clone)]
pub struct ZoneLayout {
    danger: Zone,
    alert: Zone,
}

impl ZoneLayout {
    pub fn new(danger: Zone, alert: Zone) -> Self {
        Self { danger, alert }
    }

    /// Scale the configured ratio polygons to the session's frame size.
    pub fn from_config(zones: &ZoneConfig, loiter: &LoiterConfig) -> Result<Self> {
        let scale = |ratios: &[[f32; 2]]| -> Vec<Point> {
            ratios
                .iter()
                .map(|&[rx, ry]| {
                    Point::new(
                        (rx * zones.frame_width as f32).round(),
                        (ry * zones.frame_height as f32).round(),
                    )
                })
                .collect()
        };

        let danger = scale(&zones.danger);
        let alert = scale(&zones.alert);
        if danger.len() < 3 || alert.len() < 3 {
            bail!("zone polygons need at least 3 vertices");
        }

        Ok(Self::new(
            Zone::new(ZoneKind::Danger, danger, loiter.danger_limit_secs),
            Zone::new(ZoneKind::Alert, alert, loiter.alert_limit_secs),
        ))
    }

    /// Danger first, then alert.
    pub fn occupancy(&self, point: Point) -> Occupancy {
        if self.danger.contains(point) {
            Occupancy::Danger
        } else if self.alert.contains(point) {
            Occupancy::Alert
        } else {
            Occupancy::Clear
        }
    }

    pub fn danger(&self) -> &Zone {
        &self.danger
    }

    pub fn alert(&self) -> &Zone {
        &self.alert
    }
}
