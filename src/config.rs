use crate::types::{
    Config, DetectionConfig, InputConfig, LoggingConfig, LoiterConfig, NotifierConfig,
    ZoneConfig,
};
use anyhow::{bail, Context, Result};
use std::fs;

/// Overrides `notifier.url` when set.
pub const NOTIFY_URL_ENV: &str = "PERIMETER_NOTIFY_URL";

/// Upper bound for concurrent deliveries.
pub const MAX_IN_FLIGHT_LIMIT: usize = 1024;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Failed to read config {}", path))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path))?;
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(NOTIFY_URL_ENV) {
            if !url.trim().is_empty() {
                self.notifier.url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let loiter = &self.loiter;
        if !(loiter.danger_limit_secs.is_finite() && loiter.danger_limit_secs > 0.0) {
            bail!(
                "loiter.danger_limit_secs must be positive, got {}",
                loiter.danger_limit_secs
            );
        }
        if !(loiter.alert_limit_secs.is_finite() && loiter.alert_limit_secs > 0.0) {
            bail!(
                "loiter.alert_limit_secs must be positive, got {}",
                loiter.alert_limit_secs
            );
        }

        let notifier = &self.notifier;
        if notifier.enabled && notifier.url.trim().is_empty() {
            bail!("notifier.url is empty but notifier.enabled is true");
        }
        if notifier.timeout_secs == 0 {
            bail!("notifier.timeout_secs must be at least 1");
        }
        if notifier.max_in_flight == 0 || notifier.queue_capacity == 0 {
            bail!("notifier.max_in_flight and notifier.queue_capacity must be non-zero");
        }
        if notifier.max_in_flight > MAX_IN_FLIGHT_LIMIT {
            bail!(
                "notifier.max_in_flight must be at most {}, got {}",
                MAX_IN_FLIGHT_LIMIT,
                notifier.max_in_flight
            );
        }

        let zones = &self.zones;
        if zones.frame_width == 0 || zones.frame_height == 0 {
            bail!(
                "zones frame size must be non-zero, got {}x{}",
                zones.frame_width,
                zones.frame_height
            );
        }
        for (name, polygon) in [("alert", &zones.alert), ("danger", &zones.danger)] {
            if polygon.len() < 3 {
                bail!(
                    "zones.{} needs at least 3 vertices, got {}",
                    name,
                    polygon.len()
                );
            }
            if polygon.iter().flatten().any(|v| !v.is_finite()) {
                bail!("zones.{} has a non-finite vertex", name);
            }
        }

        if !(0.0..=1.0).contains(&self.detection.confidence_threshold) {
            bail!(
                "detection.confidence_threshold must be within [0, 1], got {}",
                self.detection.confidence_threshold
            );
        }
        Ok(())
    }
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:1880/motion".to_string(),
            enabled: true,
            timeout_secs: 5,
            max_in_flight: 8,
            queue_capacity: 64,
        }
    }
}

impl Default for LoiterConfig {
    fn default() -> Self {
        Self {
            danger_limit_secs: 2.0,
            alert_limit_secs: 2.0,
            report_on_departure: false,
        }
    }
}

impl Default for ZoneConfig {
    /// Top/bottom split for a door camera: the danger zone hugs the bottom-left
    /// of the frame, the alert band sits directly above it.
    fn default() -> Self {
        Self {
            frame_width: 1280,
            frame_height: 720,
            alert: vec![[0.0, 0.42], [0.68, 0.70], [0.70, 0.38], [0.0, 0.30]],
            danger: vec![[0.0, 1.0], [0.65, 1.0], [0.68, 0.70], [0.0, 0.42]],
        }
    }
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
        }
    }
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: "tracks".to_string(),
            extension: "jsonl".to_string(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}
