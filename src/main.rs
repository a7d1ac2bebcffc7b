// src/main.rs

mod config;
mod escalation;
mod loiter_timer;
mod notifier;
mod pipeline;
mod track_source;
mod track_store;
mod types;
mod zone;

use anyhow::{Context, Result};
use clap::Parser;
use notifier::{HttpNotifier, LogNotifier, Notifier};
use pipeline::{EventLog, PerimeterMonitor, PipelineMetrics};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use track_source::TrackStreamReader;
use types::{Config, LoggingConfig};
use zone::{Occupancy, ZoneLayout};

/// Perimeter loiter monitor: replays tracker output against the door-camera
/// zones and posts escalation notifications.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// YAML configuration file; built-in defaults are used when it is absent
    #[arg(short, long, default_value = "config.yaml")]
    config: String,

    /// Track stream file or directory (overrides `input.dir`)
    #[arg(short, long)]
    input: Option<String>,

    /// Log notifications instead of posting them
    #[arg(long)]
    dry_run: bool,
}

struct StreamStats {
    total_frames: u64,
    frames_in_danger: u64,
    frames_in_alert: u64,
    malformed_frames: u64,
    low_confidence_tracks: u64,
    notifications: usize,
    events_logged: usize,
    duration_secs: f64,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let (config_found, loaded) = read_config(&args.config);

    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| LoggingConfig::default().level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("perimeter_watch={}", level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("🏠 Perimeter Watch Starting");
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return Err(e);
        }
    };
    if !config_found {
        warn!("Config {} not found, using defaults", args.config);
    }
    config.apply_env_overrides();
    if let Some(input) = args.input {
        config.input.dir = input;
    }
    if args.dry_run {
        config.notifier.enabled = false;
    }
    config.validate()?;
    info!("✓ Configuration loaded");
    info!(
        "Loiter limits: danger={:.1}s, alert={:.1}s | departure reports: {}",
        config.loiter.danger_limit_secs,
        config.loiter.alert_limit_secs,
        if config.loiter.report_on_departure { "on" } else { "off" }
    );

    let metrics = PipelineMetrics::new();
    let http_notifier = if config.notifier.enabled {
        let notifier = Arc::new(HttpNotifier::new(&config.notifier, metrics.clone())?);
        info!("📡 Notification URL: {}", notifier.url());
        Some(notifier)
    } else {
        info!("⚪ Notifier disabled, notifications will only be logged");
        None
    };
    let notifier: Arc<dyn Notifier> = match &http_notifier {
        Some(notifier) => notifier.clone() as Arc<dyn Notifier>,
        None => Arc::new(LogNotifier),
    };

    let track_files = track_source::find_track_files(&config.input.dir, &config.input.extension)?;
    if track_files.is_empty() {
        error!("No track streams found in {}", config.input.dir);
    }

    let config = Arc::new(config);
    for (idx, path) in track_files.iter().enumerate() {
        info!("\n========================================");
        info!(
            "Processing stream {}/{}: {}",
            idx + 1,
            track_files.len(),
            path.display()
        );
        info!("========================================\n");

        let stream_config = Arc::clone(&config);
        let stream_notifier = Arc::clone(&notifier);
        let stream_metrics = metrics.clone();
        let stream_path = path.clone();

        // Frames are processed synchronously; keep them off the runtime
        // workers so delivery tasks keep running.
        let outcome = tokio::task::spawn_blocking(move || {
            run_stream(&stream_path, &stream_config, stream_notifier, stream_metrics)
        })
        .await
        .context("Stream worker panicked")?;

        match outcome {
            Ok(stats) => {
                info!("\n✓ Stream processed successfully!");
                info!("  Total frames: {}", stats.total_frames);
                info!(
                    "  Frames with people in danger zone: {} ({:.1}%)",
                    stats.frames_in_danger,
                    100.0 * stats.frames_in_danger as f64 / stats.total_frames.max(1) as f64
                );
                info!(
                    "  Frames with people around the house: {} ({:.1}%)",
                    stats.frames_in_alert,
                    100.0 * stats.frames_in_alert as f64 / stats.total_frames.max(1) as f64
                );
                info!("  Notifications: {}", stats.notifications);
                if stats.events_logged > 0 {
                    info!("  💾 Events logged: {}", stats.events_logged);
                }
                if stats.malformed_frames > 0 {
                    warn!("  Malformed frames: {}", stats.malformed_frames);
                }
                if stats.low_confidence_tracks > 0 {
                    info!(
                        "  Low-confidence tracks ignored: {}",
                        stats.low_confidence_tracks
                    );
                }
                info!(
                    "  Processing Speed: {:.1} FPS",
                    stats.total_frames as f64 / stats.duration_secs.max(1e-6)
                );
                if let Ok(json) = serde_json::to_string(&metrics.summary()) {
                    debug!("Metrics so far: {}", json);
                }
            }
            Err(e) => {
                error!("Failed to process stream {}: {:#}", path.display(), e);
            }
        }
    }

    if let Some(notifier) = http_notifier {
        notifier.close().await;
    }

    let summary = metrics.summary();
    info!("\n📊 Final Report:");
    info!("  Frames: {} ({} with tracks)", summary.total_frames, summary.frames_with_tracks);
    info!("  Tracks observed: {}", summary.tracks_observed);
    info!(
        "  🚨 Critical: {} | ⚠️  Alert: {} | ✅ Safe: {}",
        summary.critical_notifications, summary.alert_notifications, summary.safe_notifications
    );
    if config.notifier.enabled {
        info!(
            "  Deliveries: {} sent, {} failed, {} dropped",
            summary.deliveries_succeeded, summary.deliveries_failed, summary.deliveries_dropped
        );
    }
    info!(
        "  Total notifications: {} in {:.1}s",
        summary.notifications(),
        summary.elapsed_secs
    );

    Ok(())
}

fn run_stream(
    path: &Path,
    config: &Config,
    notifier: Arc<dyn Notifier>,
    metrics: PipelineMetrics,
) -> Result<StreamStats> {
    let start_time = std::time::Instant::now();

    let layout = ZoneLayout::from_config(&config.zones, &config.loiter)?;
    for zone in [layout.danger(), layout.alert()] {
        info!(
            "Zone {}: {} vertices in {}x{} frame, limit {:.1}s",
            zone.kind.as_str(),
            zone.polygon.len(),
            config.zones.frame_width,
            config.zones.frame_height,
            zone.loiter_limit_ms / 1000.0
        );
    }

    let mut reader = TrackStreamReader::open(path, config.detection.confidence_threshold)?;
    let mut event_log = match &config.output.events_dir {
        Some(dir) => Some(EventLog::create(
            Path::new(dir),
            &stream_stem(path),
            path.to_string_lossy().to_string(),
        )?),
        None => None,
    };

    let mut monitor = PerimeterMonitor::new(
        layout,
        notifier,
        metrics.clone(),
        config.loiter.report_on_departure,
    );

    let mut stats = StreamStats {
        total_frames: 0,
        frames_in_danger: 0,
        frames_in_alert: 0,
        malformed_frames: 0,
        low_confidence_tracks: 0,
        notifications: 0,
        events_logged: 0,
        duration_secs: 0.0,
    };
    let mut last_occupancy = Occupancy::Clear;

    while let Some(frame) = reader.read_frame()? {
        stats.total_frames += 1;
        let report = monitor.process_frame(&frame);

        match report.occupancy {
            Occupancy::Danger => stats.frames_in_danger += 1,
            Occupancy::Alert => stats.frames_in_alert += 1,
            Occupancy::Clear => {}
        }
        if report.occupancy != last_occupancy {
            info!(
                "Frame {} ({:.2}s): {}",
                report.frame_id,
                frame.timestamp_ms / 1000.0,
                report.status_text()
            );
            last_occupancy = report.occupancy;
        }

        stats.notifications += report.notifications.len();
        if let Some(log) = event_log.as_mut() {
            for notification in &report.notifications {
                log.record(notification)?;
            }
        }

        if stats.total_frames % 300 == 0 {
            info!(
                "Progress: frame {} | Tracks: {} | Status: {}",
                report.frame_id,
                monitor.store().len(),
                report.status_text()
            );
        }
    }

    let closing = monitor.finish();
    stats.notifications += closing.len();
    if let Some(log) = event_log.as_mut() {
        for notification in &closing {
            log.record(notification)?;
        }
        stats.events_logged = log.written();
        info!("💾 {} event(s) written to {}", log.written(), log.path().display());
    }

    stats.malformed_frames = reader.malformed_frames();
    stats.low_confidence_tracks = reader.low_confidence_tracks();
    metrics.add(&metrics.malformed_frames, stats.malformed_frames);
    stats.duration_secs = start_time.elapsed().as_secs_f64();

    Ok(stats)
}

/// Load the config file, or defaults when it does not exist. The existence
/// flag is returned so the fallback can be logged once tracing is up.
fn read_config(path: &str) -> (bool, Result<Config>) {
    if Path::new(path).exists() {
        (true, Config::load(path))
    } else {
        (false, Ok(Config::default()))
    }
}

fn stream_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("stream")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_config_missing_file_uses_defaults() {
        let (found, loaded) = read_config("/nonexistent/perimeter.yaml");
        assert!(!found);
        assert_eq!(loaded.unwrap().loiter.danger_limit_secs, 2.0);
    }

    #[test]
    fn test_read_config_reports_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "loiter: [not, a, mapping").unwrap();

        let (found, loaded) = read_config(file.path().to_str().unwrap());
        assert!(found);
        let err = format!("{:#}", loaded.unwrap_err());
        assert!(err.contains("Failed to parse config"), "unexpected error: {}", err);
    }

    #[test]
    fn test_stream_stem() {
        assert_eq!(stream_stem(Path::new("tracks/porch.jsonl")), "porch");
    }
}
