// src/pipeline/event_log.rs
//
// Append-only JSONL record of every notification emitted for a stream.

use crate::pipeline::Notification;
use anyhow::{Context, Result};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

pub struct EventLog {
    file: File,
    path: PathBuf,
    source: String,
    written: usize,
}

impl EventLog {
    /// Creates `<dir>/<stem>_alerts.jsonl`, truncating any previous run.
    pub fn create(dir: &Path, stem: &str, source: String) -> Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;
        let path = dir.join(format!("{}_alerts.jsonl", stem));
        let file = File::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        info!("💾 Alerts will be written to: {}", path.display());

        Ok(Self {
            file,
            path,
            source,
            written: 0,
        })
    }

    pub fn record(&mut self, notification: &Notification) -> Result<()> {
        let payload = &notification.payload;
        let mut json_value = serde_json::json!({
            "event_id": uuid::Uuid::new_v4().to_string(),
            "emitted_at": chrono::Utc::now().to_rfc3339(),
            "source": self.source,
            "frame_id": notification.frame_id,
            "timestamp_ms": notification.timestamp_ms,
            "track_id": notification.track_id,
            "status": payload.status.as_str(),
            "msg": payload.msg,
        });
        if let Some(play_audio) = payload.play_audio {
            json_value["play_audio"] = serde_json::json!(play_audio);
        }

        let json_line = serde_json::to_string(&json_value)?;
        writeln!(self.file, "{}", json_line)?;
        self.file.flush()?;
        self.written += 1;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> usize {
        self.written
    }
}
