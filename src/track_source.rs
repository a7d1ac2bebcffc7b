// src/track_source.rs
//
// Reads per-frame tracker output recorded as JSON lines:
//
//   {"frame_id": 12, "timestamp_ms": 400.0,
//    "tracks": [{"id": 7, "bbox": [x1, y1, x2, y2], "confidence": 0.91}]}
//
// Stands in for the detection/tracking stage, so it applies that stage's
// confidence threshold. A line that cannot be used becomes an empty frame.

use crate::types::{BoundingBox, Frame, TrackObservation};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Deserialize)]
struct FrameRecord {
    frame_id: Option<u64>,
    timestamp_ms: Option<f64>,
    #[serde(default)]
    tracks: Vec<TrackRecord>,
}

#[derive(Debug, Deserialize)]
struct TrackRecord {
    /// Absent until the tracker has assigned an identity
    id: Option<i64>,
    bbox: Option<[f32; 4]>,
    confidence: Option<f32>,
}

/// Stream files under `root`, or `root` itself when it is a file.
pub fn find_track_files(root: &str, extension: &str) -> Result<Vec<PathBuf>> {
    let root_path = Path::new(root);
    if root_path.is_file() {
        return Ok(vec![root_path.to_path_buf()]);
    }
    if !root_path.is_dir() {
        anyhow::bail!("Track input {} does not exist", root);
    }

    let mut files: Vec<PathBuf> = WalkDir::new(root_path)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case(extension))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();

    info!("Found {} track stream file(s)", files.len());
    Ok(files)
}

pub struct TrackStreamReader<R: BufRead> {
    reader: R,
    line: Vec<u8>,
    confidence_threshold: f32,
    line_no: u64,
    next_frame_id: u64,
    last_timestamp_ms: f64,
    malformed_frames: u64,
    low_confidence_tracks: u64,
}

impl TrackStreamReader<BufReader<File>> {
    pub fn open(path: &Path, confidence_threshold: f32) -> Result<Self> {
        let file =
            File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
        Ok(Self::new(BufReader::new(file), confidence_threshold))
    }
}

impl<R: BufRead> TrackStreamReader<R> {
    pub fn new(reader: R, confidence_threshold: f32) -> Self {
        Self {
            reader,
            line: Vec::new(),
            confidence_threshold,
            line_no: 0,
            next_frame_id: 0,
            last_timestamp_ms: 0.0,
            malformed_frames: 0,
            low_confidence_tracks: 0,
        }
    }

    /// Next frame, `Ok(None)` at end of stream. Only I/O errors are errors.
    pub fn read_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            self.line.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.line)
                .with_context(|| format!("Failed to read line {}", self.line_no + 1))?;
            if read == 0 {
                return Ok(None);
            }
            self.line_no += 1;

            if self.line.iter().all(|b| b.is_ascii_whitespace()) {
                continue;
            }
            let line = std::mem::take(&mut self.line);
            let frame = self.parse_line(&line);
            self.line = line;
            return Ok(Some(frame));
        }
    }

    /// Bytes rather than `str`: invalid UTF-8 is just another unreadable frame.
    fn parse_line(&mut self, line: &[u8]) -> Frame {
        let record: FrameRecord = match serde_json::from_slice(line) {
            Ok(record) => record,
            Err(e) => {
                warn!("Line {}: unreadable frame ({}), treating as empty", self.line_no, e);
                self.malformed_frames += 1;
                let frame = Frame::empty(self.next_frame_id, self.last_timestamp_ms);
                self.next_frame_id = self.next_frame_id.wrapping_add(1);
                return frame;
            }
        };

        let frame_id = record.frame_id.unwrap_or(self.next_frame_id);
        self.next_frame_id = frame_id.wrapping_add(1);
        let timestamp_ms = match record.timestamp_ms {
            Some(ts) if ts.is_finite() => ts,
            _ => {
                debug!("Frame {} has no usable timestamp, reusing previous", frame_id);
                self.last_timestamp_ms
            }
        };
        self.last_timestamp_ms = timestamp_ms;

        match self.convert_tracks(record.tracks) {
            Some(tracks) => Frame {
                frame_id,
                timestamp_ms,
                tracks,
            },
            None => {
                warn!("Frame {}: incomplete track data, treating as empty", frame_id);
                self.malformed_frames += 1;
                Frame::empty(frame_id, timestamp_ms)
            }
        }
    }

    /// `None` when any track lacks an identity or a usable box.
    fn convert_tracks(&mut self, records: Vec<TrackRecord>) -> Option<Vec<TrackObservation>> {
        let mut tracks = Vec::with_capacity(records.len());
        for record in records {
            let id = record.id?;
            let bbox = BoundingBox(record.bbox?);
            if !bbox.is_finite() {
                return None;
            }
            if let Some(confidence) = record.confidence {
                if confidence < self.confidence_threshold {
                    self.low_confidence_tracks += 1;
                    continue;
                }
            }
            tracks.push(TrackObservation { id, bbox });
        }
        Some(tracks)
    }

    pub fn malformed_frames(&self) -> u64 {
        self.malformed_frames
    }

    pub fn low_confidence_tracks(&self) -> u64 {
        self.low_confidence_tracks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn reader(input: &str) -> TrackStreamReader<Cursor<Vec<u8>>> {
        TrackStreamReader::new(Cursor::new(input.as_bytes().to_vec()), 0.5)
    }

    #[test]
    fn test_reads_frames_in_order() {
        let mut r = reader(concat!(
            "{\"frame_id\": 0, \"timestamp_ms\": 0.0, \"tracks\": [{\"id\": 7, \"bbox\": [10, 20, 30, 80]}]}\n",
            "\n",
            "{\"frame_id\": 1, \"timestamp_ms\": 33.3, \"tracks\": []}\n",
        ));

        let first = r.read_frame().unwrap().unwrap();
        assert_eq!(first.frame_id, 0);
        assert_eq!(first.tracks.len(), 1);
        assert_eq!(first.tracks[0].id, 7);
        assert_eq!(first.tracks[0].bbox.feet_point().x, 20.0);
        assert_eq!(first.tracks[0].bbox.feet_point().y, 80.0);

        let second = r.read_frame().unwrap().unwrap();
        assert_eq!(second.frame_id, 1);
        assert!(second.tracks.is_empty());
        assert!((second.timestamp_ms - 33.3).abs() < 1e-9);

        assert!(r.read_frame().unwrap().is_none());
        assert_eq!(r.malformed_frames(), 0);
    }

    #[test]
    fn test_garbage_line_becomes_empty_frame() {
        let mut r = reader(concat!(
            "{\"frame_id\": 4, \"timestamp_ms\": 400.0, \"tracks\": []}\n",
            "not json\n",
        ));
        r.read_frame().unwrap();
        let frame = r.read_frame().unwrap().unwrap();
        assert!(frame.tracks.is_empty());
        assert_eq!(frame.frame_id, 5);
        assert_eq!(frame.timestamp_ms, 400.0);
        assert_eq!(r.malformed_frames(), 1);
    }

    #[test]
    fn test_invalid_utf8_line_becomes_empty_frame() {
        let mut input = b"{\"frame_id\": 0, \"timestamp_ms\": 0.0, \"tracks\": [{\"id\": 1, \"bbox\": [0, 0, 1, 1]}]}\n".to_vec();
        input.extend_from_slice(b"\xff\xfe garbage\n");
        input.extend_from_slice(b"{\"frame_id\": 2, \"timestamp_ms\": 66.0, \"tracks\": [{\"id\": 1, \"bbox\": [0, 0, 1, 1]}]}\n");
        let mut r = TrackStreamReader::new(Cursor::new(input), 0.5);

        assert_eq!(r.read_frame().unwrap().unwrap().tracks.len(), 1);
        let garbled = r.read_frame().unwrap().unwrap();
        assert!(garbled.tracks.is_empty());
        assert_eq!(garbled.frame_id, 1);
        let next = r.read_frame().unwrap().unwrap();
        assert_eq!(next.frame_id, 2);
        assert_eq!(next.track_ids(), vec![1]);
        assert!(r.read_frame().unwrap().is_none());
        assert_eq!(r.malformed_frames(), 1);
    }

    #[test]
    fn test_max_frame_id_does_not_overflow() {
        let mut r = reader(concat!(
            "{\"frame_id\": 18446744073709551615, \"timestamp_ms\": 0.0, \"tracks\": []}\n",
            "{\"timestamp_ms\": 33.0, \"tracks\": []}\n",
        ));
        assert_eq!(r.read_frame().unwrap().unwrap().frame_id, u64::MAX);
        assert_eq!(r.read_frame().unwrap().unwrap().frame_id, 0);
    }

    #[test]
    fn test_track_without_id_empties_frame() {
        let mut r = reader(
            "{\"frame_id\": 0, \"timestamp_ms\": 0.0, \"tracks\": [{\"id\": 1, \"bbox\": [0, 0, 1, 1]}, {\"bbox\": [0, 0, 1, 1]}]}\n",
        );
        let frame = r.read_frame().unwrap().unwrap();
        assert!(frame.tracks.is_empty());
        assert_eq!(r.malformed_frames(), 1);
    }

    #[test]
    fn test_low_confidence_tracks_are_dropped() {
        let mut r = reader(
            "{\"timestamp_ms\": 0.0, \"tracks\": [{\"id\": 1, \"bbox\": [0, 0, 1, 1], \"confidence\": 0.3}, {\"id\": 2, \"bbox\": [0, 0, 1, 1], \"confidence\": 0.9}]}\n",
        );
        let frame = r.read_frame().unwrap().unwrap();
        assert_eq!(frame.track_ids(), vec![2]);
        assert_eq!(r.low_confidence_tracks(), 1);
    }

    #[test]
    fn test_missing_timestamp_reuses_previous() {
        let mut r = reader(concat!(
            "{\"timestamp_ms\": 120.0, \"tracks\": []}\n",
            "{\"tracks\": []}\n",
        ));
        r.read_frame().unwrap();
        let frame = r.read_frame().unwrap().unwrap();
        assert_eq!(frame.timestamp_ms, 120.0);
        assert_eq!(frame.frame_id, 1);
    }

    #[test]
    fn test_find_track_files_filters_extension() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.jsonl"), "").unwrap();
        std::fs::write(dir.path().join("a.JSONL"), "").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "").unwrap();

        let files = find_track_files(dir.path().to_str().unwrap(), "jsonl").unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.JSONL", "b.jsonl"]);

        let single = dir.path().join("notes.txt");
        let files = find_track_files(single.to_str().unwrap(), "jsonl").unwrap();
        assert_eq!(files, vec![single]);

        assert!(find_track_files("/nonexistent/tracks", "jsonl").is_err());
    }
}
