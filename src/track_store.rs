// src/track_store.rs
//
// Per-track loiter state, keyed by the tracker-assigned identifier.
// Owned by the frame loop; nothing else touches the map.

use crate::escalation::Mode;
use crate::types::TrackId;
use crate::zone::Occupancy;
use std::collections::{HashMap, HashSet};
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackState {
    /// Last notification mode sent for this track
    pub mode: Mode,
    /// Set while the track is continuously inside the danger zone
    pub danger_timer_start_ms: Option<f64>,
    /// Set while the track is continuously inside the alert zone (and not danger)
    pub alert_timer_start_ms: Option<f64>,
    /// Danger dwell folded in since the last SAFE reset
    pub danger_total_ms: f64,
    /// Alert dwell folded in since the last SAFE reset
    pub alert_total_ms: f64,
    /// Zone the track occupied on its latest frame
    pub occupancy: Occupancy,
}

impl TrackState {
    pub fn is_escalated(&self) -> bool {
        self.mode != Mode::Safe
    }
}

#[derive(Debug, Default)]
pub struct TrackStateStore {
    tracks: HashMap<TrackId, TrackState>,
}

impl TrackStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the state for `id`, creating a SAFE one on first sight.
    pub fn get_or_create(&mut self, id: TrackId) -> &mut TrackState {
        self.tracks.entry(id).or_insert_with(|| {
            debug!("Track #{} first observed", id);
            TrackState::default()
        })
    }

    pub fn get(&self, id: TrackId) -> Option<&TrackState> {
        self.tracks.get(&id)
    }

    /// Drop every track not present in `current_ids`; returns the evicted
    /// states ordered by id.
    pub fn prune(&mut self, current_ids: &[TrackId]) -> Vec<(TrackId, TrackState)> {
        let keep: HashSet<TrackId> = current_ids.iter().copied().collect();
        let gone: Vec<TrackId> = self
            .tracks
            .keys()
            .filter(|id| !keep.contains(id))
            .copied()
            .collect();

        let mut evicted: Vec<(TrackId, TrackState)> = gone
            .into_iter()
            .filter_map(|id| self.tracks.remove(&id).map(|state| (id, state)))
            .collect();
        evicted.sort_by_key(|(id, _)| *id);

        for (id, state) in &evicted {
            debug!("Track #{} pruned (mode {})", id, state.mode.as_str());
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TrackId, &TrackState)> {
        self.tracks.iter()
    }
}
