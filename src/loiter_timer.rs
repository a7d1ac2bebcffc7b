// src/loiter_timer.rs
//
// Dual per-zone dwell timers. The active timer for the occupied zone keeps
// running; leaving a zone folds its elapsed time into that zone's total, so a
// subject bouncing between zones keeps its cumulative dwell.

use crate::track_store::TrackState;
use crate::zone::Occupancy;
use tracing::debug;

/// Dwell of the current uninterrupted stay, after this frame's update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimerReading {
    pub occupancy: Occupancy,
    /// Time since the occupied zone's timer started; 0 when clear
    pub elapsed_ms: f64,
}

/// Apply one frame's zone membership to the track's timers.
pub fn advance(state: &mut TrackState, occupancy: Occupancy, now_ms: f64) -> TimerReading {
    if state.occupancy != occupancy {
        debug!(
            "Zone transition {} -> {} at {:.0}ms",
            state.occupancy.as_str(),
            occupancy.as_str(),
            now_ms
        );
    }
    state.occupancy = occupancy;

    let elapsed_ms = match occupancy {
        Occupancy::Danger => {
            let start = *state.danger_timer_start_ms.get_or_insert(now_ms);
            fold(&mut state.alert_total_ms, &mut state.alert_timer_start_ms, now_ms);
            non_negative(now_ms - start)
        }
        Occupancy::Alert => {
            let start = *state.alert_timer_start_ms.get_or_insert(now_ms);
            fold(&mut state.danger_total_ms, &mut state.danger_timer_start_ms, now_ms);
            non_negative(now_ms - start)
        }
        Occupancy::Clear => {
            fold(&mut state.danger_total_ms, &mut state.danger_timer_start_ms, now_ms);
            fold(&mut state.alert_total_ms, &mut state.alert_timer_start_ms, now_ms);
            0.0
        }
    };

    TimerReading {
        occupancy,
        elapsed_ms,
    }
}

/// Stop a running timer, adding its elapsed time to `total`.
pub fn fold(total: &mut f64, start: &mut Option<f64>, now_ms: f64) {
    if let Some(started) = start.take() {
        *total += non_negative(now_ms - started);
    }
}

/// Total dwell including a still-running timer, without mutating the state.
pub fn total_with_running(total_ms: f64, start: Option<f64>, now_ms: f64) -> f64 {
    let running = start.map(|s| now_ms - s).unwrap_or(0.0);
    non_negative(total_ms + running)
}

/// Clamp stale or reordered timestamps to zero; NaN becomes zero too.
pub fn non_negative(ms: f64) -> f64 {
    if ms > 0.0 {
        ms
    } else {
        0.0
    }
}
