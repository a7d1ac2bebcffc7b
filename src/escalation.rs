// src/escalation.rs
//
// SAFE / ALERT / CRITICAL notification state machine.
//
// Runs after the loiter timers for the frame. The track's `mode` is the last
// mode actually notified, which gives the hysteresis: an escalation fires once
// per mode change, never per frame.
//
//   occupancy  | condition                         | from      -> to       | emits
//   -----------+-----------------------------------+-----------------------+---------
//   DANGER     | elapsed > danger limit            | !CRITICAL -> CRITICAL | CRITICAL
//   ALERT      | elapsed > alert limit             | !ALERT    -> ALERT    | ALERT (audio unless from CRITICAL)
//   CLEAR      | -                                 | ALERT|CRITICAL -> SAFE| SAFE summary
//   otherwise  |                                   | unchanged             | nothing

use crate::loiter_timer::{fold, non_negative, total_with_running, TimerReading};
use crate::track_store::TrackState;
use crate::zone::{Occupancy, ZoneLayout};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Mode {
    #[default]
    Safe,
    Alert,
    Critical,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Safe => "SAFE",
            Self::Alert => "ALERT",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Wire status literals; receivers match on these exact strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationStatus {
    #[serde(rename = "ALERT Mode")]
    Alert,
    #[serde(rename = "CRITICAL Mode")]
    Critical,
    #[serde(rename = "SAFE Mode")]
    Safe,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alert => "ALERT Mode",
            Self::Critical => "CRITICAL Mode",
            Self::Safe => "SAFE Mode",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub status: NotificationStatus,
    pub msg: String,
    /// ALERT only: 1 to sound the chime, 0 when stepping down from CRITICAL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub play_audio: Option<u8>,
}

impl AlertPayload {
    pub fn critical(elapsed_ms: f64) -> Self {
        Self {
            status: NotificationStatus::Critical,
            msg: format!(
                "Loitering in front of house for {} second(s)",
                format_seconds(elapsed_ms)
            ),
            play_audio: None,
        }
    }

    pub fn alert(elapsed_ms: f64, play_audio: bool) -> Self {
        Self {
            status: NotificationStatus::Alert,
            msg: format!(
                "Loitering in alert zone for {} second(s)",
                format_seconds(elapsed_ms)
            ),
            play_audio: Some(u8::from(play_audio)),
        }
    }

    pub fn safe(danger_total_ms: f64, alert_total_ms: f64) -> Self {
        Self {
            status: NotificationStatus::Safe,
            msg: format!(
                "Target left.\nTotal duration loitering in front of house: {} second(s)\nTotal duration loitering in alert zone: {} second(s)",
                format_seconds(danger_total_ms),
                format_seconds(alert_total_ms)
            ),
            play_audio: None,
        }
    }
}

/// Milliseconds rendered as seconds with one decimal, never negative.
pub fn format_seconds(ms: f64) -> String {
    format!("{:.1}", non_negative(ms) / 1000.0)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Transition {
    Hold,
    Critical,
    Alert { play_audio: bool },
    Report,
}

#[derive(Debug, Clone, Copy)]
pub struct EscalationPolicy {
    danger_limit_ms: f64,
    alert_limit_ms: f64,
}

impl EscalationPolicy {
    pub fn new(danger_limit_secs: f64, alert_limit_secs: f64) -> Self {
        Self {
            danger_limit_ms: danger_limit_secs * 1000.0,
            alert_limit_ms: alert_limit_secs * 1000.0,
        }
    }

    pub fn from_layout(layout: &ZoneLayout) -> Self {
        Self {
            danger_limit_ms: layout.danger().loiter_limit_ms,
            alert_limit_ms: layout.alert().loiter_limit_ms,
        }
    }

    pub fn transition(&self, mode: Mode, reading: TimerReading) -> Transition {
        match (reading.occupancy, mode) {
            (Occupancy::Danger, mode)
                if reading.elapsed_ms > self.danger_limit_ms && mode != Mode::Critical =>
            {
                Transition::Critical
            }
            (Occupancy::Alert, mode)
                if reading.elapsed_ms > self.alert_limit_ms && mode != Mode::Alert =>
            {
                Transition::Alert {
                    play_audio: mode != Mode::Critical,
                }
            }
            (Occupancy::Clear, Mode::Alert | Mode::Critical) => Transition::Report,
            _ => Transition::Hold,
        }
    }

    /// Decide and apply this frame's transition; returns the payload to send.
    pub fn evaluate(
        &self,
        state: &mut TrackState,
        reading: TimerReading,
        now_ms: f64,
    ) -> Option<AlertPayload> {
        match self.transition(state.mode, reading) {
            Transition::Hold => None,
            Transition::Critical => {
                state.mode = Mode::Critical;
                Some(AlertPayload::critical(reading.elapsed_ms))
            }
            Transition::Alert { play_audio } => {
                state.mode = Mode::Alert;
                Some(AlertPayload::alert(reading.elapsed_ms, play_audio))
            }
            Transition::Report => Some(final_report(state, now_ms)),
        }
    }
}

/// SAFE summary for an escalated track, then reset to SAFE with zero totals.
///
/// Any still-running timer is included; after a CLEAR frame both timers have
/// already been folded, so this only matters for departures.
pub fn final_report(state: &mut TrackState, now_ms: f64) -> AlertPayload {
    let final_danger = total_with_running(state.danger_total_ms, state.danger_timer_start_ms, now_ms);
    let final_alert = total_with_running(state.alert_total_ms, state.alert_timer_start_ms, now_ms);

    state.mode = Mode::Safe;
    state.danger_total_ms = 0.0;
    state.alert_total_ms = 0.0;
    state.danger_timer_start_ms = None;
    state.alert_timer_start_ms = None;

    AlertPayload::safe(final_danger, final_alert)
}

/// Closing report for a track that left the frame while escalated.
pub fn departure_report(state: &mut TrackState, now_ms: f64) -> Option<AlertPayload> {
    if !state.is_escalated() {
        return None;
    }
    fold(&mut state.danger_total_ms, &mut state.danger_timer_start_ms, now_ms);
    fold(&mut state.alert_total_ms, &mut state.alert_timer_start_ms, now_ms);
    Some(final_report(state, now_ms))
}
