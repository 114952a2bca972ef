use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    Tracking,
    Arrived,
    Snoozed,
    PositionError,
    Dismissed,
    Cancelled,
}

/// One line of display telemetry, emitted per evaluation or user action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub ts_unix_ms: i64,
    pub kind: EventKind,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub accuracy_m: Option<f32>,
    pub distance_m: Option<f64>,
    pub eta_min: Option<u32>,
    pub snooze_remaining_s: u64,
    pub msg: String,
}

impl TelemetryEvent {
    pub fn note(ts_unix_ms: i64, kind: EventKind, msg: impl Into<String>) -> Self {
        Self {
            ts_unix_ms,
            kind,
            lat: None,
            lng: None,
            accuracy_m: None,
            distance_m: None,
            eta_min: None,
            snooze_remaining_s: 0,
            msg: msg.into(),
        }
    }
}
