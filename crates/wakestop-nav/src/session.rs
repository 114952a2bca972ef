use thiserror::Error;
use time::OffsetDateTime;
use tracing::{info, warn};
use wakestop_proto::{AlarmSettings, Destination};

use crate::detector::{evaluate, ArmState, DetectorInput, Evaluation};
use crate::eta::DEFAULT_AVG_SPEED_KMH;
use crate::gnss::{Fix, PositionError};
use crate::snooze::SnoozeController;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Idle,
    Searching,
    Tracking,
    Alarm,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("cannot {action} while {mode:?}")]
    InvalidTransition { action: &'static str, mode: Mode },
}

/// Result of feeding one fix into the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Outcome {
    /// `None` when the sample was not evaluated (no active trip, bad coordinates).
    pub evaluation: Option<Evaluation>,
    /// The arrival event fired on this sample.
    pub fired: bool,
}

impl Outcome {
    const SKIPPED: Outcome = Outcome { evaluation: None, fired: false };
}

#[derive(Debug, Clone, PartialEq)]
pub struct SessionStatus {
    pub mode: Mode,
    pub arm: ArmState,
    pub destination: Option<Destination>,
    pub last: Option<Evaluation>,
    /// Sticks until a valid fix arrives.
    pub last_error: Option<PositionError>,
    pub has_fix: bool,
    pub snooze_remaining_s: u64,
}

/// One trip from destination pick to dismissal.
pub struct TripSession {
    avg_speed_kmh: f64,
    mode: Mode,
    destination: Option<Destination>,
    settings: AlarmSettings,
    arm: ArmState,
    snooze: SnoozeController,
    last: Option<Evaluation>,
    last_error: Option<PositionError>,
    fired_at: Option<OffsetDateTime>,
}

impl Default for TripSession {
    fn default() -> Self {
        Self::new(DEFAULT_AVG_SPEED_KMH)
    }
}

impl TripSession {
    pub fn new(avg_speed_kmh: f64) -> Self {
        Self {
            avg_speed_kmh,
            mode: Mode::Idle,
            destination: None,
            settings: AlarmSettings::default(),
            arm: ArmState::NotArmed,
            snooze: SnoozeController::new(),
            last: None,
            last_error: None,
            fired_at: None,
        }
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn arm(&self) -> ArmState {
        self.arm
    }

    pub fn settings(&self) -> &AlarmSettings {
        &self.settings
    }

    pub fn destination(&self) -> Option<&Destination> {
        self.destination.as_ref()
    }

    pub fn last_error(&self) -> Option<PositionError> {
        self.last_error
    }

    pub fn fired_at(&self) -> Option<OffsetDateTime> {
        self.fired_at
    }

    pub fn begin_search(&mut self) -> Result<(), SessionError> {
        match self.mode {
            Mode::Idle | Mode::Searching => {
                self.mode = Mode::Searching;
                Ok(())
            }
            mode => Err(SessionError::InvalidTransition { action: "search", mode }),
        }
    }

    /// Arms a new trip. The destination is fixed for the life of the trip.
    pub fn start(&mut self, destination: Destination, settings: AlarmSettings) -> Result<(), SessionError> {
        if !matches!(self.mode, Mode::Idle | Mode::Searching) {
            return Err(SessionError::InvalidTransition { action: "start", mode: self.mode });
        }
        self.reset();
        info!(
            "session: tracking {:?} ({:.5}, {:.5}) alert={:?} threshold={}",
            destination.name, destination.at.lat, destination.at.lng, settings.alert_type, settings.threshold
        );
        self.destination = Some(destination);
        self.settings = settings;
        self.arm = ArmState::Armed;
        self.mode = Mode::Tracking;
        Ok(())
    }

    pub fn on_fix(&mut self, fix: &Fix, now: OffsetDateTime) -> Outcome {
        if !matches!(self.mode, Mode::Tracking | Mode::Alarm) {
            return Outcome::SKIPPED;
        }
        let Some(dest) = self.destination.as_ref() else {
            return Outcome::SKIPPED;
        };

        let input = DetectorInput {
            position: fix.at,
            destination: dest.at,
            settings: &self.settings,
            avg_speed_kmh: self.avg_speed_kmh,
            now,
            snooze_until: self.snooze.until(),
            arm: self.arm,
        };
        let ev = match evaluate(&input) {
            Ok(ev) => ev,
            Err(e) => {
                warn!("session: sample ignored: {}", e);
                return Outcome::SKIPPED;
            }
        };

        self.last = Some(ev);
        self.last_error = None;

        let fired = ev.should_fire;
        if fired {
            self.arm = ArmState::Fired;
            self.mode = Mode::Alarm;
            self.fired_at = Some(now);
            self.snooze.clear();
            info!("session: arrival at {:.0}m, eta {}min", ev.distance_m, ev.eta_min);
        }
        Outcome { evaluation: Some(ev), fired }
    }

    pub fn on_position_error(&mut self, err: PositionError) {
        if matches!(self.mode, Mode::Tracking | Mode::Alarm) {
            warn!("session: position error: {}", err);
            self.last_error = Some(err);
        }
    }

    /// Suppresses the trigger for `duration_s`. Only meaningful before arrival.
    pub fn snooze(&mut self, now: OffsetDateTime, duration_s: u64) -> Result<OffsetDateTime, SessionError> {
        if self.mode != Mode::Tracking {
            return Err(SessionError::InvalidTransition { action: "snooze", mode: self.mode });
        }
        let until = self.snooze.snooze(now, duration_s);
        info!("session: snoozed for {}s", duration_s);
        Ok(until)
    }

    pub fn is_snoozed(&self, now: OffsetDateTime) -> bool {
        self.snooze.is_snoozed(now)
    }

    pub fn snooze_remaining(&self, now: OffsetDateTime) -> std::time::Duration {
        self.snooze.remaining(now)
    }

    /// Acknowledges a fired alarm and ends the trip.
    pub fn dismiss(&mut self) -> Result<(), SessionError> {
        if self.mode != Mode::Alarm {
            return Err(SessionError::InvalidTransition { action: "dismiss", mode: self.mode });
        }
        info!("session: alarm dismissed");
        self.reset();
        Ok(())
    }

    /// Abandons the trip from any mode.
    pub fn cancel(&mut self) {
        if self.mode != Mode::Idle {
            info!("session: cancelled in {:?}", self.mode);
        }
        self.reset();
    }

    pub fn status(&self, now: OffsetDateTime) -> SessionStatus {
        SessionStatus {
            mode: self.mode,
            arm: self.arm,
            destination: self.destination.clone(),
            last: self.last,
            last_error: self.last_error,
            has_fix: self.last.is_some(),
            snooze_remaining_s: self.snooze.remaining_seconds(now),
        }
    }

    fn reset(&mut self) {
        self.mode = Mode::Idle;
        self.destination = None;
        self.arm = ArmState::NotArmed;
        self.snooze.clear();
        self.last = None;
        self.last_error = None;
        self.fired_at = None;
    }
}
