//! Arrival decision for a single position sample.
//!
//! [`evaluate`] is a pure function over a snapshot of session state. The
//! session keeps the [`ArmState`] and advances it to `Fired` when the
//! evaluation says so, which is what makes the arrival event at-most-once.

use time::OffsetDateTime;
use wakestop_proto::{AlarmSettings, AlertType, Coordinate};

use crate::eta::eta_minutes;
use crate::geo::{distance_m, GeoError};

/// Per-session firing state. `Fired` is terminal until a new session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArmState {
    #[default]
    NotArmed,
    Armed,
    Fired,
}

#[derive(Debug, Clone)]
pub struct DetectorInput<'a> {
    pub position: Coordinate,
    pub destination: Coordinate,
    pub settings: &'a AlarmSettings,
    pub avg_speed_kmh: f64,
    pub now: OffsetDateTime,
    pub snooze_until: Option<OffsetDateTime>,
    pub arm: ArmState,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Evaluation {
    pub distance_m: f64,
    pub eta_min: u32,
    /// Threshold satisfied, regardless of snooze or arm state.
    pub condition_met: bool,
    pub snoozed: bool,
    pub should_fire: bool,
}

/// Whether the configured threshold is satisfied. Non-positive thresholds never are.
pub fn condition_met(settings: &AlarmSettings, distance_m: f64, eta_min: u32) -> bool {
    let t = settings.threshold;
    if !(t > 0.0) {
        return false;
    }
    match settings.alert_type {
        AlertType::Distance => distance_m <= t,
        AlertType::Time => f64::from(eta_min) <= t,
    }
}

pub fn evaluate(input: &DetectorInput<'_>) -> Result<Evaluation, GeoError> {
    let distance_m = distance_m(input.position, input.destination)?;
    let eta_min = eta_minutes(distance_m, input.avg_speed_kmh);

    let snoozed = matches!(input.snooze_until, Some(until) if input.now < until);
    let condition_met = condition_met(input.settings, distance_m, eta_min);
    let should_fire = !snoozed && condition_met && input.arm == ArmState::Armed;

    Ok(Evaluation { distance_m, eta_min, condition_met, snoozed, should_fire })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    const DEST: Coordinate = Coordinate { lat: 0.0, lng: 0.0 };

    /// Point due north of the origin at roughly `m` meters.
    fn north(m: f64) -> Coordinate {
        Coordinate::new((m / crate::geo::EARTH_RADIUS_M).to_degrees(), 0.0)
    }

    fn input<'a>(settings: &'a AlarmSettings, position: Coordinate) -> DetectorInput<'a> {
        DetectorInput {
            position,
            destination: DEST,
            settings,
            avg_speed_kmh: 22.0,
            now: datetime!(2024-05-01 08:00 UTC),
            snooze_until: None,
            arm: ArmState::Armed,
        }
    }

    fn distance(threshold: f64) -> AlarmSettings {
        AlarmSettings { threshold, ..AlarmSettings::default() }
    }

    #[test]
    fn distance_boundary_is_inclusive() {
        let s = distance(500.0);
        let out = evaluate(&input(&s, north(501.0))).unwrap();
        assert!(!out.should_fire);
        assert!((out.distance_m - 501.0).abs() < 1e-6);

        // 500 m north lands a few ulps either side of 500, so check the rule directly
        assert!(condition_met(&s, 500.0, 2));
        assert!(!condition_met(&s, 500.000_001, 2));

        let out = evaluate(&input(&s, north(499.0))).unwrap();
        assert!(out.should_fire);
    }

    #[test]
    fn fired_session_does_not_refire() {
        let s = distance(500.0);
        let mut inp = input(&s, north(499.0));
        assert!(evaluate(&inp).unwrap().should_fire);

        inp.arm = ArmState::Fired;
        inp.position = north(100.0);
        let out = evaluate(&inp).unwrap();
        assert!(out.condition_met);
        assert!(!out.should_fire);
    }

    #[test]
    fn unarmed_never_fires() {
        let s = distance(500.0);
        let mut inp = input(&s, DEST);
        inp.arm = ArmState::NotArmed;
        assert!(!evaluate(&inp).unwrap().should_fire);
    }

    #[test]
    fn exact_zero_distance_fires() {
        let s = distance(100.0);
        let out = evaluate(&input(&s, DEST)).unwrap();
        assert_eq!(out.distance_m, 0.0);
        assert_eq!(out.eta_min, 0);
        assert!(out.should_fire);
    }

    #[test]
    fn snooze_masks_then_releases() {
        let s = distance(500.0);
        let mut inp = input(&s, north(200.0));
        let now = inp.now;
        inp.snooze_until = Some(now + Duration::seconds(60));
        let out = evaluate(&inp).unwrap();
        assert!(out.snoozed);
        assert!(out.condition_met);
        assert!(!out.should_fire);

        inp.now = now + Duration::seconds(61);
        let out = evaluate(&inp).unwrap();
        assert!(!out.snoozed);
        assert!(out.should_fire);
    }

    #[test]
    fn snooze_ends_exactly_at_deadline() {
        let s = distance(500.0);
        let mut inp = input(&s, north(200.0));
        inp.snooze_until = Some(inp.now);
        assert!(evaluate(&inp).unwrap().should_fire);
    }

    #[test]
    fn non_positive_threshold_never_fires() {
        for t in [0.0, -1.0, -500.0, f64::NAN] {
            let s = distance(t);
            assert!(!evaluate(&input(&s, DEST)).unwrap().should_fire, "threshold {t}");
            let s = AlarmSettings { alert_type: AlertType::Time, ..distance(t) };
            assert!(!evaluate(&input(&s, DEST)).unwrap().should_fire, "threshold {t}");
        }
    }

    #[test]
    fn time_mode_uses_eta() {
        let s = AlarmSettings { alert_type: AlertType::Time, threshold: 3.0, ..AlarmSettings::default() };
        // ~1.5 km at 22 km/h is a bit over 4 minutes
        let out = evaluate(&input(&s, north(1_500.0))).unwrap();
        assert_eq!(out.eta_min, 5);
        assert!(!out.should_fire);

        let out = evaluate(&input(&s, north(1_000.0))).unwrap();
        assert_eq!(out.eta_min, 3);
        assert!(out.should_fire);
    }

    #[test]
    fn thresholds_beyond_ui_range_still_work() {
        let s = distance(25_000.0);
        assert!(evaluate(&input(&s, north(24_000.0))).unwrap().should_fire);
        let s = distance(1.5);
        assert!(evaluate(&input(&s, north(1.0))).unwrap().should_fire);
    }

    #[test]
    fn nan_position_is_no_decision() {
        let s = distance(500.0);
        let inp = input(&s, Coordinate::new(f64::NAN, 0.0));
        assert!(evaluate(&inp).is_err());
    }

    #[test]
    fn end_to_end_equator_sample() {
        let s = distance(500.0);
        let out = evaluate(&input(&s, Coordinate::new(0.0, 0.0045))).unwrap();
        assert!((out.distance_m - 500.0).abs() < 1.0);
        assert!(!out.should_fire);

        let out = evaluate(&input(&s, Coordinate::new(0.0, 0.0044))).unwrap();
        assert!(out.should_fire);
    }
}
