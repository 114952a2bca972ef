use anyhow::Result;
use tracing::warn;
use wakestop_proto::{AlarmSettings, Destination};

use crate::geo;

pub fn check_alarm_settings(s: &AlarmSettings) -> Result<()> {
    anyhow::ensure!(
        s.threshold.is_finite() && s.threshold > 0.0,
        "alarm.threshold must be > 0 (got {}); the alarm would never fire",
        s.threshold
    );
    let (lo, hi) = s.ui_range();
    if s.threshold < lo || s.threshold > hi {
        warn!("doctor: alarm.threshold {} outside the usual {}..{} for {:?}", s.threshold, lo, hi, s.alert_type);
    }
    if !s.sound_enabled && !s.vibration_enabled {
        warn!("doctor: both sound and vibration disabled; only the notification will alert");
    }
    Ok(())
}

pub fn check_eta(avg_speed_kmh: f64) -> Result<()> {
    anyhow::ensure!(
        avg_speed_kmh.is_finite() && avg_speed_kmh > 0.0 && avg_speed_kmh <= 300.0,
        "eta.avg_speed_kmh should be in (0, 300]"
    );
    Ok(())
}

pub fn check_sample_timeout(sample_timeout_s: u64) -> Result<()> {
    anyhow::ensure!((1..=600).contains(&sample_timeout_s), "gnss.sample_timeout_s should be 1..600");
    Ok(())
}

pub fn check_destination(d: &Destination) -> Result<()> {
    anyhow::ensure!(!d.name.trim().is_empty(), "destination name is empty");
    geo::validate(d.at)?;
    Ok(())
}
