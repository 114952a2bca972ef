/// Typical urban bus speed.
pub const DEFAULT_AVG_SPEED_KMH: f64 = 22.0;

/// Whole minutes (rounded up) to cover `distance_m` at `avg_speed_kmh`.
///
/// Zero or negative distance is already there. A non-positive speed never
/// arrives, so the estimate saturates at `u32::MAX`.
pub fn eta_minutes(distance_m: f64, avg_speed_kmh: f64) -> u32 {
    if !(distance_m > 0.0) {
        return 0;
    }
    if !(avg_speed_kmh > 0.0) || !avg_speed_kmh.is_finite() {
        return u32::MAX;
    }
    let mps = avg_speed_kmh * 1000.0 / 3600.0;
    // f64 -> u32 casts saturate
    (distance_m / mps / 60.0).ceil() as u32
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EtaModel {
    pub avg_speed_kmh: f64,
}

impl Default for EtaModel {
    fn default() -> Self {
        Self { avg_speed_kmh: DEFAULT_AVG_SPEED_KMH }
    }
}

impl EtaModel {
    pub fn minutes(&self, distance_m: f64) -> u32 {
        eta_minutes(distance_m, self.avg_speed_kmh)
    }
}
