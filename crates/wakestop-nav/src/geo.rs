use thiserror::Error;
use wakestop_proto::Coordinate;

pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum GeoError {
    #[error("coordinate is not a number (lat={lat}, lng={lng})")]
    NotFinite { lat: f64, lng: f64 },
    #[error("coordinate out of range (lat={lat}, lng={lng})")]
    OutOfRange { lat: f64, lng: f64 },
}

/// Rejects NaN/infinite values and anything outside [-90,90] x [-180,180].
pub fn validate(c: Coordinate) -> Result<Coordinate, GeoError> {
    if !c.lat.is_finite() || !c.lng.is_finite() {
        return Err(GeoError::NotFinite { lat: c.lat, lng: c.lng });
    }
    if c.lat.abs() > 90.0 || c.lng.abs() > 180.0 {
        return Err(GeoError::OutOfRange { lat: c.lat, lng: c.lng });
    }
    Ok(c)
}

/// Great-circle distance in meters on a spherical earth.
pub fn haversine_m(a: Coordinate, b: Coordinate) -> f64 {
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();
    let h = (dlat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    // rounding can push h a hair past 1 for antipodal points
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_M * c
}

/// Guarded distance: invalid input never yields a number.
pub fn distance_m(a: Coordinate, b: Coordinate) -> Result<f64, GeoError> {
    let a = validate(a)?;
    let b = validate(b)?;
    Ok(haversine_m(a, b))
}
