use serde::{Deserialize, Serialize};

/// WGS-84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub name: String,
    #[serde(flatten)]
    pub at: Coordinate,
}

impl Destination {
    pub fn new(name: impl Into<String>, at: Coordinate) -> Self {
        Self { name: name.into(), at }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    /// Threshold in meters.
    Distance,
    /// Threshold in minutes of estimated travel.
    Time,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SoundProfile {
    #[default]
    Pulse,
    Beep,
    Chime,
    Siren,
    #[serde(rename = "none")]
    Silent,
}

impl SoundProfile {
    pub const ALL: [SoundProfile; 5] = [
        SoundProfile::Pulse,
        SoundProfile::Beep,
        SoundProfile::Chime,
        SoundProfile::Siren,
        SoundProfile::Silent,
    ];

    pub fn name(self) -> &'static str {
        match self {
            SoundProfile::Pulse => "pulse",
            SoundProfile::Beep => "beep",
            SoundProfile::Chime => "chime",
            SoundProfile::Siren => "siren",
            SoundProfile::Silent => "none",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmSettings {
    pub alert_type: AlertType,
    /// Meters for `Distance`, minutes for `Time`. Non-positive never triggers.
    pub threshold: f64,
    pub sound_enabled: bool,
    #[serde(default)]
    pub sound_profile: SoundProfile,
    pub vibration_enabled: bool,
}

impl Default for AlarmSettings {
    fn default() -> Self {
        Self {
            alert_type: AlertType::Distance,
            threshold: 500.0,
            sound_enabled: true,
            sound_profile: SoundProfile::Pulse,
            vibration_enabled: true,
        }
    }
}

impl AlarmSettings {
    /// `none` suppresses sound even when sound is enabled.
    pub fn plays_sound(&self) -> bool {
        self.sound_enabled && self.sound_profile != SoundProfile::Silent
    }

    /// Range the settings screen offers for the current alert type.
    pub fn ui_range(&self) -> (f64, f64) {
        match self.alert_type {
            AlertType::Distance => (100.0, 2000.0),
            AlertType::Time => (1.0, 15.0),
        }
    }
}

/// Display language. Never influences detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Es,
}
