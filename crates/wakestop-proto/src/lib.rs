pub mod settings;
pub mod telemetry;

pub use settings::{AlarmSettings, AlertType, Coordinate, Destination, Language, SoundProfile};
