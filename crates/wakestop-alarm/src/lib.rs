pub mod alarm_loop;
pub mod audio;
pub mod sink;
pub mod strings;
pub mod tone;
pub mod vibration;

pub use alarm_loop::{AlarmConfig, AlarmLoop};
pub use sink::{AlertSink, ConsoleSink};
pub use vibration::VibrationPattern;
