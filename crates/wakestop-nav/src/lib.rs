pub mod detector;
pub mod doctor;
pub mod eta;
pub mod geo;
pub mod gnss;
pub mod session;
pub mod snooze;
pub mod watch;
