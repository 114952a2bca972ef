use std::io::Write;

use anyhow::Result;
use tracing::{debug, info};
use wakestop_proto::SoundProfile;

use crate::audio::AudioOutput;
use crate::vibration::VibrationPattern;

/// Host-side alert channels. Every method is best effort; the alarm loop
/// logs failures and carries on with whatever channels still work.
pub trait AlertSink: Send + Sync {
    fn play(&self, profile: SoundProfile) -> Result<()>;
    fn vibrate(&self, pattern: &VibrationPattern) -> Result<()>;
    fn notify(&self, title: &str, body: &str) -> Result<()>;
}

/// Terminal host: audio through the shared output handle (falling back to
/// the terminal bell), notifications on stderr, no vibration motor.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl AlertSink for ConsoleSink {
    fn play(&self, profile: SoundProfile) -> Result<()> {
        if let Err(e) = AudioOutput::global().play(profile) {
            debug!("sink: audio output unavailable ({:#}), ringing bell", e);
            let mut err = std::io::stderr().lock();
            err.write_all(b"\x07")?;
            err.flush()?;
        }
        Ok(())
    }

    fn vibrate(&self, _pattern: &VibrationPattern) -> Result<()> {
        anyhow::bail!("no vibration hardware on this host")
    }

    fn notify(&self, title: &str, body: &str) -> Result<()> {
        info!("notify: {} / {}", title, body);
        let mut err = std::io::stderr().lock();
        writeln!(err, "\n*** {} ***\n{}\n", title, body)?;
        Ok(())
    }
}
