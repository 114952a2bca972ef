//! Process-wide audio output.
//!
//! The output starts suspended and must be resumed (typically on the first
//! user action) before tones are heard. `play` resumes on demand. Devices are
//! opened lazily on a dedicated thread because the backend stream is not `Send`.
//! Nothing here waits on that thread: a device that fails to open shows up as
//! a closed channel on the next `play`, which marks the output unavailable.

use std::sync::mpsc::Sender;
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use once_cell::sync::Lazy;
use tracing::{debug, info};
use wakestop_proto::SoundProfile;

use crate::tone::{self, SAMPLE_RATE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioState {
    Suspended,
    Running,
    /// No device or backend; stays this way for the life of the process.
    Unavailable,
}

struct Inner {
    state: AudioState,
    tx: Option<Sender<Vec<f32>>>,
}

pub struct AudioOutput {
    inner: Mutex<Inner>,
}

static AUDIO: Lazy<AudioOutput> = Lazy::new(AudioOutput::new);

impl AudioOutput {
    fn new() -> Self {
        Self { inner: Mutex::new(Inner { state: AudioState::Suspended, tx: None }) }
    }

    pub fn global() -> &'static AudioOutput {
        &AUDIO
    }

    pub fn state(&self) -> AudioState {
        self.lock().state
    }

    pub fn resume(&self) -> Result<()> {
        let mut inner = self.lock();
        match inner.state {
            AudioState::Running => Ok(()),
            AudioState::Unavailable => Err(anyhow!("audio output unavailable")),
            AudioState::Suspended => {
                if inner.tx.is_none() {
                    match backend::spawn() {
                        Ok(tx) => inner.tx = Some(tx),
                        Err(e) => {
                            inner.state = AudioState::Unavailable;
                            return Err(e);
                        }
                    }
                }
                inner.state = AudioState::Running;
                info!("audio: output running");
                Ok(())
            }
        }
    }

    #[cfg(test)]
    fn with_sender(state: AudioState, tx: Sender<Vec<f32>>) -> Self {
        Self { inner: Mutex::new(Inner { state, tx: Some(tx) }) }
    }

    pub fn suspend(&self) {
        let mut inner = self.lock();
        if inner.state == AudioState::Running {
            inner.state = AudioState::Suspended;
            debug!("audio: output suspended");
        }
    }

    pub fn play(&self, profile: SoundProfile) -> Result<()> {
        let samples = tone::render(profile, SAMPLE_RATE);
        if samples.is_empty() {
            return Ok(());
        }
        if self.state() != AudioState::Running {
            self.resume()?;
        }
        let mut inner = self.lock();
        let tx = inner.tx.as_ref().ok_or_else(|| anyhow!("audio output not started"))?;
        if tx.send(samples).is_err() {
            inner.tx = None;
            inner.state = AudioState::Unavailable;
            return Err(anyhow!("audio thread exited"));
        }
        Ok(())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // state stays consistent even if a holder panicked
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(feature = "audio-rodio")]
mod backend {
    use std::sync::mpsc::{self, Sender};
    use std::thread;

    use anyhow::{Context, Result};
    use rodio::buffer::SamplesBuffer;
    use rodio::{OutputStream, Sink};
    use tracing::warn;

    use crate::tone::SAMPLE_RATE;

    /// Starts the device thread and returns at once. If the device cannot be
    /// opened the thread exits and drops the receiver.
    pub fn spawn() -> Result<Sender<Vec<f32>>> {
        let (tx, rx) = mpsc::channel::<Vec<f32>>();

        thread::Builder::new()
            .name("wakestop-audio".to_string())
            .spawn(move || {
                let (_stream, handle) = match OutputStream::try_default() {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("audio: open output failed: {}", e);
                        return;
                    }
                };
                while let Ok(samples) = rx.recv() {
                    match Sink::try_new(&handle) {
                        Ok(sink) => {
                            sink.append(SamplesBuffer::new(1, SAMPLE_RATE, samples));
                            sink.detach();
                        }
                        Err(e) => warn!("audio: sink failed: {}", e),
                    }
                }
            })
            .context("spawn audio thread")?;
        Ok(tx)
    }
}

#[cfg(not(feature = "audio-rodio"))]
mod backend {
    use std::sync::mpsc::Sender;

    use anyhow::{bail, Result};

    pub fn spawn() -> Result<Sender<Vec<f32>>> {
        bail!("built without the audio-rodio feature")
    }
}
