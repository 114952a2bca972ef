//! Short synthesized alert tones, one per [`SoundProfile`].

use std::f32::consts::TAU;

use wakestop_proto::SoundProfile;

pub const SAMPLE_RATE: u32 = 22_050;
const GAIN: f32 = 0.3;
const ATTACK_S: f32 = 0.01;
const RELEASE_S: f32 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    Square,
    Triangle,
    Saw,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSpec {
    pub waveform: Waveform,
    pub start_hz: f32,
    pub end_hz: f32,
    pub duration_s: f32,
    pub pulses: u8,
    pub gap_s: f32,
    /// Exponential fade across the tone instead of a flat sustain.
    pub decay: bool,
}

impl ToneSpec {
    pub fn for_profile(profile: SoundProfile) -> Option<Self> {
        let spec = match profile {
            SoundProfile::Pulse => ToneSpec {
                waveform: Waveform::Sine,
                start_hz: 880.0,
                end_hz: 880.0,
                duration_s: 0.12,
                pulses: 3,
                gap_s: 0.08,
                decay: false,
            },
            SoundProfile::Beep => ToneSpec {
                waveform: Waveform::Square,
                start_hz: 1000.0,
                end_hz: 1000.0,
                duration_s: 0.25,
                pulses: 1,
                gap_s: 0.0,
                decay: false,
            },
            SoundProfile::Chime => ToneSpec {
                waveform: Waveform::Triangle,
                start_hz: 1320.0,
                end_hz: 660.0,
                duration_s: 0.6,
                pulses: 1,
                gap_s: 0.0,
                decay: true,
            },
            SoundProfile::Siren => ToneSpec {
                waveform: Waveform::Saw,
                start_hz: 600.0,
                end_hz: 1200.0,
                duration_s: 0.9,
                pulses: 1,
                gap_s: 0.0,
                decay: false,
            },
            SoundProfile::Silent => return None,
        };
        Some(spec)
    }

    pub fn total_s(&self) -> f32 {
        let n = f32::from(self.pulses);
        n * self.duration_s + (n - 1.0).max(0.0) * self.gap_s
    }

    /// Mono f32 samples in [-1, 1].
    pub fn render(&self, sample_rate: u32) -> Vec<f32> {
        let sr = sample_rate as f32;
        let on = (self.duration_s * sr) as usize;
        let gap = (self.gap_s * sr) as usize;
        let mut out = Vec::with_capacity((self.total_s() * sr) as usize + 1);

        for pulse in 0..self.pulses {
            if pulse > 0 {
                out.extend(std::iter::repeat(0.0).take(gap));
            }
            let mut phase = 0.0_f32;
            for i in 0..on {
                let t = i as f32 / sr;
                let progress = t / self.duration_s;
                let hz = self.start_hz + (self.end_hz - self.start_hz) * progress;
                phase = (phase + hz / sr).fract();
                out.push(wave(self.waveform, phase) * self.envelope(t) * GAIN);
            }
        }
        out
    }

    fn envelope(&self, t: f32) -> f32 {
        let attack = (t / ATTACK_S).min(1.0);
        let release = ((self.duration_s - t) / RELEASE_S).clamp(0.0, 1.0);
        let body = if self.decay { (-4.0 * t / self.duration_s).exp() } else { 1.0 };
        attack * release * body
    }
}

fn wave(w: Waveform, phase: f32) -> f32 {
    match w {
        Waveform::Sine => (phase * TAU).sin(),
        Waveform::Square => {
            if phase < 0.5 {
                1.0
            } else {
                -1.0
            }
        }
        Waveform::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
        Waveform::Saw => 2.0 * phase - 1.0,
    }
}

/// Rendered samples for a profile; empty for `none`.
pub fn render(profile: SoundProfile, sample_rate: u32) -> Vec<f32> {
    ToneSpec::for_profile(profile).map(|s| s.render(sample_rate)).unwrap_or_default()
}
