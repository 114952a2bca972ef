use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use wakestop_proto::{AlarmSettings, Language};

use crate::sink::AlertSink;
use crate::strings;
use crate::vibration::VibrationPattern;

pub const DEFAULT_REPEAT_INTERVAL: Duration = Duration::from_millis(1500);

#[derive(Debug, Clone)]
pub struct AlarmConfig {
    pub repeat_interval: Duration,
    pub vibration: VibrationPattern,
    pub language: Language,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        Self {
            repeat_interval: DEFAULT_REPEAT_INTERVAL,
            vibration: VibrationPattern::default(),
            language: Language::En,
        }
    }
}

/// Keeps a fired alarm audible until dismissed.
///
/// Rings immediately on `start`, then once per `repeat_interval`. At most one
/// ringing task exists; `start` replaces it and `stop`/drop end it.
pub struct AlarmLoop {
    sink: Arc<dyn AlertSink>,
    cfg: AlarmConfig,
    token: Option<CancellationToken>,
    handle: Option<JoinHandle<u64>>,
}

impl AlarmLoop {
    pub fn new(sink: Arc<dyn AlertSink>, cfg: AlarmConfig) -> Self {
        Self { sink, cfg, token: None, handle: None }
    }

    /// Best-effort system notification for the arrival itself.
    pub fn announce(&self, destination: &str, distance_m: f64, eta_min: u32) {
        let lang = self.cfg.language;
        let body = strings::arrival_body(lang, destination, distance_m, eta_min);
        if let Err(e) = self.sink.notify(strings::arrival_title(lang), &body) {
            debug!("alarm: notification failed: {:#}", e);
        }
    }

    pub fn start(&mut self, settings: &AlarmSettings) {
        self.abort();

        let token = CancellationToken::new();
        let cancel = token.clone();
        let sink = self.sink.clone();
        let settings = settings.clone();
        let pattern = self.cfg.vibration.clone();
        let every = self.cfg.repeat_interval.max(Duration::from_millis(100));

        info!("alarm: ringing every {}ms", every.as_millis());
        self.handle = Some(tokio::spawn(async move {
            let mut tick = interval(every);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut rings = 0u64;
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tick.tick() => {
                        ring(sink.as_ref(), &settings, &pattern);
                        rings += 1;
                    }
                }
            }
            rings
        }));
        self.token = Some(token);
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops ringing and returns how many times the alert went off.
    pub async fn stop(&mut self) -> u64 {
        if let Some(t) = self.token.take() {
            t.cancel();
        }
        let Some(h) = self.handle.take() else { return 0 };
        match h.await {
            Ok(rings) => {
                info!("alarm: stopped after {} rings", rings);
                rings
            }
            Err(e) => {
                debug!("alarm: ring task join failed: {}", e);
                0
            }
        }
    }

    fn abort(&mut self) {
        if let Some(t) = self.token.take() {
            t.cancel();
        }
        if let Some(h) = self.handle.take() {
            h.abort();
        }
    }
}

impl Drop for AlarmLoop {
    fn drop(&mut self) {
        self.abort();
    }
}

fn ring(sink: &dyn AlertSink, settings: &AlarmSettings, pattern: &VibrationPattern) {
    if settings.plays_sound() {
        if let Err(e) = sink.play(settings.sound_profile) {
            debug!("alarm: sound failed: {:#}", e);
        }
    }
    if settings.vibration_enabled && !pattern.is_noop() {
        if let Err(e) = sink.vibrate(pattern) {
            debug!("alarm: vibration failed: {:#}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use wakestop_proto::SoundProfile;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Play(SoundProfile),
        Vibrate(Vec<u32>),
        Notify(String),
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<Call>>,
        fail_vibrate: bool,
    }

    impl Recorder {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
        fn plays(&self) -> usize {
            self.calls().iter().filter(|c| matches!(c, Call::Play(_))).count()
        }
    }

    impl AlertSink for Recorder {
        fn play(&self, profile: SoundProfile) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::Play(profile));
            Ok(())
        }
        fn vibrate(&self, pattern: &VibrationPattern) -> anyhow::Result<()> {
            if self.fail_vibrate {
                anyhow::bail!("no motor");
            }
            self.calls.lock().unwrap().push(Call::Vibrate(pattern.segments().to_vec()));
            Ok(())
        }
        fn notify(&self, title: &str, _body: &str) -> anyhow::Result<()> {
            self.calls.lock().unwrap().push(Call::Notify(title.to_string()));
            Ok(())
        }
    }

    fn looped(rec: &Arc<Recorder>) -> AlarmLoop {
        AlarmLoop::new(rec.clone(), AlarmConfig::default())
    }

    #[tokio::test(start_paused = true)]
    async fn rings_immediately_then_every_interval() {
        let rec = Arc::new(Recorder::default());
        let mut alarm = looped(&rec);
        alarm.start(&AlarmSettings::default());

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(
            rec.calls(),
            vec![Call::Play(SoundProfile::Pulse), Call::Vibrate(vec![400, 200, 400])]
        );

        tokio::time::sleep(Duration::from_millis(3_100)).await;
        assert_eq!(rec.plays(), 3);

        assert_eq!(alarm.stop().await, 3);
        assert!(!alarm.is_running());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(rec.plays(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn restart_keeps_a_single_ringer() {
        let rec = Arc::new(Recorder::default());
        let mut alarm = looped(&rec);
        let settings = AlarmSettings::default();
        alarm.start(&settings);
        tokio::time::sleep(Duration::from_millis(10)).await;
        alarm.start(&settings);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(rec.plays(), 2);

        tokio::time::sleep(Duration::from_millis(1_500)).await;
        // only the second loop is still ringing
        assert_eq!(rec.plays(), 3);
        alarm.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn silent_profile_and_failed_vibration_degrade_quietly() {
        let rec = Arc::new(Recorder { fail_vibrate: true, ..Recorder::default() });
        let mut alarm = looped(&rec);
        let settings = AlarmSettings { sound_profile: SoundProfile::Silent, ..AlarmSettings::default() };
        alarm.start(&settings);
        tokio::time::sleep(Duration::from_millis(1_600)).await;
        assert!(rec.calls().is_empty());
        assert!(alarm.is_running());
        assert_eq!(alarm.stop().await, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn drop_stops_ringing() {
        let rec = Arc::new(Recorder::default());
        let mut alarm = looped(&rec);
        alarm.start(&AlarmSettings { vibration_enabled: false, ..AlarmSettings::default() });
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(alarm);
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(rec.calls(), vec![Call::Play(SoundProfile::Pulse)]);
    }

    #[tokio::test]
    async fn announce_uses_language() {
        let rec = Arc::new(Recorder::default());
        let alarm = AlarmLoop::new(rec.clone(), AlarmConfig { language: Language::Es, ..AlarmConfig::default() });
        alarm.announce("Puerto", 300.0, 1);
        assert_eq!(rec.calls(), vec![Call::Notify(strings::arrival_title(Language::Es).to_string())]);
    }

    #[tokio::test]
    async fn stop_without_start_is_noop() {
        let rec = Arc::new(Recorder::default());
        let mut alarm = looped(&rec);
        assert_eq!(alarm.stop().await, 0);
    }
}
