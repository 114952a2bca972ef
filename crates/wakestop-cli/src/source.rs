//! Position source selection and resubscription for `run`.
//!
//! Opening the receiver can fail (device unplugged, no permission, log not
//! written yet). Those failures are reported like any other position error
//! and retried on a growing timer while the trip stays alive.

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::info;
use wakestop_nav::gnss::{retry_delay, GeoSampler, PositionError, DEFAULT_BAUD};
use wakestop_nav::watch::{WatchEvent, WatchSlot};

use crate::GnssCfg;

#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Serial { dev: String, baud: u32 },
    File(String),
}

impl Source {
    /// Config errors here are fatal; transport errors come later from `open`.
    pub fn from_cfg(g: &GnssCfg) -> Result<Self> {
        match g.source.as_str() {
            "nmea-serial" => {
                let dev = g.nmea_device.clone().filter(|s| !s.is_empty()).context("gnss.nmea_device missing")?;
                Ok(Source::Serial { dev, baud: g.baud.unwrap_or(DEFAULT_BAUD) })
            }
            "nmea-file" => {
                let path = g.nmea_file.clone().filter(|s| !s.is_empty()).context("gnss.nmea_file missing")?;
                Ok(Source::File(path))
            }
            other => anyhow::bail!("unknown gnss.source: {}", other),
        }
    }

    pub fn open(&self) -> Result<GeoSampler, PositionError> {
        match self {
            Source::Serial { dev, baud } => GeoSampler::serial(dev, *baud),
            Source::File(path) => GeoSampler::file(path),
        }
    }
}

pub struct Reconnect {
    source: Source,
    sample_timeout: Duration,
    failures: u32,
    retry_at: Instant,
}

impl Reconnect {
    pub fn new(source: Source, sample_timeout: Duration) -> Self {
        Self { source, sample_timeout, failures: 0, retry_at: Instant::now() }
    }

    /// Earliest time the next `connect` should run.
    pub fn retry_at(&self) -> Instant {
        self.retry_at
    }

    /// A fix came through; the next drop reconnects at once.
    pub fn healthy(&mut self) {
        self.failures = 0;
    }

    /// Subscribes `slot` to a freshly opened source, replacing any previous
    /// watch. Every attempt pushes `retry_at` out, so a source that opens and
    /// drops straight away is paced like one that never opens.
    pub async fn connect(&mut self, slot: &mut WatchSlot, tx: &mpsc::Sender<WatchEvent>) -> Result<(), PositionError> {
        self.failures = self.failures.saturating_add(1);
        self.retry_at = Instant::now() + retry_delay(self.failures);
        let sampler = self.source.open()?;
        info!("source: subscribed to {:?}", self.source);
        slot.replace(sampler.with_sample_timeout(self.sample_timeout), tx.clone()).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";

    fn gnss(source: &str, file: Option<&str>) -> GnssCfg {
        GnssCfg {
            source: source.to_string(),
            nmea_device: None,
            nmea_file: file.map(str::to_string),
            baud: None,
            sample_timeout_s: None,
        }
    }

    #[test]
    fn source_from_config() {
        assert_eq!(Source::from_cfg(&gnss("nmea-file", Some("a.nmea"))).unwrap(), Source::File("a.nmea".into()));
        assert!(Source::from_cfg(&gnss("nmea-file", Some(""))).is_err());
        assert!(Source::from_cfg(&gnss("nmea-serial", None)).is_err());
        assert!(Source::from_cfg(&gnss("carrier-pigeon", None)).is_err());
    }

    #[tokio::test]
    async fn missing_track_is_retried_until_it_appears() {
        let path = std::env::temp_dir().join(format!("wakestop-late-{}.nmea", std::process::id()));
        std::fs::remove_file(&path).ok();

        let mut reconnect = Reconnect::new(Source::File(path.to_string_lossy().into_owned()), Duration::from_secs(5));
        let mut slot = WatchSlot::default();
        let (tx, mut rx) = mpsc::channel(8);

        let before = Instant::now();
        assert_eq!(reconnect.connect(&mut slot, &tx).await, Err(PositionError::PositionUnavailable));
        assert!(!slot.is_active());
        assert!(reconnect.retry_at() >= before + Duration::from_millis(500));
        assert_eq!(reconnect.connect(&mut slot, &tx).await, Err(PositionError::PositionUnavailable));
        assert!(reconnect.retry_at() >= before + Duration::from_millis(1000));

        std::fs::write(&path, format!("{RMC}\r\n")).unwrap();
        assert_eq!(reconnect.connect(&mut slot, &tx).await, Ok(()));
        assert!(slot.is_active());
        assert!(matches!(rx.recv().await, Some(WatchEvent::Fix(_))));

        slot.clear().await;
        std::fs::remove_file(&path).ok();
    }
}
