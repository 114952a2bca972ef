use std::time::Duration;

use thiserror::Error;
use time::OffsetDateTime;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, warn};
use wakestop_proto::Coordinate;

pub const DEFAULT_BAUD: u32 = 115_200;
pub const DEFAULT_SAMPLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Nominal range error used to turn HDOP into an accuracy radius.
const UERE_M: f32 = 5.0;
/// GGA data older than this is not attached to a fix.
const MAX_GGA_AGE_S: i64 = 5;
/// First pause after a failed read; doubles per consecutive failure.
const RETRY_BASE: Duration = Duration::from_millis(500);
pub const RETRY_MAX: Duration = Duration::from_secs(8);

/// Pause before the next attempt after `failures` consecutive failures.
pub fn retry_delay(failures: u32) -> Duration {
    if failures == 0 {
        return Duration::ZERO;
    }
    (RETRY_BASE * (1u32 << (failures - 1).min(4))).min(RETRY_MAX)
}

/// Transport-level failures of the position source. Never fatal; the caller
/// reports them and waits for the next sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PositionError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("timed out waiting for a position fix")]
    Timeout,
    #[error("position unavailable")]
    PositionUnavailable,
}

impl PositionError {
    fn from_io(e: &std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::PermissionDenied => PositionError::PermissionDenied,
            std::io::ErrorKind::TimedOut => PositionError::Timeout,
            _ => PositionError::PositionUnavailable,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fix {
    pub at: Coordinate,
    /// Estimated horizontal accuracy, when the receiver reported HDOP recently.
    pub accuracy_m: Option<f32>,
    pub ts: OffsetDateTime,
}

enum Input {
    Serial(BufReader<SerialStream>),
    File(BufReader<File>),
    /// Fixes pushed by an embedding host.
    Channel(mpsc::Receiver<Result<Fix, PositionError>>),
}

/// Live position stream. Every read is bounded by the sample timeout.
pub struct GeoSampler {
    input: Input,
    parser: NmeaParser,
    sample_timeout: Duration,
    closed: bool,
    /// Consecutive read failures from a serial or file input.
    failures: u32,
}

impl GeoSampler {
    fn with_input(input: Input) -> Self {
        Self {
            input,
            parser: NmeaParser::default(),
            sample_timeout: DEFAULT_SAMPLE_TIMEOUT,
            closed: false,
            failures: 0,
        }
    }

    pub fn serial(dev: &str, baud: u32) -> Result<Self, PositionError> {
        let port = tokio_serial::new(dev, baud).open_native_async().map_err(|e| {
            warn!("gnss: open serial {} failed: {}", dev, e);
            match e.kind {
                tokio_serial::ErrorKind::Io(std::io::ErrorKind::PermissionDenied) => {
                    PositionError::PermissionDenied
                }
                _ => PositionError::PositionUnavailable,
            }
        })?;
        Ok(Self::with_input(Input::Serial(BufReader::new(port))))
    }

    /// Replays an NMEA log, following it like `tail -f` once the end is reached.
    pub fn file(path: &str) -> Result<Self, PositionError> {
        let f = std::fs::File::open(path).map_err(|e| {
            warn!("gnss: open nmea file {} failed: {}", path, e);
            PositionError::from_io(&e)
        })?;
        if f.metadata().map(|m| m.is_dir()).unwrap_or(false) {
            warn!("gnss: nmea path {} is a directory", path);
            return Err(PositionError::PositionUnavailable);
        }
        Ok(Self::with_input(Input::File(BufReader::new(File::from_std(f)))))
    }

    pub fn channel(rx: mpsc::Receiver<Result<Fix, PositionError>>) -> Self {
        Self::with_input(Input::Channel(rx))
    }

    pub fn with_sample_timeout(mut self, timeout: Duration) -> Self {
        self.sample_timeout = timeout;
        self
    }

    /// The underlying stream ended for good (port closed, host hung up).
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Reads until the next usable fix. A failing device or file is retried
    /// with a growing pause, so a persistent fault yields a bounded error rate.
    pub async fn next_fix(&mut self) -> Result<Fix, PositionError> {
        if self.closed {
            return Err(PositionError::PositionUnavailable);
        }
        if self.failures > 0 {
            let wait = retry_delay(self.failures);
            debug!("gnss: retrying read in {}ms", wait.as_millis());
            tokio::time::sleep(wait).await;
        }
        let res = match tokio::time::timeout(self.sample_timeout, self.read_fix()).await {
            Ok(res) => res,
            Err(_) => Err(PositionError::Timeout),
        };
        match &res {
            Ok(_) => self.failures = 0,
            // a timeout already waited a full sample period
            Err(PositionError::Timeout) => {}
            Err(_) if matches!(self.input, Input::Channel(_)) => {}
            Err(_) => self.failures = self.failures.saturating_add(1),
        }
        res
    }

    async fn read_fix(&mut self) -> Result<Fix, PositionError> {
        let mut line = String::new();
        loop {
            line.clear();
            match &mut self.input {
                Input::Channel(rx) => {
                    return match rx.recv().await {
                        Some(res) => res,
                        None => {
                            self.closed = true;
                            Err(PositionError::PositionUnavailable)
                        }
                    };
                }
                Input::Serial(r) => match r.read_line(&mut line).await {
                    Ok(0) => {
                        self.closed = true;
                        return Err(PositionError::PositionUnavailable);
                    }
                    Ok(_) => {}
                    // line noise on the wire; drop it
                    Err(e) if e.kind() == std::io::ErrorKind::InvalidData => continue,
                    Err(e) => {
                        warn!("gnss: serial read failed: {}", e);
                        return Err(PositionError::from_io(&e));
                    }
                },
                Input::File(r) => {
                    let n = r.read_line(&mut line).await.map_err(|e| PositionError::from_io(&e))?;
                    if n == 0 {
                        tokio::time::sleep(Duration::from_millis(500)).await;
                        continue;
                    }
                }
            }
            if let Some(fix) = self.parser.parse_line(line.trim(), OffsetDateTime::now_utc()) {
                return Ok(fix);
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct GgaInfo {
    hdop: f32,
    seen: OffsetDateTime,
}

/// Minimal NMEA 0183 reader:
/// - GGA: fix quality and HDOP, kept for the accuracy estimate
/// - RMC: status and lat/lon, produces a [`Fix`]
#[derive(Debug, Default)]
pub struct NmeaParser {
    last_gga: Option<GgaInfo>,
}

impl NmeaParser {
    pub fn parse_line(&mut self, s: &str, now: OffsetDateTime) -> Option<Fix> {
        let body = checked_body(s)?;
        let parts: Vec<&str> = body.split(',').collect();
        let kind = parts.first()?.get(2..)?;

        match kind {
            "GGA" if parts.len() > 8 => {
                // parts[6]=fix quality (0 = invalid), parts[8]=hdop
                let valid = !matches!(parts[6], "" | "0");
                self.last_gga = match parts[8].parse::<f32>() {
                    Ok(hdop) if valid => Some(GgaInfo { hdop, seen: now }),
                    _ => None,
                };
                None
            }
            "RMC" if parts.len() > 6 => {
                // parts[2]=status A/V, parts[3..=6]=lat,N/S,lon,E/W
                if parts[2] != "A" {
                    debug!("gnss: rmc status {:?}, skipping", parts[2]);
                    return None;
                }
                let lat = parse_deg_min(parts[3], parts[4])?;
                let lng = parse_deg_min(parts[5], parts[6])?;
                let accuracy_m = self
                    .last_gga
                    .filter(|g| (now - g.seen).whole_seconds() <= MAX_GGA_AGE_S)
                    .map(|g| g.hdop * UERE_M);
                Some(Fix { at: Coordinate::new(lat, lng), accuracy_m, ts: now })
            }
            _ => None,
        }
    }
}

/// Strips `$` and verifies the `*hh` checksum when present.
fn checked_body(s: &str) -> Option<&str> {
    let s = s.strip_prefix('$')?;
    match s.split_once('*') {
        Some((body, sum)) => {
            let want = u8::from_str_radix(sum.get(..2)?, 16).ok()?;
            let got = body.bytes().fold(0u8, |acc, b| acc ^ b);
            if got != want {
                debug!("gnss: checksum mismatch ({:02X} != {:02X})", got, want);
                return None;
            }
            Some(body)
        }
        None => Some(s),
    }
}

fn parse_deg_min(v: &str, hemi: &str) -> Option<f64> {
    if v.is_empty() {
        return None;
    }
    // lat: ddmm.mmmm, lon: dddmm.mmmm
    let dot = v.find('.')?;
    let deg_len = if dot > 4 { 3 } else { 2 };
    let deg: f64 = v.get(..deg_len)?.parse().ok()?;
    let min: f64 = v.get(deg_len..)?.parse().ok()?;
    let out = deg + (min / 60.0);
    match hemi {
        "N" | "E" => Some(out),
        "S" | "W" => Some(-out),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    const GGA: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47";
    const RMC: &str = "$GPRMC,123519,A,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*6A";
    const RMC_VOID: &str = "$GPRMC,123519,V,4807.038,N,01131.000,E,022.4,084.4,230394,003.1,W*7D";
    const NOW: OffsetDateTime = datetime!(2024-05-01 08:00 UTC);

    #[test]
    fn rmc_after_gga_carries_accuracy() {
        let mut p = NmeaParser::default();
        assert!(p.parse_line(GGA, NOW).is_none());
        let fix = p.parse_line(RMC, NOW).unwrap();
        assert!((fix.at.lat - 48.1173).abs() < 1e-4);
        assert!((fix.at.lng - 11.516_667).abs() < 1e-5);
        assert_eq!(fix.accuracy_m, Some(0.9 * 5.0));
        assert_eq!(fix.ts, NOW);
    }

    #[test]
    fn stale_gga_is_not_attached() {
        let mut p = NmeaParser::default();
        p.parse_line(GGA, NOW);
        let fix = p.parse_line(RMC, NOW + time::Duration::seconds(6)).unwrap();
        assert_eq!(fix.accuracy_m, None);
    }

    #[test]
    fn void_rmc_is_skipped() {
        let mut p = NmeaParser::default();
        assert!(p.parse_line(RMC_VOID, NOW).is_none());
    }

    #[test]
    fn bad_checksum_is_skipped() {
        let mut p = NmeaParser::default();
        let tampered = RMC.replace("*6A", "*6B");
        assert!(p.parse_line(&tampered, NOW).is_none());
    }

    #[test]
    fn southern_hemisphere_and_invalid_gga() {
        let mut p = NmeaParser::default();
        p.parse_line("$GNGGA,081500,3352.128,S,15112.558,E,0,00,99.9,,M,,M,,*47", NOW);
        let fix = p
            .parse_line("$GNRMC,081500,A,3352.128,S,15112.558,E,0.0,0.0,010524,,*12", NOW)
            .unwrap();
        assert!((fix.at.lat + 33.8688).abs() < 1e-4);
        assert!((fix.at.lng - 151.2093).abs() < 1e-4);
        assert_eq!(fix.accuracy_m, None);
    }

    #[test]
    fn garbage_does_not_panic() {
        let mut p = NmeaParser::default();
        for s in ["", "$", "$GP", "$GPRMC,,A,,,,", "$GPRMC,1,A,4.0,N,1.0,X", "GPRMC,nope", "$GPRMC*ZZ"] {
            assert!(p.parse_line(s, NOW).is_none(), "{s}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn channel_source_times_out_then_closes() {
        let (tx, rx) = mpsc::channel(4);
        let mut src = GeoSampler::channel(rx).with_sample_timeout(Duration::from_secs(5));

        let fix = Fix { at: Coordinate::new(1.0, 2.0), accuracy_m: Some(4.0), ts: NOW };
        tx.send(Ok(fix)).await.unwrap();
        tx.send(Err(PositionError::PermissionDenied)).await.unwrap();
        assert_eq!(src.next_fix().await, Ok(fix));
        assert_eq!(src.next_fix().await, Err(PositionError::PermissionDenied));
        assert_eq!(src.next_fix().await, Err(PositionError::Timeout));
        assert!(!src.is_closed());

        drop(tx);
        assert_eq!(src.next_fix().await, Err(PositionError::PositionUnavailable));
        assert!(src.is_closed());
    }

    #[tokio::test]
    async fn file_source_replays_nmea() {
        let path = std::env::temp_dir().join(format!("wakestop-gnss-{}.nmea", std::process::id()));
        std::fs::write(&path, format!("{GGA}\r\n{RMC_VOID}\r\n{RMC}\r\n")).unwrap();

        let mut src = GeoSampler::file(path.to_str().unwrap()).unwrap();
        let fix = src.next_fix().await.unwrap();
        assert!((fix.at.lat - 48.1173).abs() < 1e-4);
        assert!(fix.accuracy_m.is_some());

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn directory_is_not_a_track() {
        let dir = std::env::temp_dir();
        let err = GeoSampler::file(dir.to_str().unwrap()).err();
        assert_eq!(err, Some(PositionError::PositionUnavailable));
    }

    #[test]
    fn retry_delay_doubles_up_to_cap() {
        assert_eq!(retry_delay(0), Duration::ZERO);
        assert_eq!(retry_delay(1), Duration::from_millis(500));
        assert_eq!(retry_delay(2), Duration::from_millis(1000));
        assert_eq!(retry_delay(4), Duration::from_millis(4000));
        assert_eq!(retry_delay(5), RETRY_MAX);
        assert_eq!(retry_delay(40), RETRY_MAX);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_reads_are_paced() {
        // reading a directory fd fails with EISDIR on every call
        let dir = std::fs::File::open(std::env::temp_dir()).unwrap();
        let mut src = GeoSampler::with_input(Input::File(BufReader::new(File::from_std(dir))));

        let start = tokio::time::Instant::now();
        let mut errors = 0;
        for _ in 0..1_000 {
            if start.elapsed() >= Duration::from_secs(60) {
                break;
            }
            if src.next_fix().await.is_err() {
                errors += 1;
            }
        }
        assert!(start.elapsed() >= Duration::from_secs(60));
        assert!((1..=12).contains(&errors), "{errors} errors in a minute");
    }

    #[test]
    fn missing_file_is_unavailable() {
        let err = GeoSampler::file("/nonexistent/wakestop/track.nmea").err();
        assert_eq!(err, Some(PositionError::PositionUnavailable));
    }
}
