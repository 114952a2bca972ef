use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

/// Owns the suppression deadline. Expiry is passive: nothing fires when the
/// window closes, the next evaluation just stops being masked.
#[derive(Debug, Clone, Default)]
pub struct SnoozeController {
    until: Option<OffsetDateTime>,
}

impl SnoozeController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last call wins; windows are not additive.
    pub fn snooze(&mut self, now: OffsetDateTime, duration_s: u64) -> OffsetDateTime {
        let secs = i64::try_from(duration_s).unwrap_or(i64::MAX);
        let until = now.saturating_add(time::Duration::seconds(secs));
        self.until = Some(until);
        until
    }

    pub fn until(&self) -> Option<OffsetDateTime> {
        self.until
    }

    pub fn is_snoozed(&self, now: OffsetDateTime) -> bool {
        matches!(self.until, Some(until) if now < until)
    }

    pub fn remaining(&self, now: OffsetDateTime) -> std::time::Duration {
        match self.until {
            Some(until) if now < until => {
                let ms = (until - now).whole_milliseconds();
                std::time::Duration::from_millis(u64::try_from(ms).unwrap_or(u64::MAX))
            }
            _ => std::time::Duration::ZERO,
        }
    }

    /// Whole seconds left, rounded up. Zero when not snoozed or expired.
    pub fn remaining_seconds(&self, now: OffsetDateTime) -> u64 {
        ceil_secs(self.remaining(now))
    }

    pub fn clear(&mut self) {
        self.until = None;
    }
}

fn ceil_secs(d: std::time::Duration) -> u64 {
    let ms = d.as_millis();
    u64::try_from(ms.div_ceil(1000)).unwrap_or(u64::MAX)
}

/// Once-per-second display ticker for the snooze window.
///
/// Publishes the remaining whole seconds on a watch channel until it reaches
/// zero. Only one ticker runs at a time; `start` replaces a running one.
pub struct SnoozeCountdown {
    tx: Arc<watch::Sender<u64>>,
    handle: Option<JoinHandle<()>>,
}

impl SnoozeCountdown {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(0);
        Self { tx: Arc::new(tx), handle: None }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.tx.subscribe()
    }

    pub fn start(&mut self, remaining: std::time::Duration) {
        self.stop();
        let tx = self.tx.clone();
        let deadline = Instant::now() + remaining;
        self.handle = Some(tokio::spawn(async move {
            let mut tick = interval(std::time::Duration::from_secs(1));
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tick.tick().await;
                let left = ceil_secs(deadline.saturating_duration_since(Instant::now()));
                tx.send_replace(left);
                if left == 0 {
                    debug!("snooze: countdown elapsed");
                    break;
                }
            }
        }));
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    pub fn stop(&mut self) {
        if let Some(h) = self.handle.take() {
            h.abort();
            self.tx.send_replace(0);
        }
    }
}

impl Default for SnoozeCountdown {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SnoozeCountdown {
    fn drop(&mut self) {
        if let Some(h) = self.handle.take() {
            h.abort();
        }
    }
}
