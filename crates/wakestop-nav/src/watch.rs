use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::gnss::{Fix, GeoSampler, PositionError};

#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent {
    Fix(Fix),
    Error(PositionError),
}

/// A single live position subscription.
///
/// Samples are pushed to the channel given at spawn time until the watch is
/// cancelled, the receiver goes away, or the source closes. Dropping the
/// watch cancels it.
pub struct PositionWatch {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl PositionWatch {
    pub fn spawn(mut sampler: GeoSampler, tx: mpsc::Sender<WatchEvent>) -> Self {
        let token = CancellationToken::new();
        let cancel = token.clone();

        let handle = tokio::spawn(async move {
            info!("watch: subscribed");
            let mut last_err = None;
            loop {
                let res = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    res = sampler.next_fix() => res,
                };
                let ev = match res {
                    Ok(fix) => {
                        last_err = None;
                        WatchEvent::Fix(fix)
                    }
                    // one report per run of the same failure
                    Err(e) if last_err == Some(e) && !sampler.is_closed() => continue,
                    Err(e) => {
                        last_err = Some(e);
                        WatchEvent::Error(e)
                    }
                };
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    sent = tx.send(ev) => if sent.is_err() { break },
                }
                if sampler.is_closed() {
                    debug!("watch: source closed");
                    break;
                }
            }
            info!("watch: unsubscribed");
        });

        Self { token, handle: Some(handle) }
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Cancels and waits for the subscription task to exit.
    pub async fn shutdown(mut self) {
        self.token.cancel();
        self.join().await;
    }

    /// Resolves once the subscription task has exited on its own or been
    /// cancelled. Pending forever after it already resolved.
    pub async fn finished(&mut self) {
        match self.handle {
            Some(_) => self.join().await,
            None => std::future::pending().await,
        }
    }

    async fn join(&mut self) {
        if let Some(h) = self.handle.as_mut() {
            if let Err(e) = h.await {
                debug!("watch: task join failed: {}", e);
            }
            self.handle = None;
        }
    }
}

impl Drop for PositionWatch {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Owner of the one live subscription. Subscribing again first cancels and
/// joins the previous watch, so an old source never delivers into a new trip.
#[derive(Default)]
pub struct WatchSlot {
    current: Option<PositionWatch>,
}

impl WatchSlot {
    pub async fn replace(&mut self, sampler: GeoSampler, tx: mpsc::Sender<WatchEvent>) {
        self.clear().await;
        self.current = Some(PositionWatch::spawn(sampler, tx));
    }

    pub fn is_active(&self) -> bool {
        self.current.as_ref().is_some_and(PositionWatch::is_active)
    }

    /// Resolves when the current watch ends and empties the slot. Pending
    /// while the slot is empty.
    pub async fn ended(&mut self) {
        match self.current.as_mut() {
            Some(w) => {
                w.finished().await;
                self.current = None;
                debug!("watch: subscription ended");
            }
            None => std::future::pending().await,
        }
    }

    /// Unsubscribes and waits for the task to exit.
    pub async fn clear(&mut self) {
        if let Some(old) = self.current.take() {
            old.shutdown().await;
        }
    }
}
