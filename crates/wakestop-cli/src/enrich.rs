//! Destination enrichment: a side lookup that decorates the trip screen.
//!
//! Lookups never block or fail the trip. A newer request aborts the one in
//! flight, and anything that still finishes late is discarded by generation.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use wakestop_proto::Destination;

pub const LOOKUP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq)]
pub struct Enrichment {
    pub query: String,
    pub text: String,
    pub fallback: bool,
}

pub fn local_fallback(d: &Destination) -> String {
    format!("{} · {:.5}, {:.5}", d.name, d.at.lat, d.at.lng)
}

pub struct EnrichmentSlot {
    generation: Arc<AtomicU64>,
    tx: Arc<watch::Sender<Option<Enrichment>>>,
    handle: Option<JoinHandle<()>>,
}

impl EnrichmentSlot {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { generation: Arc::new(AtomicU64::new(0)), tx: Arc::new(tx), handle: None }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Enrichment>> {
        self.tx.subscribe()
    }

    pub fn request<F>(&mut self, dest: &Destination, lookup: F)
    where
        F: Future<Output = Result<String>> + Send + 'static,
    {
        self.cancel();
        let gen = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.generation.clone();
        let tx = self.tx.clone();
        let query = dest.name.clone();
        let fallback = local_fallback(dest);

        self.handle = Some(tokio::spawn(async move {
            let (text, fallback) = match tokio::time::timeout(LOOKUP_TIMEOUT, lookup).await {
                Ok(Ok(text)) if !text.trim().is_empty() => (text, false),
                Ok(Ok(_)) => (fallback, true),
                Ok(Err(e)) => {
                    debug!("enrich: lookup for {:?} failed: {:#}", query, e);
                    (fallback, true)
                }
                Err(_) => {
                    debug!("enrich: lookup for {:?} timed out", query);
                    (fallback, true)
                }
            };
            if current.load(Ordering::SeqCst) != gen {
                debug!("enrich: dropping stale result for {:?}", query);
                return;
            }
            tx.send_replace(Some(Enrichment { query, text, fallback }));
        }));
    }

    /// Aborts the in-flight lookup, if any. Already-published results stay.
    pub fn cancel(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            h.abort();
        }
    }
}

impl Drop for EnrichmentSlot {
    fn drop(&mut self) {
        if let Some(h) = self.handle.take() {
            h.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wakestop_proto::Coordinate;

    fn dest(name: &str) -> Destination {
        Destination::new(name, Coordinate::new(52.37, 4.9))
    }

    #[tokio::test(start_paused = true)]
    async fn newer_query_supersedes_older() {
        let mut slot = EnrichmentSlot::new();
        let mut rx = slot.subscribe();

        slot.request(&dest("Old"), async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            Ok::<_, anyhow::Error>("old result".to_string())
        });
        slot.request(&dest("New"), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<_, anyhow::Error>("new result".to_string())
        });

        rx.changed().await.unwrap();
        let got = rx.borrow_and_update().clone().unwrap();
        assert_eq!(got.query, "New");
        assert_eq!(got.text, "new result");
        assert!(!got.fallback);

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn failure_publishes_local_fallback() {
        let mut slot = EnrichmentSlot::new();
        let mut rx = slot.subscribe();
        slot.request(&dest("Harbour"), async { Err::<String, _>(anyhow::anyhow!("service down")) });
        rx.changed().await.unwrap();
        let got = rx.borrow_and_update().clone().unwrap();
        assert!(got.fallback);
        assert_eq!(got.text, "Harbour · 52.37000, 4.90000");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_lookup_times_out_to_fallback() {
        let mut slot = EnrichmentSlot::new();
        let mut rx = slot.subscribe();
        slot.request(&dest("Depot"), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, anyhow::Error>("too late".to_string())
        });
        rx.changed().await.unwrap();
        assert!(rx.borrow().as_ref().unwrap().fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_discards_in_flight() {
        let mut slot = EnrichmentSlot::new();
        let rx = slot.subscribe();
        slot.request(&dest("Depot"), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            Ok::<_, anyhow::Error>("x".to_string())
        });
        slot.cancel();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.borrow().is_none());
    }
}
