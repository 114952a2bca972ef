pub mod doctor;

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};
use wakestop_proto::{AlarmSettings, Destination};

pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub destination: Destination,
    pub settings: AlarmSettings,
    pub started_unix_ms: i64,
    /// Set when the alarm fired before the trip ended.
    pub arrived_unix_ms: Option<i64>,
}

/// Recent trips and user-curated favorites.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TripBook {
    #[serde(default)]
    pub history: Vec<Trip>,
    #[serde(default)]
    pub favorites: Vec<Trip>,
}

impl TripBook {
    /// Most recent first; an earlier trip to the same destination is replaced.
    pub fn record(&mut self, trip: Trip) {
        self.history.retain(|t| t.destination.name != trip.destination.name);
        self.history.insert(0, trip);
        self.history.truncate(HISTORY_LIMIT);
    }

    /// Adds or replaces the favorite with the same destination name.
    pub fn add_favorite(&mut self, trip: Trip) {
        match self.favorites.iter_mut().find(|t| t.destination.name == trip.destination.name) {
            Some(slot) => *slot = trip,
            None => self.favorites.push(trip),
        }
    }

    pub fn remove_favorite(&mut self, name: &str) -> bool {
        let before = self.favorites.len();
        self.favorites.retain(|t| t.destination.name != name);
        self.favorites.len() != before
    }

    pub fn favorite(&self, name: &str) -> Option<&Trip> {
        self.favorites.iter().find(|t| t.destination.name == name)
    }

    /// A missing file is an empty book.
    pub async fn load(path: &Path) -> Result<Self> {
        match fs::read(path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .with_context(|| format!("parse trips {}", path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("store: {} not found, starting empty", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(e).with_context(|| format!("read trips {}", path.display())),
        }
    }

    /// Writes through a temp file so a crash never leaves a torn document.
    pub async fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).await?;
        }
        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(self)?;
        fs::write(&tmp, json).await.with_context(|| format!("write {}", tmp.display()))?;
        fs::rename(&tmp, path).await.with_context(|| format!("replace {}", path.display()))?;
        info!("store: saved {} history, {} favorites", self.history.len(), self.favorites.len());
        Ok(())
    }
}
