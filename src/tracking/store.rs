use std::path::Path;

use crate::prelude::Arc;
use crate::storage::{Collection, DirCollection, MemoryCollection};
use crate::tracking::types::Track;
use crate::{Error, Result};

/// Persistent track collection, one JSON record per track id.
pub struct TrackStore {
    tracks: Arc<dyn Collection>,
}

impl TrackStore {
    pub fn new(tracks: Arc<dyn Collection>) -> Self {
        Self { tracks }
    }

    /// Open the `tracks/` collection under `data_dir`
    pub async fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let tracks = DirCollection::open(data_dir.as_ref().join("tracks")).await?;
        Ok(Self::new(Arc::new(tracks)))
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryCollection::new()))
    }

    /// Insert or replace; the last write for an id wins
    pub async fn save(&self, track: &Track) -> Result<()> {
        let encoded = serde_json::to_vec(track)?;
        self.tracks.put(&track.id, encoded).await
    }

    pub async fn get(&self, id: &str) -> Result<Option<Track>> {
        match self.tracks.get(id).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Fails with `NotFound` when the track does not exist
    pub async fn require(&self, id: &str) -> Result<Track> {
        self.get(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("track {id}")))
    }

    /// Every stored track, oldest first. Unreadable records are skipped.
    pub async fn list(&self) -> Result<Vec<Track>> {
        let mut tracks = Vec::new();
        for id in self.tracks.keys().await? {
            match self.get(&id).await {
                Ok(Some(track)) => tracks.push(track),
                Ok(None) => {}
                Err(Error::Serialization(e)) => {
                    log::warn!("skipping unreadable track record {}: {}", id, e)
                }
                Err(e) => return Err(e),
            }
        }
        tracks.sort_by(|a, b| {
            a.start_time_ms
                .cmp(&b.start_time_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(tracks)
    }

    /// Remove a track; returns whether it existed
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let existed = self.tracks.contains(id).await?;
        if existed {
            self.tracks.delete(id).await?;
        }
        Ok(existed)
    }
}
