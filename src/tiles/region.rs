use serde::{Deserialize, Serialize};

use crate::core::geo::{tile_index, Bounds, TileKey};

/// Lifecycle of a region download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RegionStatus {
    Pending,
    Downloading,
    /// Every tile was attempted. Failed tiles are counted in
    /// `Region::failed_tile_count`; they do not change the status.
    Complete,
    Error,
    /// Stopped through a `CancellationFlag` before every tile was attempted
    Cancelled,
}

impl RegionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Cancelled)
    }
}

/// A rectangular area plus the zoom levels prefetched for it.
///
/// A region never holds tile bytes; tiles are looked up by `TileKey` and may
/// be shared with other regions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Region {
    pub id: String,
    pub name: String,
    pub bounds: Bounds,
    /// Ascending, without duplicates
    pub zoom_levels: Vec<u8>,
    pub expected_tile_count: u64,
    /// Tiles present in the store after their turn, whether fetched by this
    /// job or already cached. Below `expected_tile_count` at `Complete` means
    /// some tiles are missing.
    pub downloaded_tile_count: u64,
    /// Part of `downloaded_tile_count` that was already cached and skipped
    #[serde(default)]
    pub cached_tile_count: u64,
    /// Tiles whose fetch failed
    #[serde(default)]
    pub failed_tile_count: u64,
    /// Bytes fetched from the provider by this job
    #[serde(default)]
    pub total_size_bytes: u64,
    pub status: RegionStatus,
    pub created_at_ms: i64,
}

impl Region {
    /// Tiles attempted so far, whatever their outcome
    pub fn processed_tile_count(&self) -> u64 {
        self.downloaded_tile_count + self.failed_tile_count
    }

    /// Share of tiles attempted, in percent
    pub fn percent_complete(&self) -> f64 {
        if self.expected_tile_count == 0 {
            return 100.0;
        }
        self.processed_tile_count() as f64 / self.expected_tile_count as f64 * 100.0
    }

    /// True when the region finished and no tile is known to be missing
    pub fn is_fully_cached(&self) -> bool {
        self.status == RegionStatus::Complete
            && self.failed_tile_count == 0
            && self.processed_tile_count() == self.expected_tile_count
    }

    /// Checks whether `key` is one of the tiles this region prefetches
    pub fn covers(&self, key: &TileKey) -> bool {
        if !self.zoom_levels.contains(&key.zoom) {
            return false;
        }
        let (min_x, min_y) = tile_index(self.bounds.west, self.bounds.north, key.zoom);
        let (max_x, max_y) = tile_index(self.bounds.east, self.bounds.south, key.zoom);
        (min_x..=max_x).contains(&key.x) && (min_y..=max_y).contains(&key.y)
    }
}
