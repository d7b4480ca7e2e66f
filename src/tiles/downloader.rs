//! Region prefetching.
//!
//! A download walks every tile of a region in enumeration order (ascending
//! zoom, then column by column), skips tiles that are already cached, fetches
//! the rest from the [`TileProvider`] and writes them through to the
//! [`TileStore`]. Individual tile failures are logged and counted but never
//! abort the job.

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::core::clock::{next_record_id, Clock, SystemClock};
use crate::core::config::DownloaderConfig;
use crate::core::geo::{tile_count_in_bounds, tile_keys_in_bounds, Bounds, TileKey};
use crate::prelude::Arc;
use crate::tiles::estimate::{estimate_region_size, SizeEstimate};
use crate::tiles::region::{Region, RegionStatus};
use crate::tiles::source::TileProvider;
use crate::tiles::store::{CachedTile, TileStore};
use crate::{Error, Result};

/// What the caller asks to prefetch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionRequest {
    pub name: String,
    pub bounds: Bounds,
    pub zoom_levels: Vec<u8>,
}

impl RegionRequest {
    pub fn new(name: impl Into<String>, bounds: Bounds, zoom_levels: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bounds,
            zoom_levels,
        }
    }

    /// Zoom levels ascending, without duplicates
    pub fn normalized_zoom_levels(&self) -> Vec<u8> {
        self.zoom_levels
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Cooperative cancellation, checked between tiles.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

enum TileOutcome {
    Cached,
    Fetched { size_bytes: u64 },
    Failed(Error),
    /// Writing the tile (or checking for it) failed; this aborts the job
    StorageFailed(Error),
    Skipped,
}

/// Downloads regions into a [`TileStore`] and owns their lifecycle state.
pub struct RegionDownloader {
    store: Arc<TileStore>,
    provider: Arc<dyn TileProvider>,
    config: DownloaderConfig,
    clock: Arc<dyn Clock>,
}

impl RegionDownloader {
    pub fn new(
        store: Arc<TileStore>,
        provider: Arc<dyn TileProvider>,
        config: DownloaderConfig,
    ) -> Self {
        Self {
            store,
            provider,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<TileStore> {
        &self.store
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    /// Pre-flight estimate for a candidate region
    pub fn estimate_region_size(&self, bounds: &Bounds, zoom_levels: &[u8]) -> Result<SizeEstimate> {
        estimate_region_size(bounds, zoom_levels)
    }

    /// Download a region without progress reporting or cancellation
    pub async fn download_region(&self, request: RegionRequest) -> Result<Region> {
        self.download_region_with(request, |_, _| {}, &CancellationFlag::new())
            .await
    }

    /// Download a region, reporting `(percent, region)` after every tile.
    ///
    /// Invalid bounds are rejected before anything is persisted. The returned
    /// region is `Complete` once every tile was attempted, even if some
    /// fetches failed (see `failed_tile_count`), or `Cancelled` when `cancel`
    /// was set part way through.
    pub async fn download_region_with<F>(
        &self,
        request: RegionRequest,
        mut on_progress: F,
        cancel: &CancellationFlag,
    ) -> Result<Region>
    where
        F: FnMut(f64, &Region) + Send,
    {
        let zoom_levels = request.normalized_zoom_levels();
        let mut expected_tile_count = 0u64;
        let mut layers = Vec::with_capacity(zoom_levels.len());
        for zoom in &zoom_levels {
            expected_tile_count += tile_count_in_bounds(&request.bounds, *zoom)?;
            layers.push(tile_keys_in_bounds(&request.bounds, *zoom)?);
        }
        // Keys are produced on demand and no new ones once cancelled
        let tiles = layers
            .into_iter()
            .flatten()
            .take_while(|_| !cancel.is_cancelled());

        let mut region = Region {
            id: next_record_id(self.clock.as_ref()),
            name: request.name,
            bounds: request.bounds,
            zoom_levels,
            expected_tile_count: 0,
            downloaded_tile_count: 0,
            cached_tile_count: 0,
            failed_tile_count: 0,
            total_size_bytes: 0,
            status: RegionStatus::Pending,
            created_at_ms: self.clock.now_ms(),
        };
        self.store
            .put_region(&region)
            .await
            .map_err(|e| Error::RegionSetup(format!("cannot persist region: {e}")))?;

        region.status = RegionStatus::Downloading;
        region.expected_tile_count = expected_tile_count;
        if let Err(e) = self.store.put_region(&region).await {
            self.mark_error(&mut region).await;
            return Err(Error::RegionSetup(format!("cannot start region download: {e}")));
        }
        log::info!(
            "downloading region {} ({}): {} tiles at zoom {:?}",
            region.id,
            region.name,
            region.expected_tile_count,
            region.zoom_levels
        );

        let concurrency = self.config.max_concurrent.max(1);
        let mut outcomes = stream::iter(tiles)
            .map(|key| async move { (key, self.process_tile(key, cancel).await) })
            .buffered(concurrency);

        while let Some((key, outcome)) = outcomes.next().await {
            match outcome {
                TileOutcome::Cached => {
                    region.downloaded_tile_count += 1;
                    region.cached_tile_count += 1;
                }
                TileOutcome::Fetched { size_bytes } => {
                    region.downloaded_tile_count += 1;
                    region.total_size_bytes += size_bytes;
                }
                TileOutcome::Failed(e) => {
                    log::warn!("skipping tile {}: {}", key, e);
                    region.failed_tile_count += 1;
                }
                TileOutcome::StorageFailed(e) => {
                    log::error!("storage failure at tile {}: {}", key, e);
                    self.mark_error(&mut region).await;
                    return Err(e);
                }
                TileOutcome::Skipped => continue,
            }

            if let Err(e) = self.store.put_region(&region).await {
                self.mark_error(&mut region).await;
                return Err(e);
            }
            on_progress(region.percent_complete(), &region);
        }
        drop(outcomes);

        region.status = if region.processed_tile_count() < region.expected_tile_count
            && cancel.is_cancelled()
        {
            RegionStatus::Cancelled
        } else {
            RegionStatus::Complete
        };
        self.store.put_region(&region).await?;

        if region.failed_tile_count > 0 {
            log::warn!(
                "region {} finished {:?} with {} of {} tiles missing",
                region.id,
                region.status,
                region.failed_tile_count,
                region.expected_tile_count
            );
        } else {
            log::info!(
                "region {} finished {:?}: {} fetched, {} already cached",
                region.id,
                region.status,
                region.downloaded_tile_count - region.cached_tile_count,
                region.cached_tile_count
            );
        }
        Ok(region)
    }

    async fn mark_error(&self, region: &mut Region) {
        region.status = RegionStatus::Error;
        if let Err(e) = self.store.put_region(region).await {
            log::error!("cannot record error state of region {}: {}", region.id, e);
        }
    }

    async fn process_tile(&self, key: TileKey, cancel: &CancellationFlag) -> TileOutcome {
        if cancel.is_cancelled() {
            return TileOutcome::Skipped;
        }
        match self.store.contains(&key).await {
            Ok(true) => return TileOutcome::Cached,
            Ok(false) => {}
            Err(e) => return TileOutcome::StorageFailed(e),
        }

        let outcome = match self.fetch_with_retry(key).await {
            Ok(bytes) => {
                let tile = CachedTile::new(key, bytes, self.clock.now_ms());
                let size_bytes = tile.size_bytes;
                match self.store.put(tile).await {
                    Ok(()) => TileOutcome::Fetched { size_bytes },
                    Err(e) => TileOutcome::StorageFailed(e),
                }
            }
            Err(e) => TileOutcome::Failed(e),
        };

        let interval = self.config.request_interval();
        if !interval.is_zero() {
            tokio::time::sleep(interval).await;
        }
        outcome
    }

    async fn fetch_with_retry(&self, key: TileKey) -> Result<Vec<u8>> {
        let mut attempt = 0;
        loop {
            match self.provider.fetch(key).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt < self.config.max_retries => {
                    attempt += 1;
                    let delay = self.config.retry_delay(attempt);
                    log::debug!(
                        "tile {} failed ({}), retry {} in {:?}",
                        key,
                        e,
                        attempt,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Return a cached tile, fetching and storing it first if needed
    pub async fn get_or_fetch_tile(&self, key: TileKey) -> Result<Arc<CachedTile>> {
        if let Some(tile) = self.store.get(&key).await? {
            return Ok(tile);
        }
        let bytes = self.fetch_with_retry(key).await?;
        let tile = CachedTile::new(key, bytes, self.clock.now_ms());
        self.store.put(tile.clone()).await?;
        Ok(Arc::new(tile))
    }

    /// Delete a region and the tiles only it references.
    ///
    /// Only cached tiles are visited, so the cost follows the cache size and
    /// not the region size. Tiles that another remaining region still covers
    /// are kept. Unknown ids are ignored. Returns the number of tiles removed.
    pub async fn delete_region(&self, id: &str) -> Result<usize> {
        let Some(region) = self.store.get_region(id).await? else {
            log::debug!("delete of unknown region {} ignored", id);
            return Ok(0);
        };
        self.store.delete_region_metadata(id).await?;

        let others = self.store.list_regions().await?;
        let mut removed = 0;
        for key in self.store.keys().await? {
            if !region.covers(&key) || others.iter().any(|other| other.covers(&key)) {
                continue;
            }
            self.store.delete(&key).await?;
            removed += 1;
        }
        log::info!(
            "deleted region {} ({}) and {} unshared tiles",
            region.id,
            region.name,
            removed
        );
        Ok(removed)
    }
}
