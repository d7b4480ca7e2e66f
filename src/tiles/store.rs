use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use crate::core::geo::TileKey;
use crate::prelude::Arc;
use crate::storage::{Collection, DirCollection, MemoryCollection};
use crate::tiles::region::Region;
use crate::{Error, Result};

/// One cached tile image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedTile {
    pub key: TileKey,
    pub bytes: Vec<u8>,
    pub size_bytes: u64,
    pub fetched_at_ms: i64,
}

impl CachedTile {
    pub fn new(key: TileKey, bytes: Vec<u8>, fetched_at_ms: i64) -> Self {
        Self {
            key,
            size_bytes: bytes.len() as u64,
            bytes,
            fetched_at_ms,
        }
    }
}

/// Outcome of a cache pruning pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PruneSummary {
    pub removed_tiles: usize,
    pub freed_bytes: u64,
}

/// Index record kept next to every tile so pruning never decodes images
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct TileMeta {
    size_bytes: u64,
    fetched_at_ms: i64,
}

impl From<&CachedTile> for TileMeta {
    fn from(tile: &CachedTile) -> Self {
        Self {
            size_bytes: tile.size_bytes,
            fetched_at_ms: tile.fetched_at_ms,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct TileSummary {
    key: TileKey,
    size_bytes: u64,
    fetched_at_ms: i64,
}

/// Persistent tile cache plus region metadata.
///
/// Tiles, their size/age index and regions are kept in separate
/// collections. Decoded tiles are also kept in a small LRU so repeated reads
/// skip the disk.
pub struct TileStore {
    tiles: Arc<dyn Collection>,
    index: Arc<dyn Collection>,
    regions: Arc<dyn Collection>,
    memory: Option<Mutex<LruCache<TileKey, Arc<CachedTile>>>>,
}

impl TileStore {
    /// Create a store over the given collections, with `memory_tiles` tiles
    /// kept in memory (0 disables the memory layer)
    pub fn new(
        tiles: Arc<dyn Collection>,
        index: Arc<dyn Collection>,
        regions: Arc<dyn Collection>,
        memory_tiles: usize,
    ) -> Self {
        Self {
            tiles,
            index,
            regions,
            memory: NonZeroUsize::new(memory_tiles).map(|cap| Mutex::new(LruCache::new(cap))),
        }
    }

    /// Open the `tiles/`, `tile-index/` and `regions/` collections under `data_dir`
    pub async fn open(data_dir: impl AsRef<Path>, memory_tiles: usize) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let tiles = DirCollection::open(data_dir.join("tiles")).await?;
        let index = DirCollection::open(data_dir.join("tile-index")).await?;
        let regions = DirCollection::open(data_dir.join("regions")).await?;
        Ok(Self::new(
            Arc::new(tiles),
            Arc::new(index),
            Arc::new(regions),
            memory_tiles,
        ))
    }

    /// Volatile store, mostly for tests
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(MemoryCollection::new()),
            Arc::new(MemoryCollection::new()),
            Arc::new(MemoryCollection::new()),
            64,
        )
    }

    fn remember(&self, tile: Arc<CachedTile>) {
        if let Some(memory) = &self.memory {
            if let Ok(mut cache) = memory.lock() {
                cache.put(tile.key, tile);
            }
        }
    }

    fn recall(&self, key: &TileKey) -> Option<Arc<CachedTile>> {
        self.memory.as_ref()?.lock().ok()?.get(key).cloned()
    }

    fn forget(&self, key: &TileKey) {
        if let Some(memory) = &self.memory {
            if let Ok(mut cache) = memory.lock() {
                cache.pop(key);
            }
        }
    }

    fn forget_all(&self) {
        if let Some(memory) = &self.memory {
            if let Ok(mut cache) = memory.lock() {
                cache.clear();
            }
        }
    }

    /// Get a tile from the cache
    pub async fn get(&self, key: &TileKey) -> Result<Option<Arc<CachedTile>>> {
        if let Some(tile) = self.recall(key) {
            return Ok(Some(tile));
        }
        let Some(bytes) = self.tiles.get(&key.storage_key()).await? else {
            return Ok(None);
        };
        let tile: Arc<CachedTile> = Arc::new(bincode::deserialize(&bytes)?);
        self.remember(Arc::clone(&tile));
        Ok(Some(tile))
    }

    /// Check if a tile is cached without decoding it
    pub async fn contains(&self, key: &TileKey) -> Result<bool> {
        if self.recall(key).is_some() {
            return Ok(true);
        }
        self.tiles.contains(&key.storage_key()).await
    }

    /// Insert or replace a tile. Re-writing an existing tile is harmless.
    pub async fn put(&self, tile: CachedTile) -> Result<()> {
        let storage_key = tile.key.storage_key();
        let encoded = bincode::serialize(&tile)?;
        let meta = bincode::serialize(&TileMeta::from(&tile))?;
        // A tile without an index entry is still counted, a stale entry is not
        self.index.delete(&storage_key).await?;
        self.tiles.put(&storage_key, encoded).await?;
        self.index.put(&storage_key, meta).await?;
        self.remember(Arc::new(tile));
        Ok(())
    }

    /// Remove a tile; missing tiles are ignored
    pub async fn delete(&self, key: &TileKey) -> Result<()> {
        self.forget(key);
        let storage_key = key.storage_key();
        self.tiles.delete(&storage_key).await?;
        self.index.delete(&storage_key).await
    }

    /// Remove every tile, keeping region metadata
    pub async fn clear(&self) -> Result<()> {
        self.forget_all();
        self.tiles.clear().await?;
        self.index.clear().await
    }

    /// Remove every tile and every region record
    pub async fn clear_all(&self) -> Result<()> {
        self.clear().await?;
        self.regions.clear().await
    }

    /// Keys of every cached tile, sorted
    pub async fn keys(&self) -> Result<Vec<TileKey>> {
        let mut keys: Vec<TileKey> = self
            .tiles
            .keys()
            .await?
            .iter()
            .filter_map(|key| TileKey::parse(key))
            .collect();
        keys.sort();
        Ok(keys)
    }

    /// Number of cached tiles
    pub async fn len(&self) -> Result<usize> {
        Ok(self.tiles.keys().await?.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Sum of the sizes of all cached tiles
    pub async fn total_size_bytes(&self) -> Result<u64> {
        Ok(self.summaries().await?.iter().map(|t| t.size_bytes).sum())
    }

    async fn summaries(&self) -> Result<Vec<TileSummary>> {
        let mut summaries = Vec::new();
        for key in self.keys().await? {
            if let Some(meta) = self.meta(&key).await? {
                summaries.push(TileSummary {
                    key,
                    size_bytes: meta.size_bytes,
                    fetched_at_ms: meta.fetched_at_ms,
                });
            }
        }
        Ok(summaries)
    }

    /// Size and age of a tile, rebuilding a missing index entry from the tile
    async fn meta(&self, key: &TileKey) -> Result<Option<TileMeta>> {
        let storage_key = key.storage_key();
        if let Some(bytes) = self.index.get(&storage_key).await? {
            return Ok(Some(bincode::deserialize(&bytes)?));
        }
        // Another task may delete the tile between listing and reading.
        // Read past the memory layer so a full scan does not flush it.
        let Some(bytes) = self.tiles.get(&storage_key).await? else {
            return Ok(None);
        };
        let tile: CachedTile = bincode::deserialize(&bytes)?;
        let meta = TileMeta::from(&tile);
        if let Err(e) = self.index.put(&storage_key, bincode::serialize(&meta)?).await {
            log::debug!("cannot index tile {}: {}", key, e);
        }
        Ok(Some(meta))
    }

    /// Drop tiles fetched more than `max_age` before `now_ms`
    pub async fn clear_expired(&self, max_age: Duration, now_ms: i64) -> Result<PruneSummary> {
        let max_age_ms = i64::try_from(max_age.as_millis()).unwrap_or(i64::MAX);
        let cutoff = now_ms.saturating_sub(max_age_ms);

        let mut summary = PruneSummary::default();
        for tile in self.summaries().await? {
            if tile.fetched_at_ms < cutoff {
                self.delete(&tile.key).await?;
                summary.removed_tiles += 1;
                summary.freed_bytes += tile.size_bytes;
            }
        }
        if summary.removed_tiles > 0 {
            log::info!(
                "removed {} expired tiles ({} bytes)",
                summary.removed_tiles,
                summary.freed_bytes
            );
        }
        Ok(summary)
    }

    /// Evict the oldest tiles until the cache fits in `max_bytes`
    pub async fn evict_to_budget(&self, max_bytes: u64) -> Result<PruneSummary> {
        let mut tiles = self.summaries().await?;
        let mut total: u64 = tiles.iter().map(|t| t.size_bytes).sum();
        let mut summary = PruneSummary::default();
        if total <= max_bytes {
            return Ok(summary);
        }

        tiles.sort_by_key(|t| (t.fetched_at_ms, t.key));
        for tile in tiles {
            if total <= max_bytes {
                break;
            }
            self.delete(&tile.key).await?;
            total -= tile.size_bytes;
            summary.removed_tiles += 1;
            summary.freed_bytes += tile.size_bytes;
        }
        log::info!(
            "evicted {} tiles ({} bytes) to fit a budget of {} bytes",
            summary.removed_tiles,
            summary.freed_bytes,
            max_bytes
        );
        Ok(summary)
    }

    /// Get region metadata by id
    pub async fn get_region(&self, id: &str) -> Result<Option<Region>> {
        match self.regions.get(id).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Insert or replace region metadata
    pub async fn put_region(&self, region: &Region) -> Result<()> {
        let encoded = serde_json::to_vec_pretty(region)?;
        self.regions.put(&region.id, encoded).await
    }

    /// Remove region metadata only; tiles are untouched
    pub async fn delete_region_metadata(&self, id: &str) -> Result<()> {
        self.regions.delete(id).await
    }

    /// Every region, oldest first
    pub async fn list_regions(&self) -> Result<Vec<Region>> {
        let mut regions = Vec::new();
        for id in self.regions.keys().await? {
            match self.get_region(&id).await? {
                Some(region) => regions.push(region),
                None => log::debug!("region {} vanished while listing", id),
            }
        }
        regions.sort_by(|a, b| {
            a.created_at_ms
                .cmp(&b.created_at_ms)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(regions)
    }

    /// Fails with `NotFound` when the region does not exist
    pub async fn require_region(&self, id: &str) -> Result<Region> {
        self.get_region(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("region {id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::Bounds;
    use crate::tiles::region::RegionStatus;

    fn tile(zoom: u8, x: u32, y: u32, size: usize, fetched_at_ms: i64) -> CachedTile {
        CachedTile::new(TileKey::new(zoom, x, y), vec![0xAB; size], fetched_at_ms)
    }

    fn region(id: &str, created_at_ms: i64) -> Region {
        Region {
            id: id.to_string(),
            name: format!("region {id}"),
            bounds: Bounds::new(40.1, 40.0, -75.0, -75.2),
            zoom_levels: vec![12],
            expected_tile_count: 6,
            downloaded_tile_count: 0,
            cached_tile_count: 0,
            failed_tile_count: 0,
            total_size_bytes: 0,
            status: RegionStatus::Pending,
            created_at_ms,
        }
    }

    #[tokio::test]
    async fn test_tile_store_basic_operations() {
        let store = TileStore::in_memory();
        assert!(store.is_empty().await.unwrap());

        store.put(tile(12, 1, 2, 10, 1_000)).await.unwrap();
        store.put(tile(12, 1, 3, 20, 2_000)).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 2);
        assert_eq!(store.total_size_bytes().await.unwrap(), 30);

        let fetched = store.get(&TileKey::new(12, 1, 2)).await.unwrap().unwrap();
        assert_eq!(fetched.size_bytes, 10);
        assert_eq!(fetched.bytes, vec![0xAB; 10]);

        store.delete(&TileKey::new(12, 1, 2)).await.unwrap();
        assert!(!store.contains(&TileKey::new(12, 1, 2)).await.unwrap());
        assert!(store.get(&TileKey::new(12, 1, 2)).await.unwrap().is_none());

        store.clear().await.unwrap();
        assert_eq!(store.total_size_bytes().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_tiles_survive_without_memory_layer() {
        let dir = tempfile::tempdir().unwrap();
        let store = TileStore::open(dir.path(), 0).await.unwrap();
        store.put(tile(3, 2, 1, 5, 7)).await.unwrap();
        drop(store);

        let reopened = TileStore::open(dir.path(), 0).await.unwrap();
        let loaded = reopened.get(&TileKey::new(3, 2, 1)).await.unwrap().unwrap();
        assert_eq!(loaded.fetched_at_ms, 7);
        assert_eq!(reopened.keys().await.unwrap(), vec![TileKey::new(3, 2, 1)]);
    }

    #[tokio::test]
    async fn test_size_queries_use_the_index() {
        let tiles = Arc::new(MemoryCollection::new());
        let index = Arc::new(MemoryCollection::new());
        let store = TileStore::new(
            tiles.clone(),
            index.clone(),
            Arc::new(MemoryCollection::new()),
            0,
        );
        store.put(tile(12, 1, 2, 10, 1_000)).await.unwrap();
        store.put(tile(12, 1, 3, 20, 2_000)).await.unwrap();

        // Image records are not decoded for a size query
        tiles.put("12-1-2", vec![0xFF]).await.unwrap();
        tiles.put("12-1-3", vec![0xFF]).await.unwrap();
        assert_eq!(store.total_size_bytes().await.unwrap(), 30);

        // A tile written without an index entry is counted and indexed
        let legacy = tile(12, 1, 4, 5, 3_000);
        tiles
            .put("12-1-4", bincode::serialize(&legacy).unwrap())
            .await
            .unwrap();
        assert_eq!(store.total_size_bytes().await.unwrap(), 35);
        assert!(index.contains("12-1-4").await.unwrap());

        store.delete(&TileKey::new(12, 1, 4)).await.unwrap();
        assert!(!index.contains("12-1-4").await.unwrap());
        store.clear().await.unwrap();
        assert!(index.is_empty());
    }

    #[tokio::test]
    async fn test_clear_expired() {
        let store = TileStore::in_memory();
        let day_ms = 24 * 60 * 60 * 1000;
        store.put(tile(10, 0, 0, 4, 0)).await.unwrap();
        store.put(tile(10, 0, 1, 4, 40 * day_ms)).await.unwrap();

        let summary = store
            .clear_expired(Duration::from_secs(30 * 24 * 60 * 60), 45 * day_ms)
            .await
            .unwrap();
        assert_eq!(summary.removed_tiles, 1);
        assert_eq!(summary.freed_bytes, 4);
        assert_eq!(store.keys().await.unwrap(), vec![TileKey::new(10, 0, 1)]);
    }

    #[tokio::test]
    async fn test_evict_to_budget_removes_oldest_first() {
        let store = TileStore::in_memory();
        store.put(tile(10, 0, 0, 100, 3)).await.unwrap();
        store.put(tile(10, 0, 1, 100, 1)).await.unwrap();
        store.put(tile(10, 0, 2, 100, 2)).await.unwrap();

        let summary = store.evict_to_budget(150).await.unwrap();
        assert_eq!(summary.removed_tiles, 2);
        assert_eq!(store.keys().await.unwrap(), vec![TileKey::new(10, 0, 0)]);

        let untouched = store.evict_to_budget(1_000).await.unwrap();
        assert_eq!(untouched, PruneSummary::default());
    }

    #[tokio::test]
    async fn test_region_metadata_is_separate_from_tiles() {
        let store = TileStore::in_memory();
        store.put_region(&region("b", 20)).await.unwrap();
        store.put_region(&region("a", 10)).await.unwrap();
        store.put(tile(12, 1192, 1551, 8, 0)).await.unwrap();

        let ids: Vec<_> = store
            .list_regions()
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

        store.clear().await.unwrap();
        assert_eq!(store.list_regions().await.unwrap().len(), 2);

        store.delete_region_metadata("a").await.unwrap();
        assert!(store.get_region("a").await.unwrap().is_none());
        assert!(matches!(
            store.require_region("a").await,
            Err(Error::NotFound(_))
        ));

        store.clear_all().await.unwrap();
        assert!(store.list_regions().await.unwrap().is_empty());
    }
}
