use async_trait::async_trait;
use fieldmap::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Region prefetching against an on-disk store and a counting fake provider
#[cfg(test)]
mod region_tests {
    use super::*;

    #[derive(Default)]
    struct CountingProvider {
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl TileProvider for CountingProvider {
        async fn fetch(&self, key: TileKey) -> fieldmap::Result<Vec<u8>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(vec![key.zoom; 100 + key.x as usize % 50])
        }
    }

    async fn setup(dir: &std::path::Path) -> (RegionDownloader, Arc<CountingProvider>) {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = Arc::new(TileStore::open(dir, 16).await.unwrap());
        let provider = Arc::new(CountingProvider::default());
        let downloader =
            RegionDownloader::new(store, provider.clone(), DownloaderConfig::for_testing())
                .with_clock(Arc::new(ManualClock::new(1_700_000_000_000)));
        (downloader, provider)
    }

    fn spring_creek() -> RegionRequest {
        RegionRequest::new("Spring Creek", Bounds::new(40.85, 40.75, -77.80, -77.95), vec![12, 13])
    }

    /// A second download of the same area is served entirely from the cache
    #[tokio::test]
    async fn test_redownload_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let (downloader, provider) = setup(dir.path()).await;

        let first = downloader.download_region(spring_creek()).await.unwrap();
        let fetched = provider.fetches.load(Ordering::SeqCst);
        assert_eq!(fetched as u64, first.expected_tile_count);
        assert_eq!(first.cached_tile_count, 0);

        let second = downloader.download_region(spring_creek()).await.unwrap();
        assert_eq!(provider.fetches.load(Ordering::SeqCst), fetched);
        assert_eq!(second.status, RegionStatus::Complete);
        assert_eq!(second.downloaded_tile_count, second.expected_tile_count);
        assert_eq!(second.cached_tile_count, second.expected_tile_count);
        assert_eq!(second.total_size_bytes, 0);
        assert_ne!(first.id, second.id);

        let estimate = estimate_region_size(&spring_creek().bounds, &[12, 13]).unwrap();
        assert_eq!(estimate.tile_count, first.expected_tile_count);
        assert_eq!(
            downloader.store().len().await.unwrap() as u64,
            estimate.tile_count
        );
    }

    /// Regions and tiles are readable from a fresh store over the same directory
    #[tokio::test]
    async fn test_region_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let region = {
            let (downloader, _) = setup(dir.path()).await;
            downloader.download_region(spring_creek()).await.unwrap()
        };

        let store = TileStore::open(dir.path(), 0).await.unwrap();
        let regions = store.list_regions().await.unwrap();
        assert_eq!(regions, vec![region.clone()]);

        let key = tiles_in_bounds(&region.bounds, 13).unwrap()[0];
        let tile = store.get(&key).await.unwrap().unwrap();
        assert_eq!(tile.key, key);
        assert_eq!(tile.fetched_at_ms, 1_700_000_000_000);
        assert_eq!(
            store.total_size_bytes().await.unwrap(),
            region.total_size_bytes
        );
    }

    /// Deleting a region keeps tiles another region still needs
    #[tokio::test]
    async fn test_delete_region_keeps_shared_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let (downloader, _) = setup(dir.path()).await;

        let wide = downloader.download_region(spring_creek()).await.unwrap();
        let narrow = downloader
            .download_region(RegionRequest::new(
                "Fisherman's Paradise",
                Bounds::new(40.82, 40.78, -77.85, -77.90),
                vec![13],
            ))
            .await
            .unwrap();
        let shared = tiles_in_bounds(&narrow.bounds, 13).unwrap();

        let removed = downloader.delete_region(&wide.id).await.unwrap();
        assert_eq!(
            removed as u64,
            wide.expected_tile_count - shared.len() as u64
        );
        for key in &shared {
            assert!(downloader.store().contains(key).await.unwrap());
        }
        assert_eq!(downloader.store().get_region(&wide.id).await.unwrap(), None);

        let removed = downloader.delete_region(&narrow.id).await.unwrap();
        assert_eq!(removed, shared.len());
        assert!(downloader.store().is_empty().await.unwrap());

        assert_eq!(downloader.delete_region("missing").await.unwrap(), 0);
    }

    /// Expired tiles are pruned and a byte budget is enforced oldest first
    #[tokio::test]
    async fn test_cache_pruning() {
        let store = TileStore::in_memory();
        let day_ms = 24 * 60 * 60 * 1000;
        for i in 0..10u32 {
            let tile = CachedTile::new(TileKey::new(14, 4500 + i, 6100), vec![0; 1000], i as i64 * day_ms);
            store.put(tile).await.unwrap();
        }

        let now = 35 * day_ms;
        let expired = store
            .clear_expired(Duration::from_secs(30 * 24 * 60 * 60), now)
            .await
            .unwrap();
        assert_eq!(expired.removed_tiles, 5);
        assert_eq!(store.len().await.unwrap(), 5);

        let evicted = store.evict_to_budget(2_500).await.unwrap();
        assert_eq!(evicted.removed_tiles, 3);
        assert_eq!(evicted.freed_bytes, 3_000);
        assert!(store.contains(&TileKey::new(14, 4509, 6100)).await.unwrap());
        assert!(!store.contains(&TileKey::new(14, 4505, 6100)).await.unwrap());
    }
}
