pub mod downloader;
pub mod estimate;
pub mod presets;
pub mod region;
pub mod source;
pub mod store;

// Re-exports for convenience
pub use downloader::{CancellationFlag, RegionDownloader, RegionRequest};
pub use presets::{find_preset, PresetRegion, PRESET_REGIONS};
pub use source::{TileProvider, TileSource, UrlTemplateSource};
pub use store::{CachedTile, TileStore};
