//! # fieldmap
//!
//! Offline field data for map-based field work.
//!
//! The crate has two halves that share a small amount of geo math:
//! a GPS track recorder that turns a push-based location stream into an
//! ordered [`Track`] with waypoints, statistics and GPX export, and a
//! slippy-map tile cache that prefetches, persists and evicts the imagery for
//! a chosen region so the map keeps working without a network connection.

pub mod core;
pub mod prelude;
pub mod storage;
pub mod tiles;
pub mod tracking;
pub use crate::core::constants;

// Re-export public API
pub use core::{
    clock::{Clock, ManualClock, SystemClock},
    config::FieldConfig,
    geo::{distance_meters, tile_index, tile_keys_in_bounds, tiles_in_bounds, Bounds, GeoFix, TileKey},
};

pub use tiles::{
    downloader::{CancellationFlag, RegionDownloader, RegionRequest},
    estimate::{estimate_region_size, SizeEstimate},
    presets::{find_preset, PresetRegion},
    region::{Region, RegionStatus},
    source::{TileProvider, TileSource, UrlTemplateSource},
    store::{CachedTile, TileStore},
};

#[cfg(feature = "http")]
pub use tiles::source::HttpTileProvider;

pub use tracking::{
    gpx::{export_gpx, gpx_file_name},
    location::{LocationSource, LocationSubscription, SimulatedLocationSource},
    recorder::{RecorderStatus, TrackRecorder, UpdateCallback},
    stats::TrackStats,
    store::TrackStore,
    types::{NewWaypoint, Track, Waypoint, WaypointCategory},
};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, Error>;

/// Common error types
#[derive(Debug, thiserror::Error)]
pub enum FieldError {
    #[error("a track is already being recorded")]
    AlreadyTracking,

    #[error("no track is being recorded")]
    NoActiveTrack,

    #[error("location unavailable: {0}")]
    LocationUnavailable(String),

    #[error("location permission denied")]
    PermissionDenied,

    #[error("failed to fetch tile {key}: {reason}")]
    TileFetch { key: TileKey, reason: String },

    #[error("region setup failed: {0}")]
    RegionSetup(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    #[cfg(feature = "http")]
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("unsupported bounds: {0}")]
    UnsupportedBounds(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("configuration error: {0}")]
    Config(String),
}

/// Error type alias for convenience
pub type Error = FieldError;
