//! Prelude module for common fieldmap types and traits
//!
//! This module re-exports the most commonly used types, traits, and functions
//! for easy importing with `use fieldmap::prelude::*;`

pub use crate::core::{
    clock::{Clock, ManualClock, SystemClock},
    config::{CacheConfig, DownloaderConfig, FieldConfig, ProviderConfig, StorageConfig},
    format::{format_distance, format_duration, format_size, format_speed},
    geo::{distance_meters, tile_index, tile_keys_in_bounds, tiles_in_bounds, Bounds, GeoFix, TileKey},
};

pub use crate::storage::{Collection, DirCollection, MemoryCollection};

pub use crate::tiles::{
    downloader::{CancellationFlag, RegionDownloader, RegionRequest},
    estimate::{estimate_region_size, SizeEstimate},
    presets::{find_preset, PresetRegion, PRESET_REGIONS},
    region::{Region, RegionStatus},
    source::{TileProvider, TileSource, UrlTemplateSource},
    store::{CachedTile, TileStore},
};

#[cfg(feature = "http")]
pub use crate::tiles::source::HttpTileProvider;

pub use crate::tracking::{
    gpx::{export_gpx, gpx_file_name},
    location::{LocationSource, LocationSubscription, SimulatedLocationSource},
    recorder::{RecorderStatus, TrackRecorder, UpdateCallback},
    stats::TrackStats,
    store::TrackStore,
    types::{NewWaypoint, Track, Waypoint, WaypointCategory},
};

pub use crate::{Error as FieldError, Result};

pub use std::{sync::Arc, time::Duration};

pub use fxhash::{FxHashMap as HashMap, FxHashSet as HashSet};
