//! Core constants for geo math and the offline tile cache.
//! Keeping them in a single place makes it easier to tweak engine-wide magic numbers.

/// Mean Earth radius used by the Haversine distance, in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Latitude limit of the Web Mercator projection, in degrees.
pub const MAX_MERCATOR_LATITUDE: f64 = 85.051_128_779_8;

/// Highest zoom level the tile math accepts.
pub const MAX_ZOOM: u8 = 22;

/// Average size of one raster tile, used only for pre-download estimates.
pub const AVERAGE_TILE_SIZE_BYTES: u64 = 35 * 1024;

/// Pause between consecutive tile requests to stay inside provider quotas.
pub const DEFAULT_REQUEST_INTERVAL_MS: u64 = 100;

/// Tiles older than this are considered stale.
pub const DEFAULT_TILE_MAX_AGE_DAYS: u64 = 30;

/// Disk budget for cached tiles.
pub const DEFAULT_CACHE_MAX_BYTES: u64 = 100 * 1024 * 1024;

/// Number of decoded tiles kept in memory in front of the disk store.
pub const DEFAULT_MEMORY_TILES: usize = 256;

/// Default raster source (Mapbox outdoors, retina tiles).
pub const DEFAULT_TILE_URL_TEMPLATE: &str =
    "https://api.mapbox.com/v4/mapbox.outdoors-v12/{z}/{x}/{y}@2x.png?access_token={token}";

/// Environment variable that overrides the provider access token.
pub const ACCESS_TOKEN_ENV: &str = "FIELDMAP_ACCESS_TOKEN";
