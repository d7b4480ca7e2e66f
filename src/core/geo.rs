use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;

use crate::core::constants::{EARTH_RADIUS_METERS, MAX_MERCATOR_LATITUDE, MAX_ZOOM};
use crate::{Error, Result};

/// One timestamped GPS sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoFix {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub altitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
    pub timestamp_ms: i64,
}

impl GeoFix {
    /// Creates a fix without altitude or accuracy
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            accuracy: None,
            timestamp_ms,
        }
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    /// Validates that the coordinates are within valid ranges
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }
}

/// Calculates the great-circle distance between two fixes using the Haversine formula.
///
/// Callers must not pass NaN coordinates; every other finite input is accepted.
pub fn distance_meters(a: &GeoFix, b: &GeoFix) -> f64 {
    haversine_meters(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Haversine distance between two lat/lon pairs given in degrees.
pub fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_METERS * c
}

/// Rectangular geographic area, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub north: f64,
    pub south: f64,
    pub east: f64,
    pub west: f64,
}

impl Bounds {
    pub fn new(north: f64, south: f64, east: f64, west: f64) -> Self {
        Self {
            north,
            south,
            east,
            west,
        }
    }

    /// Rejects bounds the tile enumeration cannot represent.
    ///
    /// Boxes crossing the antimeridian (`west > east`) are not wrapped; callers
    /// have to split them into two regions.
    pub fn validate(&self) -> Result<()> {
        let values = [self.north, self.south, self.east, self.west];
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::UnsupportedBounds(format!(
                "non-finite coordinate in {self:?}"
            )));
        }
        if !(-90.0..=90.0).contains(&self.north) || !(-90.0..=90.0).contains(&self.south) {
            return Err(Error::UnsupportedBounds(format!(
                "latitude out of range in {self:?}"
            )));
        }
        if !(-180.0..=180.0).contains(&self.east) || !(-180.0..=180.0).contains(&self.west) {
            return Err(Error::UnsupportedBounds(format!(
                "longitude out of range in {self:?}"
            )));
        }
        if self.south > self.north {
            return Err(Error::UnsupportedBounds(format!(
                "south {} is above north {}",
                self.south, self.north
            )));
        }
        if self.west > self.east {
            return Err(Error::UnsupportedBounds(format!(
                "west {} is east of {}; boxes crossing the antimeridian are not supported",
                self.west, self.east
            )));
        }
        Ok(())
    }

    /// Checks if the bounds contain a point
    pub fn contains(&self, latitude: f64, longitude: f64) -> bool {
        latitude >= self.south
            && latitude <= self.north
            && longitude >= self.west
            && longitude <= self.east
    }
}

/// Identity of one slippy-map tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TileKey {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileKey {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }

    /// Creates the key of the tile containing the given position
    pub fn containing(lon: f64, lat: f64, zoom: u8) -> Self {
        let (x, y) = tile_index(lon, lat, zoom);
        Self::new(zoom, x, y)
    }

    /// Key used by the persistent tile collection, `zoom-x-y`.
    pub fn storage_key(&self) -> String {
        format!("{}-{}-{}", self.zoom, self.x, self.y)
    }

    /// Parses a `zoom-x-y` storage key.
    pub fn parse(key: &str) -> Option<Self> {
        let mut parts = key.split('-');
        let zoom = parts.next()?.parse().ok()?;
        let x = parts.next()?.parse().ok()?;
        let y = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self::new(zoom, x, y))
    }

    /// Converts the tile coordinate to its northwest corner as `(lat, lon)`
    pub fn nw_corner(&self) -> (f64, f64) {
        let n = 2_f64.powi(self.zoom as i32);
        let lon = self.x as f64 / n * 360.0 - 180.0;
        let lat = (PI * (1.0 - 2.0 * self.y as f64 / n)).sinh().atan().to_degrees();
        (lat, lon)
    }

    /// Checks if the tile is valid for its zoom level
    pub fn is_valid(&self) -> bool {
        let max_coord = 1_u64 << self.zoom;
        (self.x as u64) < max_coord && (self.y as u64) < max_coord
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Converts a position to slippy-map tile indices at `zoom`.
///
/// Latitude is clamped to the Web Mercator limit before projecting and both
/// indices are clamped to `[0, 2^zoom - 1]`, so the poles and the east edge of
/// the world map to the nearest valid tile instead of NaN or overflow.
pub fn tile_index(lon: f64, lat: f64, zoom: u8) -> (u32, u32) {
    let n = 2_f64.powi(zoom as i32);
    let max_index = n - 1.0;

    let x = ((lon + 180.0) / 360.0 * n).floor();

    let lat_rad = lat
        .clamp(-MAX_MERCATOR_LATITUDE, MAX_MERCATOR_LATITUDE)
        .to_radians();
    let y = ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor();

    (clamp_index(x, max_index), clamp_index(y, max_index))
}

fn clamp_index(value: f64, max_index: f64) -> u32 {
    if value.is_nan() {
        return 0;
    }
    value.clamp(0.0, max_index) as u32
}

/// Enumerates every tile covering `bounds` at `zoom`.
///
/// Tiles are produced column by column: for each x from west to east, every y
/// from north to south (tile y grows southwards). Collects [`tile_keys_in_bounds`].
pub fn tiles_in_bounds(bounds: &Bounds, zoom: u8) -> Result<Vec<TileKey>> {
    Ok(tile_keys_in_bounds(bounds, zoom)?.collect())
}

/// Lazy form of [`tiles_in_bounds`], same order, nothing allocated up front.
pub fn tile_keys_in_bounds(
    bounds: &Bounds,
    zoom: u8,
) -> Result<impl Iterator<Item = TileKey> + Send + 'static> {
    let ((min_x, min_y), (max_x, max_y)) = tile_range(bounds, zoom)?;
    Ok((min_x..=max_x).flat_map(move |x| (min_y..=max_y).map(move |y| TileKey::new(zoom, x, y))))
}

/// Number of tiles `tiles_in_bounds` would produce, without allocating them.
pub fn tile_count_in_bounds(bounds: &Bounds, zoom: u8) -> Result<u64> {
    let ((min_x, min_y), (max_x, max_y)) = tile_range(bounds, zoom)?;
    Ok((max_x - min_x + 1) as u64 * (max_y - min_y + 1) as u64)
}

/// Inclusive north-west and south-east tile indices of `bounds`
fn tile_range(bounds: &Bounds, zoom: u8) -> Result<((u32, u32), (u32, u32))> {
    bounds.validate()?;
    if zoom > MAX_ZOOM {
        return Err(Error::UnsupportedBounds(format!(
            "zoom {zoom} is above the maximum of {MAX_ZOOM}"
        )));
    }
    Ok((
        tile_index(bounds.west, bounds.north, zoom),
        tile_index(bounds.east, bounds.south, zoom),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_distance() {
        let nyc = GeoFix::new(40.7128, -74.0060, 0);
        let la = GeoFix::new(34.0522, -118.2437, 0);
        let distance = distance_meters(&nyc, &la);

        // Distance should be approximately 3936 km on a 6371 km sphere
        assert!((distance - 3_936_000.0).abs() < 10_000.0);
        assert_eq!(distance_meters(&nyc, &nyc), 0.0);
    }

    #[test]
    fn test_one_millidegree_of_latitude() {
        let a = GeoFix::new(40.000, -75.0, 0);
        let b = GeoFix::new(40.001, -75.0, 0);
        let expected = EARTH_RADIUS_METERS * 0.001_f64.to_radians();
        assert!((distance_meters(&a, &b) - expected).abs() < 1e-6);
    }

    #[test]
    fn test_tile_index_known_values() {
        assert_eq!(tile_index(0.0, 0.0, 0), (0, 0));
        assert_eq!(tile_index(0.0, 0.0, 1), (1, 1));
        assert_eq!(tile_index(-180.0, 85.0, 1), (0, 0));
        // Philadelphia area at zoom 12
        assert_eq!(tile_index(-75.2, 40.1, 12).0, 1192);
        assert_eq!(tile_index(-75.0, 40.1, 12).0, 1194);
    }

    #[test]
    fn test_pole_and_edge_clamping() {
        for zoom in 0..=18u8 {
            let max = (1u32 << zoom) - 1;
            for lon in [-180.0, -75.0, 0.0, 179.999, 180.0] {
                let (x_n, y_n) = tile_index(lon, 90.0, zoom);
                let (x_s, y_s) = tile_index(lon, -90.0, zoom);
                assert_eq!(y_n, 0, "north pole at zoom {zoom}");
                assert_eq!(y_s, max, "south pole at zoom {zoom}");
                assert!(x_n <= max && x_s <= max);
            }
        }
    }

    #[test]
    fn test_tiles_in_bounds_order_and_count() {
        let bounds = Bounds::new(40.1, 40.0, -75.0, -75.2);
        let tiles = tiles_in_bounds(&bounds, 12).unwrap();
        assert_eq!(
            tiles.len() as u64,
            tile_count_in_bounds(&bounds, 12).unwrap()
        );

        // Column-major: x never decreases, y restarts for each column
        for pair in tiles.windows(2) {
            assert!(pair[1].x >= pair[0].x);
            if pair[1].x == pair[0].x {
                assert_eq!(pair[1].y, pair[0].y + 1);
            }
        }
        assert!(tiles.iter().all(|t| t.zoom == 12 && t.is_valid()));
    }

    #[test]
    fn test_lazy_enumeration_of_the_whole_world() {
        let world = Bounds::new(85.0, -85.0, 180.0, -180.0);
        let count = tile_count_in_bounds(&world, MAX_ZOOM).unwrap();
        assert!(count > 1_000_000_000_000);

        let first: Vec<_> = tile_keys_in_bounds(&world, MAX_ZOOM).unwrap().take(3).collect();
        assert_eq!(first[0].x, first[2].x);
        assert_eq!(first[1].y, first[0].y + 1);
        assert!(tile_keys_in_bounds(&world, MAX_ZOOM + 1).is_err());
    }

    #[test]
    fn test_antimeridian_is_rejected() {
        let bounds = Bounds::new(10.0, -10.0, -170.0, 170.0);
        assert!(matches!(
            tiles_in_bounds(&bounds, 3),
            Err(Error::UnsupportedBounds(_))
        ));
    }

    #[test]
    fn test_inverted_and_invalid_bounds_are_rejected() {
        assert!(Bounds::new(40.0, 41.0, -75.0, -76.0).validate().is_err());
        assert!(Bounds::new(f64::NAN, 41.0, -75.0, -76.0).validate().is_err());
        assert!(Bounds::new(95.0, 41.0, -75.0, -76.0).validate().is_err());
        assert!(Bounds::new(41.0, 40.0, -75.0, -76.0).validate().is_ok());
    }

    #[test]
    fn test_storage_key_parse() {
        let key = TileKey::new(14, 4823, 6160);
        assert_eq!(key.storage_key(), "14-4823-6160");
        assert_eq!(TileKey::parse("14-4823-6160"), Some(key));
        assert_eq!(TileKey::parse("14-4823"), None);
        assert_eq!(TileKey::parse("14-4823-6160-1"), None);
        assert_eq!(key.to_string(), "14/4823/6160");
    }

    #[test]
    fn test_nw_corner_inverts_tile_index() {
        let key = TileKey::containing(-77.86, 40.79, 13);
        let (lat, lon) = key.nw_corner();
        assert!(lat >= 40.79 && lon <= -77.86);
        assert_eq!(TileKey::containing(lon + 1e-9, lat - 1e-9, 13), key);
    }
}
