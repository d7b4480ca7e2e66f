//! Pre-download estimates for a candidate region. No I/O happens here.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::core::constants::AVERAGE_TILE_SIZE_BYTES;
use crate::core::format::format_size;
use crate::core::geo::{tile_count_in_bounds, Bounds};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeEstimate {
    pub tile_count: u64,
    pub approx_bytes: u64,
}

impl SizeEstimate {
    pub fn human_size(&self) -> String {
        format_size(self.approx_bytes)
    }
}

/// Estimate tile count and storage footprint; duplicate zoom levels count once.
pub fn estimate_region_size(bounds: &Bounds, zoom_levels: &[u8]) -> Result<SizeEstimate> {
    let zooms: BTreeSet<u8> = zoom_levels.iter().copied().collect();
    let mut tile_count = 0u64;
    for zoom in zooms {
        tile_count += tile_count_in_bounds(bounds, zoom)?;
    }
    Ok(SizeEstimate {
        tile_count,
        approx_bytes: tile_count * AVERAGE_TILE_SIZE_BYTES,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::tiles_in_bounds;
    use std::f64::consts::PI;

    fn lat_to_row(lat: f64, zoom: u8) -> u32 {
        let lat_rad = lat.to_radians();
        let n = 2_f64.powi(zoom as i32);
        ((1.0 - (lat_rad.tan() + 1.0 / lat_rad.cos()).ln() / PI) / 2.0 * n).floor() as u32
    }

    fn lon_to_column(lon: f64, zoom: u8) -> u32 {
        ((lon + 180.0) / 360.0 * 2_f64.powi(zoom as i32)).floor() as u32
    }

    #[test]
    fn test_tile_count_matches_formula() {
        let bounds = Bounds::new(40.1, 40.0, -75.0, -75.2);
        let estimate = estimate_region_size(&bounds, &[12]).unwrap();

        let columns = lon_to_column(-75.0, 12) - lon_to_column(-75.2, 12) + 1;
        let rows = lat_to_row(40.0, 12) - lat_to_row(40.1, 12) + 1;
        assert_eq!(estimate.tile_count, (columns * rows) as u64);
        assert_eq!(
            estimate.tile_count,
            tiles_in_bounds(&bounds, 12).unwrap().len() as u64
        );
        assert_eq!(estimate.approx_bytes, estimate.tile_count * 35 * 1024);
    }

    #[test]
    fn test_multiple_and_duplicate_zoom_levels() {
        let bounds = Bounds::new(40.50, 40.35, -78.00, -78.20);
        let single: u64 = [12u8, 13, 14]
            .iter()
            .map(|z| tiles_in_bounds(&bounds, *z).unwrap().len() as u64)
            .sum();
        let estimate = estimate_region_size(&bounds, &[14, 12, 13, 12]).unwrap();
        assert_eq!(estimate.tile_count, single);
    }

    #[test]
    fn test_estimate_rejects_antimeridian() {
        let bounds = Bounds::new(1.0, 0.0, -179.0, 179.0);
        assert!(estimate_region_size(&bounds, &[5]).is_err());
    }
}
