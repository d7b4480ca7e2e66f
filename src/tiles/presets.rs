//! Built-in regions offered for one-tap download.

use crate::core::geo::Bounds;
use crate::tiles::downloader::RegionRequest;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PresetRegion {
    pub id: &'static str,
    pub name: &'static str,
    pub bounds: Bounds,
    pub min_zoom: u8,
    pub max_zoom: u8,
}

impl PresetRegion {
    pub fn zoom_levels(&self) -> Vec<u8> {
        (self.min_zoom..=self.max_zoom).collect()
    }

    pub fn to_request(&self) -> RegionRequest {
        RegionRequest::new(self.name, self.bounds, self.zoom_levels())
    }
}

const fn preset(
    id: &'static str,
    name: &'static str,
    bounds: (f64, f64, f64, f64),
    zooms: (u8, u8),
) -> PresetRegion {
    PresetRegion {
        id,
        name,
        bounds: Bounds {
            north: bounds.0,
            south: bounds.1,
            east: bounds.2,
            west: bounds.3,
        },
        min_zoom: zooms.0,
        max_zoom: zooms.1,
    }
}

/// Pennsylvania fishing waters
pub const PRESET_REGIONS: &[PresetRegion] = &[
    preset("raystown-lake", "Raystown Lake", (40.50, 40.35, -78.00, -78.20), (12, 15)),
    preset("spring-creek", "Spring Creek", (40.85, 40.75, -77.80, -77.95), (12, 15)),
    preset("lake-erie", "Lake Erie (Presque Isle)", (42.20, 42.05, -80.00, -80.15), (11, 14)),
    preset("penns-creek", "Penns Creek", (40.90, 40.80, -77.35, -77.50), (12, 15)),
    preset("little-lehigh", "Little Lehigh Creek", (40.65, 40.55, -75.45, -75.60), (12, 15)),
];

pub fn find_preset(id: &str) -> Option<&'static PresetRegion> {
    PRESET_REGIONS.iter().find(|preset| preset.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tiles::estimate::estimate_region_size;

    #[test]
    fn test_presets_are_valid_regions() {
        for preset in PRESET_REGIONS {
            assert!(preset.bounds.validate().is_ok(), "{}", preset.id);
            let request = preset.to_request();
            let estimate = estimate_region_size(&request.bounds, &request.zoom_levels).unwrap();
            assert!(estimate.tile_count > 0);
        }
    }

    #[test]
    fn test_find_preset() {
        let erie = find_preset("lake-erie").unwrap();
        assert_eq!(erie.zoom_levels(), vec![11, 12, 13, 14]);
        assert!(find_preset("susquehanna").is_none());
    }
}
