use crate::core::geo::{distance_meters, GeoFix};

/// Running track statistics.
///
/// Pushing fixes one at a time yields bit-for-bit the same values as
/// [`TrackStats::from_fixes`] over the whole sequence, because both add the
/// same per-segment terms in the same order.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TrackStats {
    fix_count: usize,
    first: Option<GeoFix>,
    last: Option<GeoFix>,
    distance_meters: f64,
    elevation_gain_meters: f64,
    elevation_loss_meters: f64,
}

impl TrackStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixes(fixes: &[GeoFix]) -> Self {
        let mut stats = Self::new();
        for fix in fixes {
            stats.push(fix);
        }
        stats
    }

    /// Account for one more fix at the end of the track
    pub fn push(&mut self, fix: &GeoFix) {
        if let Some(prev) = self.last {
            self.distance_meters += distance_meters(&prev, fix);
            if let (Some(from), Some(to)) = (prev.altitude, fix.altitude) {
                let delta = to - from;
                if delta > 0.0 {
                    self.elevation_gain_meters += delta;
                } else {
                    self.elevation_loss_meters += -delta;
                }
            }
        } else {
            self.first = Some(*fix);
        }
        self.last = Some(*fix);
        self.fix_count += 1;
    }

    pub fn fix_count(&self) -> usize {
        self.fix_count
    }

    pub fn distance_meters(&self) -> f64 {
        self.distance_meters
    }

    pub fn elevation_gain_meters(&self) -> f64 {
        self.elevation_gain_meters
    }

    pub fn elevation_loss_meters(&self) -> f64 {
        self.elevation_loss_meters
    }

    /// Distance over the time between first and last fix; 0 when that span is not positive
    pub fn avg_speed_mps(&self) -> f64 {
        match (self.first, self.last) {
            (Some(first), Some(last)) => {
                let seconds = (last.timestamp_ms - first.timestamp_ms) as f64 / 1000.0;
                if seconds > 0.0 {
                    self.distance_meters / seconds
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn walk() -> Vec<GeoFix> {
        let mut fixes = Vec::new();
        for i in 0..200 {
            let t = i as f64;
            let fix = GeoFix::new(40.0 + (t * 0.37).sin() * 0.002, -75.0 + t * 0.0001, i * 5_000);
            let fix = if i % 7 == 3 {
                fix
            } else {
                fix.with_altitude(300.0 + (t * 0.21).cos() * 12.5)
            };
            fixes.push(fix);
        }
        fixes
    }

    #[test]
    fn test_incremental_equals_recompute() {
        let fixes = walk();
        let mut running = TrackStats::new();
        for (i, fix) in fixes.iter().enumerate() {
            running.push(fix);
            let fresh = TrackStats::from_fixes(&fixes[..=i]);
            assert_eq!(running, fresh);
            assert_eq!(running.distance_meters().to_bits(), fresh.distance_meters().to_bits());
        }

        let naive: f64 = fixes
            .windows(2)
            .map(|pair| distance_meters(&pair[0], &pair[1]))
            .sum();
        assert_eq!(running.distance_meters(), naive);
    }

    #[test]
    fn test_distance_is_monotonic() {
        let mut stats = TrackStats::new();
        let mut previous = 0.0;
        for fix in walk() {
            stats.push(&fix);
            assert!(stats.distance_meters() >= previous);
            previous = stats.distance_meters();
        }
    }

    #[test]
    fn test_elevation_skips_missing_altitude() {
        let fixes = [
            GeoFix::new(40.0, -75.0, 0).with_altitude(100.0),
            GeoFix::new(40.0, -75.0, 1_000),
            GeoFix::new(40.0, -75.0, 2_000).with_altitude(130.0),
            GeoFix::new(40.0, -75.0, 3_000).with_altitude(110.0),
        ];
        let stats = TrackStats::from_fixes(&fixes);
        assert_eq!(stats.elevation_gain_meters(), 0.0);
        assert_eq!(stats.elevation_loss_meters(), 20.0);
    }

    #[test]
    fn test_zero_or_negative_span_gives_zero_speed() {
        let same_time = [GeoFix::new(40.0, -75.0, 5_000), GeoFix::new(40.01, -75.0, 5_000)];
        assert_eq!(TrackStats::from_fixes(&same_time).avg_speed_mps(), 0.0);

        let backwards = [GeoFix::new(40.0, -75.0, 9_000), GeoFix::new(40.01, -75.0, 5_000)];
        let stats = TrackStats::from_fixes(&backwards);
        assert!(stats.distance_meters() > 0.0);
        assert_eq!(stats.avg_speed_mps(), 0.0);
    }
}
