use serde::{Deserialize, Serialize};

use crate::core::geo::GeoFix;
use crate::tracking::stats::TrackStats;

/// What a waypoint marks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaypointCategory {
    Observation,
    Catch,
    Access,
    Hazard,
    Photo,
    #[default]
    Custom,
}

impl WaypointCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Observation => "observation",
            Self::Catch => "catch",
            Self::Access => "access",
            Self::Hazard => "hazard",
            Self::Photo => "photo",
            Self::Custom => "custom",
        }
    }
}

impl std::fmt::Display for WaypointCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for WaypointCategory {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "observation" => Ok(Self::Observation),
            "catch" => Ok(Self::Catch),
            "access" => Ok(Self::Access),
            "hazard" => Ok(Self::Hazard),
            "photo" => Ok(Self::Photo),
            "custom" => Ok(Self::Custom),
            other => Err(crate::Error::Config(format!(
                "unknown waypoint category '{other}'"
            ))),
        }
    }
}

/// A named point of interest captured while recording.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub fix: GeoFix,
    #[serde(default)]
    pub category: WaypointCategory,
    #[serde(default)]
    pub photo_refs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Caller-supplied part of a waypoint; the recorder adds the id and fix.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NewWaypoint {
    pub name: String,
    pub description: Option<String>,
    pub category: WaypointCategory,
    pub photo_refs: Vec<String>,
    pub notes: Option<String>,
}

impl NewWaypoint {
    pub fn new(name: impl Into<String>, category: WaypointCategory) -> Self {
        Self {
            name: name.into(),
            category,
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_photo(mut self, photo_ref: impl Into<String>) -> Self {
        self.photo_refs.push(photo_ref.into());
        self
    }

    pub fn into_waypoint(self, id: String, fix: GeoFix) -> Waypoint {
        Waypoint {
            id,
            name: self.name,
            description: self.description,
            fix,
            category: self.category,
            photo_refs: self.photo_refs,
            notes: self.notes,
        }
    }
}

/// A recorded path with its waypoints and derived statistics.
///
/// The statistics are `None` until the track holds at least two fixes and can
/// always be rebuilt from `fixes` with [`Track::recompute_stats`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: String,
    pub name: String,
    pub start_time_ms: i64,
    #[serde(default)]
    pub end_time_ms: Option<i64>,
    /// In arrival order
    #[serde(default)]
    pub fixes: Vec<GeoFix>,
    #[serde(default)]
    pub waypoints: Vec<Waypoint>,
    #[serde(default)]
    pub distance_meters: Option<f64>,
    #[serde(default)]
    pub duration_seconds: Option<u64>,
    #[serde(default)]
    pub avg_speed_mps: Option<f64>,
    #[serde(default)]
    pub elevation_gain_meters: Option<f64>,
    #[serde(default)]
    pub elevation_loss_meters: Option<f64>,
}

impl Track {
    pub fn new(id: impl Into<String>, name: impl Into<String>, start_time_ms: i64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            start_time_ms,
            end_time_ms: None,
            fixes: Vec::new(),
            waypoints: Vec::new(),
            distance_meters: None,
            duration_seconds: None,
            avg_speed_mps: None,
            elevation_gain_meters: None,
            elevation_loss_meters: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.end_time_ms.is_some()
    }

    /// Copy the accumulated statistics onto the track
    pub fn apply_stats(&mut self, stats: &TrackStats) {
        if stats.fix_count() < 2 {
            self.distance_meters = None;
            self.avg_speed_mps = None;
            self.elevation_gain_meters = None;
            self.elevation_loss_meters = None;
            return;
        }
        self.distance_meters = Some(stats.distance_meters());
        self.avg_speed_mps = Some(stats.avg_speed_mps());
        self.elevation_gain_meters = Some(stats.elevation_gain_meters());
        self.elevation_loss_meters = Some(stats.elevation_loss_meters());
    }

    /// Rebuild the statistics from `fixes` alone
    pub fn recompute_stats(&mut self) {
        let stats = TrackStats::from_fixes(&self.fixes);
        self.apply_stats(&stats);
    }

    /// Finish the track at `end_time_ms`
    pub fn finalize(&mut self, end_time_ms: i64) {
        self.end_time_ms = Some(end_time_ms);
        let elapsed_ms = (end_time_ms - self.start_time_ms).max(0);
        self.duration_seconds = Some((elapsed_ms / 1000) as u64);
    }
}
