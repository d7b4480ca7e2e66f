pub mod gpx;
pub mod location;
pub mod recorder;
pub mod stats;
pub mod store;
pub mod types;

pub use gpx::{export_gpx, gpx_file_name};
pub use location::{LocationSource, LocationSubscription, SimulatedLocationSource};
pub use recorder::{RecorderStatus, TrackRecorder, UpdateCallback};
pub use stats::TrackStats;
pub use store::TrackStore;
pub use types::{NewWaypoint, Track, Waypoint, WaypointCategory};
