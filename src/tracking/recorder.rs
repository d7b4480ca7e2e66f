//! The track recorder.
//!
//! At most one track records at a time. While recording, a background task
//! drains the location subscription: every fix is appended, folded into the
//! running statistics, written through to the [`TrackStore`] and reported to
//! the optional update callback.

use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

use crate::core::clock::{next_record_id, Clock, SystemClock};
use crate::core::geo::GeoFix;
use crate::prelude::Arc;
use crate::tracking::location::{LocationSource, LocationSubscription};
use crate::tracking::stats::TrackStats;
use crate::tracking::store::TrackStore;
use crate::tracking::types::{NewWaypoint, Track, Waypoint};
use crate::{Error, Result};

/// Called with a snapshot of the track after every change
pub type UpdateCallback = Arc<dyn Fn(&Track) + Send + Sync>;

/// Point-in-time view of the recorder
#[derive(Debug, Clone, PartialEq)]
pub struct RecorderStatus {
    pub is_tracking: bool,
    pub current: Option<Track>,
}

struct ActiveRecording {
    track: Track,
    stats: TrackStats,
    on_update: Option<UpdateCallback>,
}

enum RecorderState {
    Idle,
    Recording(ActiveRecording),
}

impl RecorderState {
    fn active_mut(&mut self) -> Option<&mut ActiveRecording> {
        match self {
            Self::Recording(active) => Some(active),
            Self::Idle => None,
        }
    }
}

/// Handle on the drain task of the current recording
struct Pump {
    stop: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

pub struct TrackRecorder {
    source: Arc<dyn LocationSource>,
    store: Arc<TrackStore>,
    clock: Arc<dyn Clock>,
    state: Arc<Mutex<RecorderState>>,
    /// Serializes start and stop; holds the drain task while recording
    lifecycle: Mutex<Option<Pump>>,
}

impl TrackRecorder {
    pub fn new(source: Arc<dyn LocationSource>, store: Arc<TrackStore>) -> Self {
        Self {
            source,
            store,
            clock: Arc::new(SystemClock),
            state: Arc::new(Mutex::new(RecorderState::Idle)),
            lifecycle: Mutex::new(None),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<TrackStore> {
        &self.store
    }

    /// Begin recording a new track.
    ///
    /// Fails with `AlreadyTracking` while another track records, and with the
    /// location source's error if it cannot be subscribed to; the recorder
    /// stays idle in both cases.
    pub async fn start_tracking(
        &self,
        name: impl Into<String>,
        on_update: Option<UpdateCallback>,
    ) -> Result<Track> {
        let mut pump = self.lifecycle.lock().await;
        let mut state = self.state.lock().await;
        if matches!(*state, RecorderState::Recording(_)) {
            return Err(Error::AlreadyTracking);
        }

        let subscription = self.source.subscribe().await?;
        let track = Track::new(
            next_record_id(self.clock.as_ref()),
            name,
            self.clock.now_ms(),
        );
        self.store.save(&track).await?;

        *state = RecorderState::Recording(ActiveRecording {
            track: track.clone(),
            stats: TrackStats::new(),
            on_update,
        });
        drop(state);

        let (stop, stop_rx) = oneshot::channel();
        let task = tokio::spawn(drain_fixes(
            Arc::clone(&self.state),
            Arc::clone(&self.store),
            track.id.clone(),
            subscription,
            stop_rx,
        ));
        *pump = Some(Pump { stop, task });

        log::info!("started track {} ({})", track.id, track.name);
        Ok(track)
    }

    /// Finish the current track and return it.
    ///
    /// Fixes the source already delivered are recorded before the stream is
    /// closed. If the final write fails the error is returned and the track
    /// stays active so the stop can be retried.
    pub async fn stop_tracking(&self) -> Result<Track> {
        let mut pump = self.lifecycle.lock().await;
        if !matches!(*self.state.lock().await, RecorderState::Recording(_)) {
            return Err(Error::NoActiveTrack);
        }

        if let Some(Pump { stop, task }) = pump.take() {
            // The task may already have exited if the stream closed
            let _ = stop.send(());
            if let Err(e) = task.await {
                log::error!("location drain task failed: {}", e);
            }
        }

        let mut state = self.state.lock().await;
        let Some(active) = state.active_mut() else {
            return Err(Error::NoActiveTrack);
        };

        let mut finished = active.track.clone();
        finished.finalize(self.clock.now_ms());
        finished.apply_stats(&active.stats);
        self.store.save(&finished).await?;
        let on_update = active.on_update.clone();
        *state = RecorderState::Idle;
        drop(state);

        if let Some(callback) = on_update {
            callback(&finished);
        }
        log::info!(
            "stopped track {}: {} fixes, {} waypoints, {:.0} m in {} s",
            finished.id,
            finished.fixes.len(),
            finished.waypoints.len(),
            finished.distance_meters.unwrap_or(0.0),
            finished.duration_seconds.unwrap_or(0)
        );
        Ok(finished)
    }

    /// Capture a waypoint at the current position.
    ///
    /// Asks the location source for one fresh fix. Concurrent calls resolve
    /// independently. Fails with `NoActiveTrack` if no track is recording, or
    /// if the track was stopped while the fix was awaited.
    pub async fn add_waypoint(&self, new_waypoint: NewWaypoint) -> Result<Waypoint> {
        let track_id = match &*self.state.lock().await {
            RecorderState::Recording(active) => active.track.id.clone(),
            RecorderState::Idle => return Err(Error::NoActiveTrack),
        };

        let fix = self.source.current_fix().await?;
        let waypoint = new_waypoint.into_waypoint(next_record_id(self.clock.as_ref()), fix);

        let mut state = self.state.lock().await;
        let active = match state.active_mut() {
            Some(active) if active.track.id == track_id => active,
            _ => return Err(Error::NoActiveTrack),
        };
        active.track.waypoints.push(waypoint.clone());
        if let Err(e) = self.store.save(&active.track).await {
            active.track.waypoints.pop();
            return Err(e);
        }
        let snapshot = active.on_update.clone().map(|cb| (cb, active.track.clone()));
        drop(state);

        if let Some((callback, track)) = snapshot {
            callback(&track);
        }
        log::debug!("added waypoint {} to track {}", waypoint.name, track_id);
        Ok(waypoint)
    }

    pub async fn status(&self) -> RecorderStatus {
        match &*self.state.lock().await {
            RecorderState::Recording(active) => RecorderStatus {
                is_tracking: true,
                current: Some(active.track.clone()),
            },
            RecorderState::Idle => RecorderStatus {
                is_tracking: false,
                current: None,
            },
        }
    }

    pub async fn is_tracking(&self) -> bool {
        matches!(*self.state.lock().await, RecorderState::Recording(_))
    }
}

async fn drain_fixes(
    state: Arc<Mutex<RecorderState>>,
    store: Arc<TrackStore>,
    track_id: String,
    mut subscription: LocationSubscription,
    mut stop: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            biased;
            next = subscription.next() => match next {
                Some(Ok(fix)) => record_fix(&state, &store, &track_id, fix).await,
                Some(Err(e)) => log::warn!("location error on track {}: {}", track_id, e),
                None => {
                    log::info!("location stream for track {} closed", track_id);
                    break;
                }
            },
            _ = &mut stop => break,
        }
    }

    while let Some(next) = subscription.try_next() {
        match next {
            Ok(fix) => record_fix(&state, &store, &track_id, fix).await,
            Err(e) => log::warn!("location error on track {}: {}", track_id, e),
        }
    }
    drop(subscription);
    log::debug!("unsubscribed track {} from location updates", track_id);
}

async fn record_fix(
    state: &Mutex<RecorderState>,
    store: &TrackStore,
    track_id: &str,
    fix: GeoFix,
) {
    let mut state = state.lock().await;
    let Some(active) = state.active_mut().filter(|a| a.track.id == track_id) else {
        return;
    };

    active.track.fixes.push(fix);
    active.stats.push(&fix);
    active.track.apply_stats(&active.stats);
    if let Err(e) = store.save(&active.track).await {
        // The fix stays in memory and goes out with the next successful write
        log::error!("failed to persist track {}: {}", track_id, e);
    }
    let snapshot = active.on_update.clone().map(|cb| (cb, active.track.clone()));
    drop(state);

    if let Some((callback, track)) = snapshot {
        callback(&track);
    }
}
