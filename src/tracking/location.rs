//! Push-based GPS input.
//!
//! A [`LocationSource`] hands out subscriptions that deliver fixes over a
//! channel; dropping the subscription unsubscribes. Waypoint capture uses the
//! separate one-shot [`LocationSource::current_fix`].

use async_trait::async_trait;
use std::sync::Mutex;
use tokio::sync::{mpsc, watch};

use crate::core::geo::GeoFix;
use crate::prelude::{Arc, Duration};
use crate::{Error, Result};

/// Receiving end of a continuous location stream.
pub struct LocationSubscription {
    receiver: mpsc::UnboundedReceiver<Result<GeoFix>>,
    on_drop: Option<Box<dyn FnOnce() + Send>>,
}

impl LocationSubscription {
    /// Wrap a channel; `on_drop` runs once when the subscription goes away
    pub fn new(
        receiver: mpsc::UnboundedReceiver<Result<GeoFix>>,
        on_drop: impl FnOnce() + Send + 'static,
    ) -> Self {
        Self {
            receiver,
            on_drop: Some(Box::new(on_drop)),
        }
    }

    /// Next fix or stream error; `None` once the source closed the stream
    pub async fn next(&mut self) -> Option<Result<GeoFix>> {
        self.receiver.recv().await
    }

    /// A value that was already delivered, without waiting
    pub fn try_next(&mut self) -> Option<Result<GeoFix>> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for LocationSubscription {
    fn drop(&mut self) {
        self.receiver.close();
        if let Some(on_drop) = self.on_drop.take() {
            on_drop();
        }
    }
}

impl std::fmt::Debug for LocationSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationSubscription").finish_non_exhaustive()
    }
}

/// Anything that can produce GPS fixes.
#[async_trait]
pub trait LocationSource: Send + Sync {
    /// Start a continuous stream of fixes.
    ///
    /// Fails with `PermissionDenied` or `LocationUnavailable` when no stream
    /// can be opened.
    async fn subscribe(&self) -> Result<LocationSubscription>;

    /// One fresh fix, independent of any open stream
    async fn current_fix(&self) -> Result<GeoFix>;
}

#[derive(Default)]
struct SimulatedState {
    subscriber: Option<(u64, mpsc::UnboundedSender<Result<GeoFix>>)>,
    generation: u64,
    denied: bool,
}

/// In-process location source driven by explicit calls; used by tests and
/// track replays.
#[derive(Clone)]
pub struct SimulatedLocationSource {
    state: Arc<Mutex<SimulatedState>>,
    current: Arc<watch::Sender<Option<GeoFix>>>,
    fix_timeout: Duration,
}

impl Default for SimulatedLocationSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedLocationSource {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            state: Arc::new(Mutex::new(SimulatedState::default())),
            current: Arc::new(current),
            fix_timeout: Duration::ZERO,
        }
    }

    /// A source whose user refused location access
    pub fn denied() -> Self {
        let source = Self::new();
        if let Ok(mut state) = source.state.lock() {
            state.denied = true;
        }
        source
    }

    /// Let `current_fix` wait up to `timeout` for a fix to be set
    pub fn with_fix_timeout(mut self, timeout: Duration) -> Self {
        self.fix_timeout = timeout;
        self
    }

    /// Emit a fix on the open subscription. Returns false if nobody listens.
    pub fn push(&self, fix: GeoFix) -> bool {
        self.current.send_replace(Some(fix));
        self.send(Ok(fix))
    }

    /// Emit a stream error on the open subscription
    pub fn push_error(&self, error: Error) -> bool {
        self.send(Err(error))
    }

    /// Set the fix answered by `current_fix` without emitting it
    pub fn set_current(&self, fix: GeoFix) {
        self.current.send_replace(Some(fix));
    }

    pub fn clear_current(&self) {
        self.current.send_replace(None);
    }

    pub fn is_subscribed(&self) -> bool {
        self.state
            .lock()
            .map(|state| state.subscriber.is_some())
            .unwrap_or(false)
    }

    fn send(&self, value: Result<GeoFix>) -> bool {
        let Ok(state) = self.state.lock() else {
            return false;
        };
        match &state.subscriber {
            Some((_, sender)) => sender.send(value).is_ok(),
            None => false,
        }
    }

    fn is_denied(&self) -> bool {
        self.state.lock().map(|state| state.denied).unwrap_or(false)
    }
}

#[async_trait]
impl LocationSource for SimulatedLocationSource {
    async fn subscribe(&self) -> Result<LocationSubscription> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let generation = {
            let mut state = self
                .state
                .lock()
                .map_err(|_| Error::LocationUnavailable("location state poisoned".into()))?;
            if state.denied {
                return Err(Error::PermissionDenied);
            }
            state.generation += 1;
            state.subscriber = Some((state.generation, sender));
            state.generation
        };

        let state = Arc::clone(&self.state);
        Ok(LocationSubscription::new(receiver, move || {
            if let Ok(mut state) = state.lock() {
                if matches!(state.subscriber, Some((current, _)) if current == generation) {
                    state.subscriber = None;
                }
            }
        }))
    }

    async fn current_fix(&self) -> Result<GeoFix> {
        if self.is_denied() {
            return Err(Error::PermissionDenied);
        }
        let mut current = self.current.subscribe();
        let wait = async {
            current
                .wait_for(Option::is_some)
                .await
                .map(|fix| *fix)
                .ok()
                .flatten()
        };
        match tokio::time::timeout(self.fix_timeout, wait).await {
            Ok(Some(fix)) => Ok(fix),
            _ => Err(Error::LocationUnavailable("no position fix available".into())),
        }
    }
}
