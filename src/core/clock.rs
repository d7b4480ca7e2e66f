//! Wall-clock abstraction so track timing can be driven by tests and replays.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Source of "now" in Unix milliseconds.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Self {
        Self {
            now: AtomicI64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: i64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: i64) {
        self.now.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

static RECORD_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Record id built from the creation time plus a process-wide sequence number,
/// so records created in the same millisecond stay distinct.
pub fn next_record_id(clock: &dyn Clock) -> String {
    let seq = RECORD_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{}_{}", clock.now_ms(), seq)
}
