//! Time sources for admission timestamps.
//!
//! Timestamps are wall-clock microseconds since the Unix epoch so that
//! processes on different hosts agree on bucket boundaries.

use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::{SystemTime, UNIX_EPOCH},
};

/// Source of the `now` timestamp attached to each admission request.
pub trait Clock: Send + Sync {
    /// Microseconds since the Unix epoch.
    fn now_micros(&self) -> u64;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> u64 {
        // A clock set before 1970 reads as the epoch.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_micros()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// Manually driven clock.
///
/// All clones share the same underlying time value.
///
/// # Examples
///
/// ```
/// use ratetiers::{Clock, ManualClock};
///
/// let clock = ManualClock::new(3_000);
/// let shared = clock.clone();
///
/// shared.advance_micros(500);
/// assert_eq!(clock.now_micros(), 3_500);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now_micros: Arc<AtomicU64>,
}

impl ManualClock {
    /// A clock frozen at `now_micros`.
    pub fn new(now_micros: u64) -> Self {
        Self {
            now_micros: Arc::new(AtomicU64::new(now_micros)),
        }
    }

    /// Move the clock forward.
    pub fn advance_micros(&self, micros: u64) {
        self.now_micros.fetch_add(micros, Ordering::SeqCst);
    }

    /// Set the clock to an absolute value.
    pub fn set_micros(&self, now_micros: u64) {
        self.now_micros.store(now_micros, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_micros(&self) -> u64 {
        self.now_micros.load(Ordering::SeqCst)
    }
}
