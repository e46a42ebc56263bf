//! Time sources for ingest stamps and query anchors.

use std::ops::Add;
use std::sync::RwLock;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of wall-clock time.
pub trait Clock: Send + Sync {
    /// Returns the current time.
    fn now(&self) -> SystemTime;

    /// Returns the current time in microseconds since the Unix epoch.
    ///
    /// Times before the epoch are reported as negative offsets.
    fn now_micros(&self) -> i64 {
        system_time_to_micros(self.now())
    }
}

/// Clock backed by [`SystemTime::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// Manually driven clock for tests.
#[derive(Debug)]
pub struct MockClock {
    now: RwLock<SystemTime>,
}

impl Clock for MockClock {
    fn now(&self) -> SystemTime {
        match self.now.read() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

impl MockClock {
    /// Creates a clock frozen at `time`.
    pub fn with_time(time: SystemTime) -> Self {
        Self {
            now: RwLock::new(time),
        }
    }

    /// Creates a clock frozen at `micros` microseconds after the epoch.
    pub fn with_micros(micros: u64) -> Self {
        Self::with_time(UNIX_EPOCH + Duration::from_micros(micros))
    }

    /// Creates a clock frozen at the current system time.
    pub fn new() -> Self {
        Self::with_time(SystemTime::now())
    }

    /// Moves the clock forward by `duration`.
    pub fn advance(&self, duration: Duration) {
        let mut now = match self.now.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *now = now.add(duration);
    }

    /// Sets the clock to `time`.
    pub fn set_time(&self, time: SystemTime) {
        let mut now = match self.now.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *now = time;
    }
}

impl Default for MockClock {
    fn default() -> Self {
        Self::new()
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub(crate) fn system_time_to_micros(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_micros().min(i64::MAX as u128) as i64,
        Err(before) => -(before.duration().as_micros().min(i64::MAX as u128) as i64),
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub(crate) fn duration_to_micros(duration: Duration) -> i64 {
    duration.as_micros().min(i64::MAX as u128) as i64
}
