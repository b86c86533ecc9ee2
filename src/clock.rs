//! Wall-clock abstraction with millisecond resolution.
//!
//! Scores in the shared store are epoch milliseconds, so every clock
//! reading handed to the limiter uses the same unit.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use thiserror::Error;

/// Errors raised while reading a clock.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClockError {
    #[error("system clock is set before the Unix epoch")]
    BeforeEpoch,
    #[error("clock reading does not fit in i64 milliseconds")]
    Overflow,
    #[error("clock unavailable")]
    Unavailable,
}

/// Source of the current time in milliseconds since the Unix epoch.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> Result<i64, ClockError>;
}

/// Clock backed by `SystemTime`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> Result<i64, ClockError> {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|_| ClockError::BeforeEpoch)?;
        i64::try_from(since_epoch.as_millis()).map_err(|_| ClockError::Overflow)
    }
}

/// Manually driven clock for deterministic tests and simulations.
///
/// Clones share the same underlying time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
    fail_next: Arc<AtomicBool>,
}

impl ManualClock {
    pub fn new(start_millis: i64) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start_millis)),
            fail_next: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn advance(&self, by: Duration) {
        let by = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(by, Ordering::SeqCst);
    }

    pub fn advance_millis(&self, by: i64) {
        self.millis.fetch_add(by, Ordering::SeqCst);
    }

    pub fn set_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }

    /// Make the next reading fail with `ClockError::Unavailable`.
    pub fn fail_next_read(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> Result<i64, ClockError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(ClockError::Unavailable);
        }
        Ok(self.millis.load(Ordering::SeqCst))
    }
}
