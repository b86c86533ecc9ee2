//! Window policy: how many events a label may admit per trailing window.

use crate::error::{RateWindowError, Result};

/// Validated limiter policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    max_request_count: u64,
    window_seconds: u64,
}

impl WindowPolicy {
    /// Create a policy admitting `max_request_count` events per
    /// `window_seconds`. Both values must be at least 1.
    pub fn new(max_request_count: u64, window_seconds: u64) -> Result<Self> {
        if max_request_count == 0 {
            return Err(RateWindowError::InvalidPolicy(
                "max_request_count must be at least 1".to_string(),
            ));
        }
        if window_seconds == 0 {
            return Err(RateWindowError::InvalidPolicy(
                "window_seconds must be at least 1".to_string(),
            ));
        }
        // Window width must stay representable as i64 milliseconds.
        if window_seconds > (i64::MAX / 1000) as u64 {
            return Err(RateWindowError::InvalidPolicy(format!(
                "window_seconds {window_seconds} is too large"
            )));
        }
        Ok(Self {
            max_request_count,
            window_seconds,
        })
    }

    pub fn max_request_count(&self) -> u64 {
        self.max_request_count
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    /// Window width in milliseconds, the unit of store scores.
    pub fn window_millis(&self) -> i64 {
        self.window_seconds as i64 * 1000
    }
}
