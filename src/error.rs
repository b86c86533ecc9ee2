//! Error types for ratewindow.

use thiserror::Error;

use crate::clock::ClockError;

/// Main error type for ratewindow operations.
#[derive(Error, Debug)]
pub enum RateWindowError {
    /// The limiter policy is out of range
    #[error("Invalid policy: {0}")]
    InvalidPolicy(String),

    /// The shared store could not be reached or failed at the transport level
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The shared store answered with malformed or type-inconsistent data
    #[error("Store protocol error: {0}")]
    StoreProtocol(String),

    /// The wall clock could not be read
    #[error("Clock error: {0}")]
    Clock(#[from] ClockError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RateWindowError {
    /// Whether the error originated at the store boundary.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            RateWindowError::StoreUnavailable(_) | RateWindowError::StoreProtocol(_)
        )
    }
}

/// Result type alias for ratewindow operations.
pub type Result<T> = std::result::Result<T, RateWindowError>;
