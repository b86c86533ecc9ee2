//! Ratewindow - Sliding-Window Admission Control
//!
//! This crate decides, per labeled resource, whether each incoming event is
//! admitted under a "max N events per T seconds" policy. All counting state
//! lives in a shared sorted-set store (Redis, or an in-process stand-in),
//! so independent processes limiting the same label observe one count.

pub mod clock;
pub mod config;
pub mod console;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use error::{RateWindowError, Result};
pub use ratelimit::{AdmissionControl, AdmissionMode, SlidingWindowLimiter, WindowPolicy};
