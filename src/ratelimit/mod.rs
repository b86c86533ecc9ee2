//! Sliding-window admission control.

mod backend;
mod limiter;
mod policy;

pub use backend::AdmissionControl;
pub use limiter::{AdmissionMode, SlidingWindowLimiter};
pub use policy::WindowPolicy;
