//! Admission control trait for abstracting limiter implementations.

use async_trait::async_trait;

use crate::error::Result;

/// Trait for anything that answers admit/deny for one labeled resource.
///
/// The console harness is written against this trait so it can drive the
/// sliding-window limiter or a scripted stand-in.
#[async_trait]
pub trait AdmissionControl: Send + Sync {
    /// Label of the rate-limited resource.
    fn label(&self) -> &str;

    /// Decide whether one new event is admitted.
    async fn admit(&self) -> Result<bool>;
}
