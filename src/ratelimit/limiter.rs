//! Sliding-window limiter over a shared ordered store.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use uuid::Uuid;

use super::backend::AdmissionControl;
use super::policy::WindowPolicy;
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::store::{AdmitRequest, ScoreBound, SharedOrderedStore};

/// How the prune, count and insert steps reach the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AdmissionMode {
    /// One atomic store-side unit per call. The cap is exact.
    #[default]
    Atomic,
    /// Three independent store calls. Concurrent callers on the same label
    /// may both see a free slot, so the cap is approximate.
    Sequential,
}

/// Admits at most `max_request_count` events per trailing window for one label.
///
/// The limiter keeps no counts of its own: every decision is made against
/// the label's record in the shared store, so any number of limiter
/// instances in any number of processes observe one consistent count.
pub struct SlidingWindowLimiter {
    /// Label of the resource; also the store key
    label: String,
    policy: WindowPolicy,
    store: Arc<dyn SharedOrderedStore>,
    clock: Arc<dyn Clock>,
    mode: AdmissionMode,
}

impl std::fmt::Debug for SlidingWindowLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlidingWindowLimiter")
            .field("label", &self.label)
            .field("policy", &self.policy)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl SlidingWindowLimiter {
    /// Create a limiter using the system clock and atomic admission.
    pub fn new(
        label: impl Into<String>,
        policy: WindowPolicy,
        store: Arc<dyn SharedOrderedStore>,
    ) -> Self {
        Self {
            label: label.into(),
            policy,
            store,
            clock: Arc::new(SystemClock),
            mode: AdmissionMode::default(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_mode(mut self, mode: AdmissionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    pub fn mode(&self) -> AdmissionMode {
        self.mode
    }

    /// Decide whether one new event is admitted.
    ///
    /// Entries older than the window are evicted on every call, including
    /// calls that end up denied. Store failures are returned as-is; the
    /// limiter never picks an admit or deny default on its own.
    pub async fn admit(&self) -> Result<bool> {
        let now = self.clock.now_millis()?;
        let window_begin = now.saturating_sub(self.policy.window_millis());
        let member = unique_member(now);

        trace!(
            label = %self.label,
            now,
            window_begin,
            mode = ?self.mode,
            "Checking sliding window"
        );

        let admitted = match self.mode {
            AdmissionMode::Atomic => {
                let request = AdmitRequest {
                    window_begin,
                    now,
                    member,
                    limit: self.policy.max_request_count(),
                    window_ms: self.policy.window_millis(),
                };
                self.store.try_admit(&self.label, &request).await?
            }
            AdmissionMode::Sequential => self.admit_sequential(window_begin, now, &member).await?,
        };

        if !admitted {
            debug!(
                label = %self.label,
                limit = self.policy.max_request_count(),
                window_seconds = self.policy.window_seconds(),
                "Rate limit exceeded"
            );
        }
        Ok(admitted)
    }

    async fn admit_sequential(&self, window_begin: i64, now: i64, member: &str) -> Result<bool> {
        let pruned = self
            .store
            .remove_range_by_score(
                &self.label,
                ScoreBound::Unbounded,
                ScoreBound::Inclusive(window_begin.saturating_sub(1)),
            )
            .await?;
        let count = self.store.cardinality(&self.label).await?;

        trace!(label = %self.label, pruned, count, "Window pruned");

        if count >= self.policy.max_request_count() {
            return Ok(false);
        }

        if !self.store.add(&self.label, now, member).await? {
            debug!(label = %self.label, member = %member, "Member already present, score updated");
        }
        Ok(true)
    }
}

#[async_trait]
impl AdmissionControl for SlidingWindowLimiter {
    fn label(&self) -> &str {
        &self.label
    }

    async fn admit(&self) -> Result<bool> {
        SlidingWindowLimiter::admit(self).await
    }
}

/// Member value for an entry scored `now`; distinct for equal timestamps.
fn unique_member(now: i64) -> String {
    format!("{}-{}", now, Uuid::new_v4().simple())
}
