//! Shared ordered store abstraction.
//!
//! A store keeps, per key, a set of `(score, member)` pairs ordered by
//! score. All counting state for the limiter lives here; nothing is cached
//! in process memory.

mod memory;
mod redis_store;

use async_trait::async_trait;

use crate::error::Result;

pub use self::memory::InMemoryStore;
pub use self::redis_store::RedisStore;

/// One end of a score range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBound {
    /// No bound on this side.
    Unbounded,
    /// Bound that includes the given score.
    Inclusive(i64),
}

impl ScoreBound {
    fn admits_from_below(&self, score: i64) -> bool {
        match self {
            ScoreBound::Unbounded => true,
            ScoreBound::Inclusive(min) => score >= *min,
        }
    }

    fn admits_from_above(&self, score: i64) -> bool {
        match self {
            ScoreBound::Unbounded => true,
            ScoreBound::Inclusive(max) => score <= *max,
        }
    }
}

/// Parameters of one atomic prune + count + conditional insert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdmitRequest {
    /// Entries scored strictly below this are evicted first.
    pub window_begin: i64,
    /// Score of the entry inserted on admission.
    pub now: i64,
    /// Member of the entry inserted on admission.
    pub member: String,
    /// Admit only while the live cardinality is below this.
    pub limit: u64,
    /// Window width, used by stores that expire idle records.
    pub window_ms: i64,
}

/// Key-scoped sorted-set operations required by the limiter.
#[async_trait]
pub trait SharedOrderedStore: Send + Sync {
    /// Delete every entry of `key` whose score lies in `[min, max]`.
    ///
    /// Returns the number of removed entries.
    async fn remove_range_by_score(&self, key: &str, min: ScoreBound, max: ScoreBound)
        -> Result<u64>;

    /// Number of entries currently stored for `key`.
    async fn cardinality(&self, key: &str) -> Result<u64>;

    /// Insert `(score, member)` for `key`. Returns `true` if the member was new.
    async fn add(&self, key: &str, score: i64, member: &str) -> Result<bool>;

    /// Run prune, count and conditional insert as a single atomic unit.
    ///
    /// Returns `true` when the entry was inserted.
    async fn try_admit(&self, key: &str, request: &AdmitRequest) -> Result<bool>;
}
