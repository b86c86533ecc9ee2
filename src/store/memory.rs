//! In-process store with Redis sorted-set semantics.
//!
//! Useful for single-process deployments and tests. Each key's record is
//! guarded by its map entry, which makes `try_admit` atomic per key while
//! different keys proceed independently.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::trace;

use super::{AdmitRequest, ScoreBound, SharedOrderedStore};
use crate::error::Result;

/// A sorted set: unique members, ordered by `(score, member)`.
#[derive(Debug, Default)]
struct SortedSet {
    scores: HashMap<String, i64>,
    ordered: BTreeSet<(i64, String)>,
}

impl SortedSet {
    fn len(&self) -> u64 {
        self.ordered.len() as u64
    }

    fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Re-adding an existing member moves it to the new score.
    fn insert(&mut self, score: i64, member: &str) -> bool {
        match self.scores.insert(member.to_string(), score) {
            Some(previous) => {
                self.ordered.remove(&(previous, member.to_string()));
                self.ordered.insert((score, member.to_string()));
                false
            }
            None => {
                self.ordered.insert((score, member.to_string()));
                true
            }
        }
    }

    fn remove_range(&mut self, min: ScoreBound, max: ScoreBound) -> u64 {
        let before = self.ordered.len();
        let scores = &mut self.scores;
        self.ordered.retain(|(score, member)| {
            let doomed = min.admits_from_below(*score) && max.admits_from_above(*score);
            if doomed {
                scores.remove(member);
            }
            !doomed
        });
        (before - self.ordered.len()) as u64
    }
}

/// Sorted-set store held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: DashMap<String, SortedSet>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of a key's entries in score order.
    pub fn entries(&self, key: &str) -> Vec<(i64, String)> {
        self.records
            .get(key)
            .map(|set| set.ordered.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of keys holding at least one entry.
    pub fn key_count(&self) -> usize {
        self.records.len()
    }

    fn drop_if_empty(&self, key: &str) {
        self.records.remove_if(key, |_, set| set.is_empty());
    }
}

#[async_trait]
impl SharedOrderedStore for InMemoryStore {
    async fn remove_range_by_score(
        &self,
        key: &str,
        min: ScoreBound,
        max: ScoreBound,
    ) -> Result<u64> {
        let removed = match self.records.get_mut(key) {
            Some(mut set) => set.remove_range(min, max),
            None => 0,
        };
        self.drop_if_empty(key);
        Ok(removed)
    }

    async fn cardinality(&self, key: &str) -> Result<u64> {
        Ok(self.records.get(key).map(|set| set.len()).unwrap_or(0))
    }

    async fn add(&self, key: &str, score: i64, member: &str) -> Result<bool> {
        let mut set = self.records.entry(key.to_string()).or_default();
        Ok(set.insert(score, member))
    }

    async fn try_admit(&self, key: &str, request: &AdmitRequest) -> Result<bool> {
        let admitted = {
            let mut set = self.records.entry(key.to_string()).or_default();
            let pruned = set.remove_range(
                ScoreBound::Unbounded,
                ScoreBound::Inclusive(request.window_begin.saturating_sub(1)),
            );
            let count = set.len();
            trace!(key = %key, pruned, count, "In-memory admission unit");
            if count < request.limit {
                set.insert(request.now, &request.member);
                true
            } else {
                false
            }
        };
        if !admitted {
            self.drop_if_empty(key);
        }
        Ok(admitted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(window_begin: i64, now: i64, member: &str, limit: u64) -> AdmitRequest {
        AdmitRequest {
            window_begin,
            now,
            member: member.to_string(),
            limit,
            window_ms: now - window_begin,
        }
    }

    #[tokio::test]
    async fn test_add_and_cardinality() {
        let store = InMemoryStore::new();

        assert_eq!(store.cardinality("k").await.unwrap(), 0);
        assert!(store.add("k", 10, "a").await.unwrap());
        assert!(store.add("k", 10, "b").await.unwrap());
        assert_eq!(store.cardinality("k").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_readd_moves_score() {
        let store = InMemoryStore::new();

        assert!(store.add("k", 10, "a").await.unwrap());
        assert!(!store.add("k", 20, "a").await.unwrap());

        assert_eq!(store.entries("k"), vec![(20, "a".to_string())]);
    }

    #[tokio::test]
    async fn test_remove_range_inclusive_bounds() {
        let store = InMemoryStore::new();
        for (score, member) in [(1, "a"), (5, "b"), (9, "c"), (12, "d")] {
            store.add("k", score, member).await.unwrap();
        }

        let removed = store
            .remove_range_by_score("k", ScoreBound::Inclusive(5), ScoreBound::Inclusive(9))
            .await
            .unwrap();

        assert_eq!(removed, 2);
        assert_eq!(
            store.entries("k"),
            vec![(1, "a".to_string()), (12, "d".to_string())]
        );
    }

    #[tokio::test]
    async fn test_remove_everything_drops_key() {
        let store = InMemoryStore::new();
        store.add("k", 1, "a").await.unwrap();

        let removed = store
            .remove_range_by_score("k", ScoreBound::Unbounded, ScoreBound::Unbounded)
            .await
            .unwrap();

        assert_eq!(removed, 1);
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_remove_on_missing_key() {
        let store = InMemoryStore::new();
        let removed = store
            .remove_range_by_score("missing", ScoreBound::Unbounded, ScoreBound::Inclusive(0))
            .await
            .unwrap();
        assert_eq!(removed, 0);
        assert_eq!(store.key_count(), 0);
    }

    #[tokio::test]
    async fn test_try_admit_prunes_then_counts() {
        let store = InMemoryStore::new();
        store.add("k", 100, "old").await.unwrap();

        // Window starts at 101, so the entry at 100 is evicted first.
        assert!(store.try_admit("k", &request(101, 1_101, "new", 1)).await.unwrap());
        assert_eq!(store.entries("k"), vec![(1_101, "new".to_string())]);
    }

    #[tokio::test]
    async fn test_try_admit_keeps_entry_at_window_begin() {
        let store = InMemoryStore::new();
        store.add("k", 100, "edge").await.unwrap();

        assert!(!store.try_admit("k", &request(100, 1_100, "new", 1)).await.unwrap());
        assert_eq!(store.entries("k"), vec![(100, "edge".to_string())]);
    }

    #[tokio::test]
    async fn test_denied_admission_on_empty_limit_leaves_no_key() {
        let store = InMemoryStore::new();
        assert!(!store.try_admit("k", &request(0, 1_000, "m", 0)).await.unwrap());
        assert_eq!(store.key_count(), 0);
    }
}
