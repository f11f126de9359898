//! Rolling karma leaderboard.
//!
//! Karma is never stored. On every call the aggregator seeks both like
//! ledgers to `now - window`, counts likes per subject author, multiplies each
//! count by its ledger's weight, and merges the two partial maps by user id in
//! memory. The merge is a plain key-wise sum, so no storage-level outer join
//! is needed; the maps are bounded by the number of users liked in the window.
//!
//! Ranking is by karma descending, then user id ascending. Users whose total
//! is zero are left out, and truncation to `top_n` happens only after the full
//! ranking.
//!
//! [`LeaderboardSource`] is the seam for swapping the live computation for a
//! periodically refreshed snapshot ([`CachedLeaderboard`]) without changing
//! the ranking semantics.

use crate::error::Result;
use crate::feed::constants::{
    DEFAULT_COMMENT_WEIGHT, DEFAULT_POST_WEIGHT, DEFAULT_TOP_N, DEFAULT_WINDOW_SECS,
};
use crate::feed::storage::FeedStorage;
use crate::feed::types::{current_timestamp_millis, SubjectKind, UserId};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Karma per like, by ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KarmaWeights {
    pub post: u64,
    pub comment: u64,
}

impl Default for KarmaWeights {
    fn default() -> Self {
        Self {
            post: DEFAULT_POST_WEIGHT,
            comment: DEFAULT_COMMENT_WEIGHT,
        }
    }
}

/// Parameters of one leaderboard computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KarmaQuery {
    pub window: Duration,
    pub weights: KarmaWeights,
    pub top_n: usize,
}

impl Default for KarmaQuery {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(DEFAULT_WINDOW_SECS),
            weights: KarmaWeights::default(),
            top_n: DEFAULT_TOP_N,
        }
    }
}

impl KarmaQuery {
    /// Earliest like timestamp (ms) inside the window ending at `now_ms`.
    ///
    /// A window too long to express in milliseconds reaches back to the epoch.
    pub fn cutoff(&self, now_ms: u64) -> u64 {
        let window_ms = u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX);
        now_ms.saturating_sub(window_ms)
    }
}

/// One ranked user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KarmaEntry {
    /// 1-based position.
    pub rank: usize,
    pub user: UserId,
    pub karma: u64,
}

/// A ranking and the time it was computed (ms since epoch).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KarmaSnapshot {
    pub entries: Vec<KarmaEntry>,
    pub computed_at: u64,
}

/// Anything that can answer a leaderboard query.
pub trait LeaderboardSource: Send + Sync {
    fn leaderboard(&self, query: &KarmaQuery) -> Result<KarmaSnapshot>;
}

/// Combines per-author like counts from both ledgers into a ranking.
pub fn rank(
    post_counts: &HashMap<UserId, u64>,
    comment_counts: &HashMap<UserId, u64>,
    weights: KarmaWeights,
    top_n: usize,
) -> Vec<KarmaEntry> {
    let mut totals: HashMap<UserId, u64> = HashMap::new();

    let weighted = post_counts
        .iter()
        .map(|(user, count)| (user, count.saturating_mul(weights.post)))
        .chain(
            comment_counts
                .iter()
                .map(|(user, count)| (user, count.saturating_mul(weights.comment))),
        );
    for (user, karma) in weighted {
        let total = totals.entry(*user).or_insert(0);
        *total = total.saturating_add(karma);
    }

    let mut ranked: Vec<(UserId, u64)> = totals.into_iter().filter(|(_, k)| *k > 0).collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    ranked.truncate(top_n);

    ranked
        .into_iter()
        .enumerate()
        .map(|(i, (user, karma))| KarmaEntry {
            rank: i + 1,
            user,
            karma,
        })
        .collect()
}

/// Live leaderboard computed from the ledgers on every call.
#[derive(Debug, Clone)]
pub struct KarmaAggregator {
    storage: Arc<FeedStorage>,
}

impl KarmaAggregator {
    pub fn new(storage: Arc<FeedStorage>) -> Self {
        Self { storage }
    }

    /// Computes the leaderboard for a window ending at `now_ms`.
    pub fn leaderboard_at(&self, query: &KarmaQuery, now_ms: u64) -> Result<Vec<KarmaEntry>> {
        let cutoff = query.cutoff(now_ms);

        let post_counts = self
            .storage
            .ledger(SubjectKind::Post)
            .counts_by_author_since(cutoff)?;
        let comment_counts = self
            .storage
            .ledger(SubjectKind::Comment)
            .counts_by_author_since(cutoff)?;

        let entries = rank(&post_counts, &comment_counts, query.weights, query.top_n);

        debug!(
            cutoff = cutoff,
            post_authors = post_counts.len(),
            comment_authors = comment_counts.len(),
            ranked = entries.len(),
            "leaderboard computed"
        );

        Ok(entries)
    }
}

impl LeaderboardSource for KarmaAggregator {
    fn leaderboard(&self, query: &KarmaQuery) -> Result<KarmaSnapshot> {
        let now = current_timestamp_millis();
        Ok(KarmaSnapshot {
            entries: self.leaderboard_at(query, now)?,
            computed_at: now,
        })
    }
}

/// Serves a snapshot of another source, refreshed once it is older than `ttl`.
pub struct CachedLeaderboard<S> {
    inner: S,
    ttl: Duration,
    snapshots: Mutex<HashMap<KarmaQuery, (Instant, KarmaSnapshot)>>,
}

impl<S: LeaderboardSource> CachedLeaderboard<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            snapshots: Mutex::new(HashMap::new()),
        }
    }

    /// Drops every snapshot; the next call recomputes.
    pub fn invalidate(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<KarmaQuery, (Instant, KarmaSnapshot)>> {
        self.snapshots.lock().unwrap_or_else(|poisoned| {
            error!("Leaderboard cache mutex was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl<S: LeaderboardSource> LeaderboardSource for CachedLeaderboard<S> {
    fn leaderboard(&self, query: &KarmaQuery) -> Result<KarmaSnapshot> {
        if let Some((taken, snapshot)) = self.lock().get(query) {
            if taken.elapsed() < self.ttl {
                return Ok(snapshot.clone());
            }
        }

        // Computed outside the lock; concurrent refreshes are harmless.
        let snapshot = self.inner.leaderboard(query)?;
        self.lock().insert(*query, (Instant::now(), snapshot.clone()));
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counts(pairs: &[(u64, u64)]) -> HashMap<UserId, u64> {
        pairs.iter().map(|(u, c)| (UserId(*u), *c)).collect()
    }

    #[test]
    fn test_weighted_merge() {
        let ranked = rank(
            &counts(&[(1, 3)]),
            &counts(&[(1, 2), (2, 4)]),
            KarmaWeights::default(),
            5,
        );
        assert_eq!(
            ranked,
            vec![
                KarmaEntry {
                    rank: 1,
                    user: UserId(1),
                    karma: 17
                },
                KarmaEntry {
                    rank: 2,
                    user: UserId(2),
                    karma: 4
                },
            ]
        );
    }

    #[test]
    fn test_ties_break_by_ascending_user() {
        let ranked = rank(
            &counts(&[(9, 1), (3, 1), (5, 1)]),
            &HashMap::new(),
            KarmaWeights::default(),
            5,
        );
        let users: Vec<u64> = ranked.iter().map(|e| e.user.get()).collect();
        assert_eq!(users, vec![3, 5, 9]);
    }

    #[test]
    fn test_truncates_after_full_ranking() {
        // User 2 has fewer raw rows than user 1 but more weighted karma.
        let ranked = rank(
            &counts(&[(2, 2)]),
            &counts(&[(1, 9), (3, 1)]),
            KarmaWeights::default(),
            1,
        );
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].user, UserId(2));
        assert_eq!(ranked[0].karma, 10);
    }

    #[test]
    fn test_zero_karma_excluded() {
        let weights = KarmaWeights {
            post: 5,
            comment: 0,
        };
        let ranked = rank(&counts(&[(1, 1)]), &counts(&[(2, 7)]), weights, 5);
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].user, UserId(1));
    }

    #[test]
    fn test_cutoff_saturates() {
        let query = KarmaQuery::default();
        assert_eq!(query.cutoff(1_000), 0);
        assert_eq!(query.cutoff(100_000_000), 100_000_000 - 24 * 60 * 60 * 1000);

        // Milliseconds past u64::MAX must not wrap into a tiny window.
        let huge = KarmaQuery {
            window: Duration::from_secs(18_446_744_073_709_552),
            ..query
        };
        assert_eq!(huge.cutoff(1_800_000_000_000), 0);
        let max = KarmaQuery {
            window: Duration::MAX,
            ..query
        };
        assert_eq!(max.cutoff(u64::MAX), 0);
    }

    struct CountingSource(AtomicUsize);

    /// Reports call `n` as karma `n` computed at time `1000 * n`.
    struct CountingSource(AtomicUsize);

    impl LeaderboardSource for CountingSource {
        fn leaderboard(&self, _query: &KarmaQuery) -> Result<KarmaSnapshot> {
            let n = self.0.fetch_add(1, Ordering::SeqCst) as u64 + 1;
            Ok(KarmaSnapshot {
                entries: vec![KarmaEntry {
                    rank: 1,
                    user: UserId(1),
                    karma: n,
                }],
                computed_at: 1_000 * n,
            })
        }
    }

    fn counting_cache(ttl: Duration) -> CachedLeaderboard<CountingSource> {
        CachedLeaderboard::new(CountingSource(AtomicUsize::new(0)), ttl)
    }

    #[test]
    fn test_cache_serves_snapshot_until_invalidated() {
        let cache = counting_cache(Duration::from_secs(60));
        let query = KarmaQuery::default();

        assert_eq!(cache.leaderboard(&query).unwrap().entries[0].karma, 1);
        assert_eq!(cache.leaderboard(&query).unwrap().entries[0].karma, 1);

        cache.invalidate();
        assert_eq!(cache.leaderboard(&query).unwrap().entries[0].karma, 2);
    }

    #[test]
    fn test_cached_snapshot_keeps_its_computation_time() {
        let cache = counting_cache(Duration::from_secs(60));
        let query = KarmaQuery::default();

        let first = cache.leaderboard(&query).unwrap();
        let hit = cache.leaderboard(&query).unwrap();
        assert_eq!(hit.computed_at, first.computed_at);
        assert_eq!(hit, first);

        cache.invalidate();
        assert_eq!(cache.leaderboard(&query).unwrap().computed_at, 2_000);
    }

    #[test]
    fn test_zero_ttl_always_recomputes() {
        let cache = counting_cache(Duration::ZERO);
        let query = KarmaQuery::default();
        cache.leaderboard(&query).unwrap();
        assert_eq!(cache.leaderboard(&query).unwrap().entries[0].karma, 2);
    }
}
