//! Per-query counters and timings.
//!
//! Every query is accumulated into a local [`QueryStatistics`] and committed
//! once, at the end, into one shard of a [`StatisticsCollector`]. A thread
//! always commits to the same shard, so concurrent queries rarely contend on
//! a lock. A snapshot sums the shards; a reset zeroes them.
//!
//! A query that finishes while a reset is running lands either in the old
//! epoch (and is zeroed) or in the new one. It is never split or counted
//! twice, because its whole contribution is added under one shard lock.

use parking_lot::Mutex;
use std::cell::Cell;
use std::ops::{Add, AddAssign};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Accumulated query counters. All durations are totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct QueryStatistics {
    /// Queries served.
    pub num_queries: u64,
    /// Buckets visited.
    pub num_probes: u64,
    /// Candidates retrieved, duplicates included.
    pub num_candidates: u64,
    /// Distinct candidates retrieved.
    pub num_unique_candidates: u64,
    /// Exact distances computed.
    pub num_distance_evaluations: u64,
    /// Time spent computing codes and probe sequences.
    pub hashing_time: Duration,
    /// Time spent looking up buckets.
    pub hash_table_time: Duration,
    /// Time spent computing exact distances and ranking.
    pub distance_time: Duration,
    /// Wall time of whole queries.
    pub total_query_time: Duration,
}

impl QueryStatistics {
    fn per_query(&self, total: u64) -> f64 {
        if self.num_queries == 0 {
            0.0
        } else {
            total as f64 / self.num_queries as f64
        }
    }

    fn per_query_time(&self, total: Duration) -> Duration {
        match u32::try_from(self.num_queries) {
            Ok(0) => Duration::ZERO,
            Ok(n) => total / n,
            Err(_) => Duration::from_secs_f64(total.as_secs_f64() / self.num_queries as f64),
        }
    }

    pub fn average_num_probes(&self) -> f64 {
        self.per_query(self.num_probes)
    }

    pub fn average_num_candidates(&self) -> f64 {
        self.per_query(self.num_candidates)
    }

    pub fn average_num_unique_candidates(&self) -> f64 {
        self.per_query(self.num_unique_candidates)
    }

    pub fn average_num_distance_evaluations(&self) -> f64 {
        self.per_query(self.num_distance_evaluations)
    }

    pub fn average_hashing_time(&self) -> Duration {
        self.per_query_time(self.hashing_time)
    }

    pub fn average_hash_table_time(&self) -> Duration {
        self.per_query_time(self.hash_table_time)
    }

    pub fn average_distance_time(&self) -> Duration {
        self.per_query_time(self.distance_time)
    }

    pub fn average_total_query_time(&self) -> Duration {
        self.per_query_time(self.total_query_time)
    }
}

impl AddAssign for QueryStatistics {
    fn add_assign(&mut self, rhs: Self) {
        self.num_queries += rhs.num_queries;
        self.num_probes += rhs.num_probes;
        self.num_candidates += rhs.num_candidates;
        self.num_unique_candidates += rhs.num_unique_candidates;
        self.num_distance_evaluations += rhs.num_distance_evaluations;
        self.hashing_time += rhs.hashing_time;
        self.hash_table_time += rhs.hash_table_time;
        self.distance_time += rhs.distance_time;
        self.total_query_time += rhs.total_query_time;
    }
}

impl Add for QueryStatistics {
    type Output = Self;

    fn add(mut self, rhs: Self) -> Self {
        self += rhs;
        self
    }
}

const NUM_SHARDS: usize = 16;

#[derive(Debug, Default)]
#[repr(align(64))]
struct Shard(Mutex<QueryStatistics>);

static NEXT_SHARD: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static SHARD: Cell<Option<usize>> = const { Cell::new(None) };
}

fn shard_index() -> usize {
    SHARD.with(|slot| match slot.get() {
        Some(i) => i,
        None => {
            let i = NEXT_SHARD.fetch_add(1, Ordering::Relaxed) % NUM_SHARDS;
            slot.set(Some(i));
            i
        }
    })
}

/// Shared accumulator for [`QueryStatistics`].
#[derive(Debug)]
pub struct StatisticsCollector {
    shards: Box<[Shard]>,
}

impl Default for StatisticsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl StatisticsCollector {
    pub fn new() -> Self {
        Self {
            shards: (0..NUM_SHARDS).map(|_| Shard::default()).collect(),
        }
    }

    /// Add one finished query's counters.
    pub fn record(&self, stats: &QueryStatistics) {
        *self.shards[shard_index()].0.lock() += *stats;
    }

    /// Sum of everything recorded since the last reset.
    pub fn snapshot(&self) -> QueryStatistics {
        self.shards
            .iter()
            .fold(QueryStatistics::default(), |acc, shard| acc + *shard.0.lock())
    }

    /// Zero all counters.
    pub fn reset(&self) {
        for shard in self.shards.iter() {
            *shard.0.lock() = QueryStatistics::default();
        }
        debug!("reset query statistics");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn one_query(candidates: u64) -> QueryStatistics {
        QueryStatistics {
            num_queries: 1,
            num_probes: 4,
            num_candidates: candidates,
            num_unique_candidates: candidates / 2,
            total_query_time: Duration::from_micros(10),
            ..Default::default()
        }
    }

    #[test]
    fn averages_of_empty_snapshot_are_zero() {
        let s = QueryStatistics::default();
        assert_eq!(s.average_num_candidates(), 0.0);
        assert_eq!(s.average_total_query_time(), Duration::ZERO);
    }

    #[test]
    fn add_merges_fields() {
        let s = one_query(10) + one_query(20);
        assert_eq!(s.num_queries, 2);
        assert_eq!(s.num_candidates, 30);
        assert_eq!(s.average_num_candidates(), 15.0);
        assert_eq!(s.average_total_query_time(), Duration::from_micros(10));
    }

    #[test]
    fn snapshot_does_not_perturb_counters() {
        let c = StatisticsCollector::new();
        c.record(&one_query(6));
        assert_eq!(c.snapshot(), c.snapshot());
        assert_eq!(c.snapshot().num_queries, 1);
    }

    #[test]
    fn reset_zeroes_everything() {
        let c = StatisticsCollector::new();
        c.record(&one_query(6));
        c.reset();
        assert_eq!(c.snapshot(), QueryStatistics::default());
    }

    #[test]
    fn concurrent_records_are_all_counted() {
        let c = StatisticsCollector::new();
        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..500 {
                        c.record(&one_query(2));
                    }
                });
            }
        });
        let snap = c.snapshot();
        assert_eq!(snap.num_queries, 4000);
        assert_eq!(snap.num_candidates, 8000);
    }
}
