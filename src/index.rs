//! The index facade: fit once, then query.
//!
//! # Usage
//!
//! ```rust
//! use nearby::{Dataset, LshFamily, LshIndex, LshParams};
//!
//! # fn main() -> nearby::Result<()> {
//! let rows = vec![vec![0.0f32, 0.0], vec![1.0, 0.0], vec![0.0, 1.0], vec![5.0, 5.0]];
//! let params = LshParams::builder(2)
//!     .family(LshFamily::Hyperplane)
//!     .num_tables(1)
//!     .hash_length(2)
//!     .num_probes(4)
//!     .build()?;
//!
//! let mut index = LshIndex::new(params)?;
//! index.fit(Dataset::from_rows(&rows)?)?;
//!
//! let knn = index.find_k_nearest_neighbors_with_distances(&[0.0, 0.0], 2)?;
//! assert_eq!(knn[0], (0, 0.0));
//! assert_eq!(knn[1].1, 1.0);
//! # Ok(())
//! # }
//! ```
//!
//! Queries take `&self` and may run concurrently from many threads. Tuning
//! (`set_num_probes`, `set_max_num_candidates`) takes `&mut self`, so it can
//! never race a query.

use crate::dataset::Dataset;
use crate::error::{LshError, Result};
use crate::hash::{HashFamily, HashFunction};
use crate::params::LshParams;
use crate::query::QueryEngine;
use crate::scalar::Scalar;
use crate::stats::{QueryStatistics, StatisticsCollector};
use crate::table::{BucketTable, LshTables, TableBuilder};
use std::time::Instant;
use tracing::info;

#[derive(Debug)]
struct Fitted<T> {
    dataset: Dataset<T>,
    tables: LshTables<T, HashFunction<T>>,
}

/// Multiprobe LSH index over `f32` or `f64` vectors.
#[derive(Debug)]
pub struct LshIndex<T> {
    params: LshParams,
    num_probes: usize,
    max_num_candidates: Option<usize>,
    state: Option<Fitted<T>>,
    stats: StatisticsCollector,
}

impl<T: Scalar> LshIndex<T> {
    /// Create an unfitted index. Fails with `InvalidArgument` for invalid
    /// parameters.
    pub fn new(params: LshParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            num_probes: params.num_probes,
            max_num_candidates: params.max_num_candidates,
            params,
            state: None,
            stats: StatisticsCollector::new(),
        })
    }

    /// `new` followed by `fit`.
    pub fn build(params: LshParams, dataset: Dataset<T>) -> Result<Self> {
        let mut index = Self::new(params)?;
        index.fit(dataset)?;
        Ok(index)
    }

    /// Hash the dataset into the tables. The index owns the dataset from now
    /// on; it can be fitted only once.
    pub fn fit(&mut self, dataset: Dataset<T>) -> Result<()> {
        if self.state.is_some() {
            return Err(LshError::AlreadyFitted);
        }
        if dataset.dimension() != self.params.dimension {
            return Err(LshError::DimensionMismatch {
                expected: self.params.dimension,
                found: dataset.dimension(),
            });
        }
        if dataset.is_empty() {
            return Err(LshError::invalid("cannot fit an empty dataset"));
        }

        let start = Instant::now();
        let family = HashFamily::from_params(&self.params);
        let tables = TableBuilder::new(self.params.storage)
            .num_setup_threads(self.params.num_setup_threads)
            .build(&dataset, &family, self.params.num_tables)?;
        info!(
            num_points = dataset.num_points(),
            dimension = dataset.dimension(),
            family = %self.params.family,
            num_tables = self.params.num_tables,
            hash_length = self.params.hash_length,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "fitted LSH index"
        );
        self.state = Some(Fitted { dataset, tables });
        Ok(())
    }

    pub fn params(&self) -> &LshParams {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    /// Number of indexed points; 0 before `fit`.
    pub fn num_points(&self) -> usize {
        self.state.as_ref().map_or(0, |s| s.dataset.num_points())
    }

    /// Non-empty buckets in table `table`.
    pub fn num_buckets(&self, table: usize) -> Result<usize> {
        let state = self.fitted()?;
        if table >= state.tables.num_tables() {
            return Err(LshError::invalid(format!(
                "table {table} out of range, index has {}",
                state.tables.num_tables()
            )));
        }
        Ok(state.tables.buckets(table).num_buckets())
    }

    /// Approximate heap footprint of the dataset and tables.
    pub fn size_bytes(&self) -> usize {
        self.state
            .as_ref()
            .map_or(0, |s| s.dataset.size_bytes() + s.tables.size_bytes())
    }

    /// Index of the closest candidate, or `None` if no candidate was found.
    pub fn find_nearest_neighbor(&self, query: &[T]) -> Result<Option<u32>> {
        self.run(query, |engine, stats| engine.nearest_neighbor(query, stats))
    }

    /// Up to `k` candidate indices, closest first.
    pub fn find_k_nearest_neighbors(&self, query: &[T], k: usize) -> Result<Vec<u32>> {
        self.run(query, |engine, stats| {
            let knn = engine.k_nearest_neighbors(query, k, stats)?;
            Ok(knn.into_iter().map(|(c, _)| c).collect())
        })
    }

    /// Like [`find_k_nearest_neighbors`](Self::find_k_nearest_neighbors),
    /// paired with exact distances.
    pub fn find_k_nearest_neighbors_with_distances(
        &self,
        query: &[T],
        k: usize,
    ) -> Result<Vec<(u32, T)>> {
        self.run(query, |engine, stats| engine.k_nearest_neighbors(query, k, stats))
    }

    /// Candidates within `threshold`.
    ///
    /// For squared Euclidean distance, points with distance `<= threshold`.
    /// For negative inner product, `threshold` is a similarity: points whose
    /// inner product with the query is `>= threshold`. Unordered.
    pub fn find_near_neighbors(&self, query: &[T], threshold: T) -> Result<Vec<u32>> {
        self.run(query, |engine, stats| engine.near_neighbors(query, threshold, stats))
    }

    /// Every retrieved entry, one per (table, bucket) membership, in visit order.
    pub fn get_candidates_with_duplicates(&self, query: &[T]) -> Result<Vec<u32>> {
        self.run(query, |engine, stats| engine.candidates_with_duplicates(query, stats))
    }

    /// Distinct candidates in first-seen order.
    pub fn get_unique_candidates(&self, query: &[T]) -> Result<Vec<u32>> {
        self.run(query, |engine, stats| engine.unique_candidates(query, stats))
    }

    /// Distinct candidates in ascending index order.
    pub fn get_unique_sorted_candidates(&self, query: &[T]) -> Result<Vec<u32>> {
        let mut candidates = self.get_unique_candidates(query)?;
        candidates.sort_unstable();
        Ok(candidates)
    }

    /// Set the number of buckets probed per query, across all tables.
    ///
    /// Fails with `InvalidArgument` when `n` is smaller than the number of
    /// tables.
    pub fn set_num_probes(&mut self, n: usize) -> Result<()> {
        if n < self.params.num_tables {
            return Err(LshError::invalid(format!(
                "number of probes must be at least the number of tables ({}), got {n}",
                self.params.num_tables
            )));
        }
        self.fitted()?;
        self.num_probes = n;
        Ok(())
    }

    pub fn get_num_probes(&self) -> Result<usize> {
        self.fitted()?;
        Ok(self.num_probes)
    }

    /// Bound the entries retrieved per query; `None` is unlimited.
    pub fn set_max_num_candidates(&mut self, n: Option<usize>) -> Result<()> {
        self.fitted()?;
        self.max_num_candidates = n;
        Ok(())
    }

    pub fn get_max_num_candidates(&self) -> Result<Option<usize>> {
        self.fitted()?;
        Ok(self.max_num_candidates)
    }

    /// Counters accumulated since construction or the last reset.
    pub fn get_query_statistics(&self) -> QueryStatistics {
        self.stats.snapshot()
    }

    pub fn reset_query_statistics(&self) {
        self.stats.reset();
    }

    fn fitted(&self) -> Result<&Fitted<T>> {
        self.state.as_ref().ok_or(LshError::NotFitted)
    }

    /// Validate `query`, run `op` against the tables, and commit its statistics.
    fn run<R>(
        &self,
        query: &[T],
        op: impl FnOnce(&QueryEngine<'_, T, HashFunction<T>>, &mut QueryStatistics) -> Result<R>,
    ) -> Result<R> {
        let state = self.fitted()?;
        if query.len() != self.params.dimension {
            return Err(LshError::DimensionMismatch {
                expected: self.params.dimension,
                found: query.len(),
            });
        }

        let start = Instant::now();
        let engine = QueryEngine {
            dataset: &state.dataset,
            tables: &state.tables,
            distance: self.params.distance,
            num_probes: self.num_probes,
            max_num_candidates: self.max_num_candidates,
        };
        let mut stats = QueryStatistics {
            num_queries: 1,
            ..Default::default()
        };
        let out = op(&engine, &mut stats)?;
        stats.total_query_time = start.elapsed();
        self.stats.record(&stats);
        Ok(out)
    }
}
