//! Multiprobe query pipeline.
//!
//! One query walks the L per-table probe sequences as a single merged stream,
//! cheapest probe first across all tables:
//!
//! ```text
//! table 0:  home(0) ─ p(0.02) ─ p(0.31) ─ ...
//! table 1:  home(0) ─ p(0.07) ─ p(0.09) ─ ...      ─► merged by (cost, position, table)
//! table 2:  home(0) ─ p(0.15) ─ ...
//! ```
//!
//! A table's sequence is only created when the merge first reaches it, and a
//! sequence is only advanced past a probe once that probe has been visited.
//! Every home bucket has key `(0, 0, t)`, so the first L probes are always
//! the L home buckets.
//!
//! Retrieval stops after `num_probes` buckets, when `max_num_candidates`
//! entries have been collected, or when every sequence is exhausted. The
//! visit order does not depend on either limit, so a smaller budget always
//! sees a prefix of what a larger one sees.

use crate::dataset::Dataset;
use crate::distance::DistanceFunction;
use crate::error::Result;
use crate::hash::{LshFunction, ProbeSequence};
use crate::scalar::Scalar;
use crate::stats::QueryStatistics;
use crate::table::{BucketTable, LshTables};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::time::{Duration, Instant};

/// Next probe of one table, waiting in the merge heap.
#[derive(Debug, Clone, Copy)]
struct Head {
    cost: f64,
    position: u64,
    table: usize,
    /// `None` until the table's sequence has been created.
    code: Option<u64>,
}

impl Head {
    fn key(&self, other: &Self) -> Ordering {
        self.cost
            .total_cmp(&other.cost)
            .then(self.position.cmp(&other.position))
            .then(self.table.cmp(&other.table))
    }
}

impl PartialEq for Head {
    fn eq(&self, other: &Self) -> bool {
        self.key(other) == Ordering::Equal
    }
}

impl Eq for Head {}

impl PartialOrd for Head {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Head {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key(other).reverse()
    }
}

/// Read-only view of a fitted index plus the current tuning knobs.
pub(crate) struct QueryEngine<'a, T, F> {
    pub dataset: &'a Dataset<T>,
    pub tables: &'a LshTables<T, F>,
    pub distance: DistanceFunction,
    pub num_probes: usize,
    pub max_num_candidates: Option<usize>,
}

impl<'a, T: Scalar, F: LshFunction<T>> QueryEngine<'a, T, F> {
    /// Candidates in visit order, one entry per bucket membership.
    pub fn candidates_with_duplicates(
        &self,
        query: &[T],
        stats: &mut QueryStatistics,
    ) -> Result<Vec<u32>> {
        let raw = self.retrieve(query, stats)?;
        stats.num_unique_candidates += dedup(&raw).len() as u64;
        Ok(raw)
    }

    /// Distinct candidates in first-seen order.
    pub fn unique_candidates(&self, query: &[T], stats: &mut QueryStatistics) -> Result<Vec<u32>> {
        let raw = self.retrieve(query, stats)?;
        let unique = dedup(&raw);
        stats.num_unique_candidates += unique.len() as u64;
        Ok(unique)
    }

    /// Closest candidate; the earliest discovered wins ties.
    pub fn nearest_neighbor(&self, query: &[T], stats: &mut QueryStatistics) -> Result<Option<u32>> {
        let candidates = self.unique_candidates(query, stats)?;
        let start = Instant::now();
        let mut best: Option<(u32, T)> = None;
        for &c in &candidates {
            let d = self.distance.distance(query, self.dataset.row(c as usize));
            match best {
                Some((_, bd)) if by_distance(d, bd) != Ordering::Less => {}
                _ => best = Some((c, d)),
            }
        }
        stats.num_distance_evaluations += candidates.len() as u64;
        stats.distance_time += start.elapsed();
        Ok(best.map(|(c, _)| c))
    }

    /// Up to `k` candidates by ascending distance; discovery order breaks ties.
    pub fn k_nearest_neighbors(
        &self,
        query: &[T],
        k: usize,
        stats: &mut QueryStatistics,
    ) -> Result<Vec<(u32, T)>> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let candidates = self.unique_candidates(query, stats)?;
        let start = Instant::now();
        let mut scored: Vec<(T, usize, u32)> = candidates
            .iter()
            .enumerate()
            .map(|(pos, &c)| (self.distance.distance(query, self.dataset.row(c as usize)), pos, c))
            .collect();
        let order =
            |a: &(T, usize, u32), b: &(T, usize, u32)| by_distance(a.0, b.0).then(a.1.cmp(&b.1));
        if k < scored.len() {
            scored.select_nth_unstable_by(k, order);
            scored.truncate(k);
        }
        scored.sort_unstable_by(order);
        stats.num_distance_evaluations += candidates.len() as u64;
        stats.distance_time += start.elapsed();
        Ok(scored.into_iter().map(|(d, _, c)| (c, d)).collect())
    }

    /// Candidates passing `threshold`, in discovery order.
    pub fn near_neighbors(
        &self,
        query: &[T],
        threshold: T,
        stats: &mut QueryStatistics,
    ) -> Result<Vec<u32>> {
        let candidates = self.unique_candidates(query, stats)?;
        let start = Instant::now();
        let near = candidates
            .iter()
            .copied()
            .filter(|&c| {
                let d = self.distance.distance(query, self.dataset.row(c as usize));
                self.distance.within(d, threshold)
            })
            .collect();
        stats.num_distance_evaluations += candidates.len() as u64;
        stats.distance_time += start.elapsed();
        Ok(near)
    }

    /// Walk the merged probe stream and collect bucket contents.
    fn retrieve(&self, query: &[T], stats: &mut QueryStatistics) -> Result<Vec<u32>> {
        let start = Instant::now();
        let mut hashing = Duration::ZERO;
        let mut out = Vec::new();
        let mut probes = 0usize;

        if self.max_num_candidates == Some(0) {
            return Ok(out);
        }

        let num_tables = self.tables.num_tables();
        let mut sequences: Vec<Option<ProbeSequence>> = (0..num_tables).map(|_| None).collect();
        let mut heap: BinaryHeap<Head> = (0..num_tables)
            .map(|table| Head {
                cost: 0.0,
                position: 0,
                table,
                code: None,
            })
            .collect();

        while probes < self.num_probes {
            let Some(head) = heap.pop() else {
                break;
            };
            let t = head.table;

            let code = match head.code {
                Some(code) => code,
                None => {
                    let h = Instant::now();
                    let seq = self.tables.function(t).probe_sequence(query)?;
                    hashing += h.elapsed();
                    let code = seq.home_code();
                    sequences[t] = Some(seq);
                    code
                }
            };

            probes += 1;
            let bucket = self.tables.buckets(t).bucket(code);
            if let Some(limit) = self.max_num_candidates {
                let room = limit - out.len();
                if bucket.len() >= room {
                    out.extend_from_slice(&bucket[..room]);
                    break;
                }
            }
            out.extend_from_slice(bucket);

            if probes == self.num_probes {
                break;
            }
            if let Some(seq) = sequences[t].as_mut() {
                let h = Instant::now();
                let next = if head.code.is_none() {
                    // the home probe was read off `home_code`; skip it
                    seq.nth(1)
                } else {
                    seq.next()
                };
                hashing += h.elapsed();
                if let Some(probe) = next {
                    heap.push(Head {
                        cost: probe.cost,
                        position: head.position + 1,
                        table: t,
                        code: Some(probe.code),
                    });
                }
            }
        }

        let elapsed = start.elapsed();
        stats.num_probes += probes as u64;
        stats.num_candidates += out.len() as u64;
        stats.hashing_time += hashing;
        stats.hash_table_time += elapsed.saturating_sub(hashing);
        Ok(out)
    }
}

/// Total order on distances with every NaN last, whatever its sign.
#[inline]
fn by_distance<T: Scalar>(a: T, b: T) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (false, false) => Scalar::total_cmp(&a, &b),
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
    }
}

/// Remove repeats, keeping the first occurrence of each index.
fn dedup(raw: &[u32]) -> Vec<u32> {
    let mut seen = HashSet::with_capacity(raw.len());
    raw.iter().copied().filter(|c| seen.insert(*c)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::{HashFamily, HashFunction};
    use crate::params::{BucketStorage, LshFamily, LshParams};
    use crate::table::TableBuilder;

    struct Fixture {
        dataset: Dataset<f64>,
        tables: LshTables<f64, HashFunction<f64>>,
    }

    fn fixture(family: LshFamily, num_tables: usize, hash_length: usize) -> Fixture {
        let rows: Vec<Vec<f64>> = (0..120)
            .map(|i| (0..6).map(|j| ((i * 6 + j) as f64 * 0.37).sin()).collect())
            .collect();
        let dataset = Dataset::from_rows(&rows).unwrap();
        let params = LshParams::builder(6)
            .family(family)
            .num_tables(num_tables)
            .hash_length(hash_length)
            .build()
            .unwrap();
        let tables = TableBuilder::new(BucketStorage::SortedArray)
            .num_setup_threads(1)
            .build(&dataset, &HashFamily::from_params(&params), num_tables)
            .unwrap();
        Fixture { dataset, tables }
    }

    impl Fixture {
        fn engine(&self, num_probes: usize, max: Option<usize>) -> QueryEngine<'_, f64, HashFunction<f64>> {
            QueryEngine {
                dataset: &self.dataset,
                tables: &self.tables,
                distance: DistanceFunction::EuclideanSquared,
                num_probes,
                max_num_candidates: max,
            }
        }
    }

    #[test]
    fn first_probes_are_home_buckets() {
        let fx = fixture(LshFamily::Hyperplane, 3, 4);
        let q = fx.dataset.row(7).to_vec();
        let mut stats = QueryStatistics::default();
        let raw = fx.engine(3, None).candidates_with_duplicates(&q, &mut stats).unwrap();
        let expected: Vec<u32> = (0..3)
            .flat_map(|t| {
                let code = fx.tables.function(t).hash(&q).unwrap();
                fx.tables.buckets(t).bucket(code).to_vec()
            })
            .collect();
        assert_eq!(raw, expected);
        assert_eq!(stats.num_probes, 3);
        // a dataset point always lands in its own home bucket
        assert!(raw.contains(&7));
    }

    #[test]
    fn more_probes_extend_the_visit_order() {
        let fx = fixture(LshFamily::CrossPolytope, 4, 1);
        let q: Vec<f64> = (0..6).map(|j| (j as f64 * 1.1).cos()).collect();
        let mut stats = QueryStatistics::default();
        let short = fx.engine(4, None).candidates_with_duplicates(&q, &mut stats).unwrap();
        let long = fx.engine(20, None).candidates_with_duplicates(&q, &mut stats).unwrap();
        assert!(long.len() >= short.len());
        assert_eq!(&long[..short.len()], &short[..]);
    }

    #[test]
    fn exhausting_every_bucket_retrieves_every_point_per_table() {
        let fx = fixture(LshFamily::Hyperplane, 2, 3);
        let q = fx.dataset.row(0).to_vec();
        let mut stats = QueryStatistics::default();
        let raw = fx.engine(1000, None).candidates_with_duplicates(&q, &mut stats).unwrap();
        assert_eq!(raw.len(), 2 * fx.dataset.num_points());
        assert_eq!(stats.num_probes, 16);
        let unique = dedup(&raw);
        assert_eq!(unique.len(), fx.dataset.num_points());
    }

    #[test]
    fn candidate_budget_truncates_exactly() {
        let fx = fixture(LshFamily::Hyperplane, 2, 2);
        let q = fx.dataset.row(3).to_vec();
        let mut stats = QueryStatistics::default();
        let all = fx.engine(8, None).candidates_with_duplicates(&q, &mut stats).unwrap();
        let capped = fx
            .engine(8, Some(25))
            .candidates_with_duplicates(&q, &mut stats)
            .unwrap();
        assert_eq!(capped.len(), 25.min(all.len()));
        assert_eq!(&all[..capped.len()], &capped[..]);
        assert!(fx.engine(8, Some(0)).unique_candidates(&q, &mut stats).unwrap().is_empty());
    }

    #[test]
    fn knn_is_sorted_and_matches_brute_force_over_candidates() {
        let fx = fixture(LshFamily::CrossPolytope, 3, 1);
        let q: Vec<f64> = (0..6).map(|j| (j as f64 * 0.5).sin()).collect();
        let mut stats = QueryStatistics::default();
        let engine = fx.engine(12, None);
        let candidates = engine.unique_candidates(&q, &mut stats).unwrap();
        let knn = engine.k_nearest_neighbors(&q, 5, &mut stats).unwrap();
        assert_eq!(knn.len(), 5.min(candidates.len()));
        assert!(knn.windows(2).all(|w| w[0].1 <= w[1].1));

        let mut brute: Vec<f64> = candidates
            .iter()
            .map(|&c| DistanceFunction::EuclideanSquared.distance(&q, fx.dataset.row(c as usize)))
            .collect();
        brute.sort_by(f64::total_cmp);
        for ((_, d), b) in knn.iter().zip(&brute) {
            assert_eq!(d, b);
        }

        let nearest = engine.nearest_neighbor(&q, &mut stats).unwrap();
        assert_eq!(nearest, knn.first().map(|&(c, _)| c));
    }

    #[test]
    fn ties_keep_discovery_order() {
        let rows = vec![vec![1.0f64, 0.0], vec![0.0, 1.0], vec![-1.0, 0.0], vec![0.0, -1.0]];
        let dataset = Dataset::from_rows(&rows).unwrap();
        let params = LshParams::builder(2)
            .family(LshFamily::Hyperplane)
            .num_tables(1)
            .hash_length(1)
            .build()
            .unwrap();
        let tables = TableBuilder::default()
            .build(&dataset, &HashFamily::from_params(&params), 1)
            .unwrap();
        let engine = QueryEngine {
            dataset: &dataset,
            tables: &tables,
            distance: DistanceFunction::EuclideanSquared,
            num_probes: 2,
            max_num_candidates: None,
        };
        let mut stats = QueryStatistics::default();
        let q = [0.0f64, 0.0];
        let order = engine.unique_candidates(&q, &mut stats).unwrap();
        let knn: Vec<u32> = engine
            .k_nearest_neighbors(&q, 4, &mut stats)
            .unwrap()
            .into_iter()
            .map(|(c, _)| c)
            .collect();
        assert_eq!(knn, order);
        assert_eq!(
            engine.nearest_neighbor(&q, &mut stats).unwrap(),
            order.first().copied()
        );
    }

    #[test]
    fn statistics_account_for_each_stage() {
        let fx = fixture(LshFamily::Hyperplane, 2, 3);
        let q = fx.dataset.row(11).to_vec();
        let mut stats = QueryStatistics::default();
        let near = fx.engine(4, None).near_neighbors(&q, 0.0, &mut stats).unwrap();
        assert_eq!(near, vec![11]);
        assert_eq!(stats.num_probes, 4);
        assert!(stats.num_candidates >= stats.num_unique_candidates);
        assert_eq!(stats.num_distance_evaluations, stats.num_unique_candidates);
    }

    #[test]
    fn short_query_fails_before_any_probe() {
        let fx = fixture(LshFamily::CrossPolytope, 2, 1);
        let mut stats = QueryStatistics::default();
        let err = fx
            .engine(8, None)
            .unique_candidates(&[0.5, 0.5], &mut stats)
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::DimensionMismatch);
        assert_eq!(stats.num_probes, 0);
    }
}
