//! End-to-end scenarios for nearby.
//!
//! Small hand-checked datasets plus a larger synthetic one where recall
//! against brute force can be measured.

use nearby::{
    derive_defaults, Dataset, DistanceFunction, ErrorKind, LshFamily, LshIndex, LshParams,
};
use rand::prelude::*;
use std::collections::HashSet;

fn square() -> Dataset<f64> {
    Dataset::from_rows(&[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [5.0, 5.0]]).expect("dataset")
}

fn square_index() -> LshIndex<f64> {
    let params = LshParams::builder(2)
        .family(LshFamily::Hyperplane)
        .distance(DistanceFunction::EuclideanSquared)
        .num_tables(1)
        .hash_length(2)
        .num_probes(4)
        .build()
        .expect("params");
    LshIndex::build(params, square()).expect("index")
}

fn random_unit_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|_| {
            let v: Vec<f32> = (0..dim).map(|_| rng.random::<f32>() * 2.0 - 1.0).collect();
            let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            v.into_iter().map(|x| x / (norm + 1e-10)).collect()
        })
        .collect()
}

/// Logs from the index go to the test output with `RUST_LOG=nearby=debug`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn brute_force_nearest(data: &[Vec<f32>], q: &[f32]) -> u32 {
    let dist = |v: &Vec<f32>| v.iter().zip(q).map(|(a, b)| (a - b) * (a - b)).sum::<f32>();
    (0..data.len())
        .min_by(|&a, &b| dist(&data[a]).total_cmp(&dist(&data[b])))
        .expect("non-empty") as u32
}

// =============================================================================
// Four points in the plane
// =============================================================================

#[test]
fn knn_returns_the_two_closest_points() {
    let index = square_index();
    let knn = index
        .find_k_nearest_neighbors_with_distances(&[0.0, 0.0], 2)
        .expect("query");

    assert_eq!(knn.len(), 2);
    assert_eq!(knn[0], (0, 0.0));
    assert!(knn[1].0 == 1 || knn[1].0 == 2);
    assert_eq!(knn[1].1, 1.0);
    assert!(knn.iter().all(|&(i, _)| i != 3));

    let ids = index.find_k_nearest_neighbors(&[0.0, 0.0], 2).expect("query");
    assert_eq!(ids, knn.iter().map(|&(i, _)| i).collect::<Vec<_>>());
}

#[test]
fn near_neighbors_at_zero_threshold_is_the_query_point() {
    let index = square_index();
    let near = index.find_near_neighbors(&[0.0, 0.0], 0.0).expect("query");
    assert_eq!(near, vec![0]);
}

#[test]
fn near_neighbors_with_inner_product_use_similarity() {
    let params = LshParams::builder(2)
        .family(LshFamily::Hyperplane)
        .distance(DistanceFunction::NegativeInnerProduct)
        .num_tables(1)
        .hash_length(2)
        .num_probes(4)
        .build()
        .expect("params");
    let index = LshIndex::build(params, square()).expect("index");

    // <q, x> for q = (1, 1): 0, 1, 1, 10
    let near: HashSet<u32> = index
        .find_near_neighbors(&[1.0, 1.0], 1.0)
        .expect("query")
        .into_iter()
        .collect();
    assert_eq!(near, HashSet::from([1, 2, 3]));
    assert_eq!(index.find_nearest_neighbor(&[1.0, 1.0]).expect("query"), Some(3));
}

#[test]
fn knn_with_large_k_returns_every_candidate_sorted() {
    let index = square_index();
    let knn = index
        .find_k_nearest_neighbors_with_distances(&[0.0, 0.0], 100)
        .expect("query");
    assert_eq!(knn.len(), 4);
    assert!(knn.windows(2).all(|w| w[0].1 <= w[1].1));
    assert_eq!(knn[3], (3, 50.0));
}

#[test]
fn nearest_neighbor_is_idempotent() {
    let index = square_index();
    let q = [0.4, 0.3];
    let first = index.find_nearest_neighbor(&q).expect("query");
    for _ in 0..10 {
        assert_eq!(index.find_nearest_neighbor(&q).expect("query"), first);
    }
    assert_eq!(first, Some(0));
}

// =============================================================================
// Construction errors
// =============================================================================

#[test]
fn zero_dimension_is_invalid() {
    let err = LshParams::builder(0).build().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let params = LshParams {
        dimension: 0,
        ..LshParams::default()
    };
    assert_eq!(
        LshIndex::<f32>::new(params).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
}

#[test]
fn fitting_the_wrong_width_is_a_dimension_mismatch() {
    let params = LshParams::builder(3).build().expect("params");
    let mut index = LshIndex::new(params).expect("index");
    let err = index.fit(square()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DimensionMismatch);
    assert!(!index.is_fitted());
}

// =============================================================================
// Tuning and statistics
// =============================================================================

#[test]
fn num_probes_must_cover_every_table() {
    let params = LshParams::builder(2).num_tables(3).build().expect("params");
    let mut index = LshIndex::build(params, square()).expect("index");
    for n in 0..3 {
        assert_eq!(
            index.set_num_probes(n).unwrap_err().kind(),
            ErrorKind::InvalidArgument
        );
    }
    index.set_num_probes(3).expect("n == L");
    assert_eq!(index.get_num_probes().expect("fitted"), 3);
}

#[test]
fn statistics_count_queries_until_reset() {
    let index = square_index();
    index.find_nearest_neighbor(&[1.0, 1.0]).expect("query");
    index.get_unique_candidates(&[1.0, 1.0]).expect("query");
    assert_eq!(index.get_query_statistics().num_queries, 2);

    index.reset_query_statistics();
    assert_eq!(index.get_query_statistics().num_queries, 0);

    index.find_k_nearest_neighbors(&[1.0, 1.0], 3).expect("query");
    let stats = index.get_query_statistics();
    assert_eq!(stats.num_queries, 1);
    assert_eq!(stats.num_probes, 4);
    assert_eq!(stats.num_candidates, 4);
    assert_eq!(stats.num_unique_candidates, 4);
    assert_eq!(stats.num_distance_evaluations, 4);
    assert!(stats.total_query_time >= stats.distance_time);
}

// =============================================================================
// Recall on synthetic data
// =============================================================================

#[test]
fn recall_improves_with_probes() {
    init_tracing();
    let dim = 32;
    let data = random_unit_vectors(2000, dim, 7);
    let queries: Vec<Vec<f32>> = random_unit_vectors(50, dim, 8)
        .into_iter()
        .zip(&data)
        .map(|(noise, base)| {
            // a slightly perturbed dataset point, so the true neighbor is clear
            base.iter().zip(&noise).map(|(b, n)| b + 0.05 * n).collect()
        })
        .collect();
    let truth: Vec<u32> = queries.iter().map(|q| brute_force_nearest(&data, q)).collect();

    let params = derive_defaults(data.len(), dim, DistanceFunction::EuclideanSquared, false)
        .expect("defaults");
    let num_tables = params.num_tables;
    let mut index = LshIndex::build(params, Dataset::from_rows(&data).expect("dataset"))
        .expect("index");

    let mut recall = Vec::new();
    for probes in [num_tables, 4 * num_tables, 16 * num_tables] {
        index.set_num_probes(probes).expect("probes");
        let hits = queries
            .iter()
            .zip(&truth)
            .filter(|(q, t)| index.find_nearest_neighbor(q).expect("query") == Some(**t))
            .count();
        recall.push(hits as f64 / queries.len() as f64);
    }

    assert!(recall.windows(2).all(|w| w[0] <= w[1]), "recall {recall:?}");
    assert!(recall[2] >= 0.9, "recall {recall:?}");
}
