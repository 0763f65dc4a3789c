//! nearby: multiprobe locality-sensitive hashing for approximate nearest
//! neighbor search over dense vectors.
//!
//! A fixed dataset of N vectors is hashed into L tables. A query visits the
//! buckets most likely to hold its neighbors across all tables, cheapest
//! first, then re-ranks the retrieved candidates by exact distance.
//!
//! - `hash/`: hash families (random hyperplanes, cross-polytope) and ranked
//!   probe sequences
//! - `table`: sparse bucket storage and parallel table construction
//! - `query`: the merged multiprobe traversal and re-ranking
//! - `index`: the fit/query lifecycle ([`LshIndex`]), plus [`AnyLshIndex`]
//!   for data whose element width is only known at run time
//!
//! # Critical Nuances
//!
//! ## Probes versus tables
//!
//! Recall grows with both L and `num_probes`. Tables cost memory and build
//! time; probes cost only query time. A few tables probed deeply often match
//! many tables probed once.
//!
//! ## The candidate budget
//!
//! `max_num_candidates` bounds query cost regardless of how crowded the
//! probed buckets are. It counts retrieved entries including duplicates from
//! different tables, and cuts the last bucket short when it is reached.
//!
//! ## Not exact
//!
//! Only retrieved candidates are re-ranked. A true neighbor that never
//! collides with the query in any probed bucket is never returned.

pub mod any;
pub mod dataset;
pub mod distance;
pub mod error;
pub mod hash;
pub mod index;
pub mod params;
mod query;
pub mod scalar;
pub mod simd;
pub mod stats;
pub mod table;

// Re-exports
pub use any::{AnyDataset, AnyLshIndex, DatasetRef, QueryRef, Threshold};
pub use dataset::Dataset;
pub use distance::DistanceFunction;
pub use error::{ErrorKind, LshError, Result};
pub use index::LshIndex;
pub use params::{
    derive_defaults, estimate_num_hash_functions, BucketStorage, LshFamily, LshParams,
    LshParamsBuilder,
};
pub use scalar::{ElementType, Scalar};
pub use stats::QueryStatistics;
