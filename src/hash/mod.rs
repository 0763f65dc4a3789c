//! Locality-sensitive hash families.
//!
//! The core idea: **design hash functions where similar items collide more
//! often than dissimilar ones**. Traditional hash functions try to *minimize*
//! collisions. LSH does the opposite for similar items:
//!
//! - P[h(a) = h(b)] is high when a and b are close
//! - P[h(a) = h(b)] is low when a and b are far apart
//!
//! One table concatenates k elementary hashes into a code, which sharpens the
//! gap between near and far collision probabilities. L independent tables
//! recover the recall lost by concatenation.
//!
//! ## Multiprobe
//!
//! Instead of adding tables, multiprobe LSH also visits buckets *next to* the
//! query's own bucket in each table, ranked by how likely they are to hold
//! neighbors. Every family here can produce such a ranking; see
//! [`ProbeSequence`].
//!
//! | Family | Elementary hash | Bits per hash | Best for |
//! |--------|-----------------|---------------|----------|
//! | [`HyperplaneHash`] | sign of a random projection | 1 | cheap hashing, low dimension |
//! | [`CrossPolytopeHash`] | closest signed axis after rotation | log2(d) + 1 | angular / normalized Euclidean |
//!
//! The table builder and the query engine only see [`LshFunction`]; the
//! concrete family is picked by [`HashFamily::draw`].
//!
//! ## References
//!
//! - Indyk & Motwani (1998). "Approximate nearest neighbors: towards removing
//!   the curse of dimensionality." (LSH theory)
//! - Charikar (2002). "Similarity estimation techniques from rounding algorithms." (hyperplanes)
//! - Andoni et al. (2015). "Practical and optimal LSH for angular distance." (cross-polytope)

mod cross_polytope;
mod hyperplane;
pub mod probe;

pub use cross_polytope::CrossPolytopeHash;
pub use hyperplane::HyperplaneHash;
pub use probe::{Probe, ProbeSequence};

use crate::error::{LshError, Result};
use crate::params::{LshFamily, LshParams};
use crate::scalar::Scalar;

/// One table's hash function: k concatenated elementary hashes.
///
/// Every method taking a vector fails with `DimensionMismatch` when its
/// length is not [`dimension`](Self::dimension).
pub trait LshFunction<T: Scalar>: Send + Sync {
    /// Input dimension.
    fn dimension(&self) -> usize;

    /// Number of elementary hashes (k).
    fn hash_length(&self) -> usize;

    /// Bucket code of `x`. Deterministic for a given seed.
    fn hash(&self, x: &[T]) -> Result<u64>;

    /// Codes of many rows; implementations may reuse scratch space.
    fn hash_rows<'a, I>(&self, rows: I) -> Result<Vec<u64>>
    where
        I: IntoIterator<Item = &'a [T]>,
    {
        rows.into_iter().map(|row| self.hash(row)).collect()
    }

    /// Ranked probe sequence for `x`; the first probe is `hash(x)`.
    fn probe_sequence(&self, x: &[T]) -> Result<ProbeSequence>;

    /// The first `count` probe codes for `x`. Shorter when the code space is
    /// exhausted.
    fn enumerate_probes(&self, x: &[T], count: usize) -> Result<Vec<u64>> {
        Ok(self
            .probe_sequence(x)?
            .take(count)
            .map(|probe| probe.code)
            .collect())
    }

    /// `Ok` when `x` has this function's input dimension.
    fn check_dimension(&self, x: &[T]) -> Result<()> {
        if x.len() == self.dimension() {
            Ok(())
        } else {
            Err(LshError::DimensionMismatch {
                expected: self.dimension(),
                found: x.len(),
            })
        }
    }
}

/// A hash function drawn from either family.
#[derive(Debug, Clone)]
pub enum HashFunction<T> {
    Hyperplane(HyperplaneHash<T>),
    CrossPolytope(CrossPolytopeHash<T>),
}

impl<T: Scalar> LshFunction<T> for HashFunction<T> {
    fn dimension(&self) -> usize {
        match self {
            HashFunction::Hyperplane(h) => h.dimension(),
            HashFunction::CrossPolytope(h) => h.dimension(),
        }
    }

    fn hash_length(&self) -> usize {
        match self {
            HashFunction::Hyperplane(h) => h.hash_length(),
            HashFunction::CrossPolytope(h) => h.hash_length(),
        }
    }

    #[inline]
    fn hash(&self, x: &[T]) -> Result<u64> {
        match self {
            HashFunction::Hyperplane(h) => h.hash(x),
            HashFunction::CrossPolytope(h) => h.hash(x),
        }
    }

    fn hash_rows<'a, I>(&self, rows: I) -> Result<Vec<u64>>
    where
        I: IntoIterator<Item = &'a [T]>,
    {
        match self {
            HashFunction::Hyperplane(h) => h.hash_rows(rows),
            HashFunction::CrossPolytope(h) => h.hash_rows(rows),
        }
    }

    fn probe_sequence(&self, x: &[T]) -> Result<ProbeSequence> {
        match self {
            HashFunction::Hyperplane(h) => h.probe_sequence(x),
            HashFunction::CrossPolytope(h) => h.probe_sequence(x),
        }
    }
}

/// A seeded hash family: draws one independent function per table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashFamily {
    family: LshFamily,
    dimension: usize,
    hash_length: usize,
    num_rotations: usize,
    last_cp_dimension: usize,
    seed: u64,
}

impl HashFamily {
    /// Family described by validated parameters.
    pub fn from_params(params: &LshParams) -> Self {
        Self {
            family: params.family,
            dimension: params.dimension,
            hash_length: params.hash_length,
            num_rotations: params.num_rotations,
            last_cp_dimension: params.effective_last_cp_dimension(),
            seed: params.seed,
        }
    }

    pub fn family(&self) -> LshFamily {
        self.family
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Seed of table `table`, derived from the master seed.
    pub fn table_seed(&self, table: usize) -> u64 {
        splitmix64(self.seed ^ splitmix64(table as u64))
    }

    /// The hash function of table `table`.
    pub fn draw<T: Scalar>(&self, table: usize) -> HashFunction<T> {
        let seed = self.table_seed(table);
        match self.family {
            LshFamily::Hyperplane => {
                HashFunction::Hyperplane(HyperplaneHash::new(self.dimension, self.hash_length, seed))
            }
            LshFamily::CrossPolytope => HashFunction::CrossPolytope(CrossPolytopeHash::new(
                self.dimension,
                self.hash_length,
                self.num_rotations,
                self.last_cp_dimension,
                seed,
            )),
        }
    }
}

/// SplitMix64 finalizer.
#[inline]
fn splitmix64(mut z: u64) -> u64 {
    z = z.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
