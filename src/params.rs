//! Index parameters and the heuristics that derive them.
//!
//! [`LshParams`] is validated once (by [`LshParams::validate`], which
//! [`LshIndex::new`](crate::LshIndex::new) calls) and is immutable inside an
//! index. The two tunables that may change after construction, `num_probes`
//! and `max_num_candidates`, are copied into the index and adjusted there.
//!
//! # Choosing parameters
//!
//! | Knob | Larger value means |
//! |------|--------------------|
//! | `num_tables` (L) | higher recall, more memory, slower build |
//! | `hash_length` (k) | smaller buckets, fewer candidates per probe |
//! | `num_probes` | higher recall, slower queries |
//! | `max_num_candidates` | bounded query cost regardless of probes |
//!
//! [`derive_defaults`] picks a reasonable starting point from the dataset
//! size: roughly `log2(n) - 2` hash bits per table, so that an average bucket
//! holds a handful of points.

use crate::distance::DistanceFunction;
use crate::error::{LshError, Result};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

/// Seed used when none is given.
pub const DEFAULT_SEED: u64 = 409_556_018;

/// Number of tables chosen by [`derive_defaults`].
pub const DEFAULT_NUM_TABLES: usize = 10;

/// Width of a bucket code.
pub const MAX_CODE_BITS: u32 = u64::BITS;

/// Hash family used to build every table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum LshFamily {
    /// Random hyperplanes; one bit per elementary hash.
    Hyperplane,
    /// Pseudo-random rotations followed by the closest signed basis vector.
    #[default]
    CrossPolytope,
}

impl LshFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            LshFamily::Hyperplane => "hyperplane",
            LshFamily::CrossPolytope => "cross_polytope",
        }
    }
}

impl fmt::Display for LshFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LshFamily {
    type Err = LshError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "hyperplane" => Ok(LshFamily::Hyperplane),
            "cross_polytope" | "crosspolytope" => Ok(LshFamily::CrossPolytope),
            other => Err(LshError::invalid(format!("unrecognized hash family {other:?}"))),
        }
    }
}

/// Layout of the bucket map inside each table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum BucketStorage {
    /// Sorted code array with offsets into one flat point array.
    #[default]
    SortedArray,
    /// `HashMap<u64, Vec<u32>>`.
    HashMap,
}

/// Parameters for an [`LshIndex`](crate::LshIndex).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LshParams {
    /// Dimension of every dataset row and query.
    pub dimension: usize,
    /// Distance used for exact re-ranking.
    pub distance: DistanceFunction,
    /// Hash family.
    pub family: LshFamily,
    /// Number of hash tables (L).
    pub num_tables: usize,
    /// Elementary hash functions concatenated per table (k).
    pub hash_length: usize,
    /// Pseudo-random rotations per cross-polytope hash. Ignored for hyperplanes.
    pub num_rotations: usize,
    /// Cross-polytope dimension of the last elementary hash in each table;
    /// `0` means the full rotation dimension. Ignored for hyperplanes.
    pub last_cp_dimension: usize,
    /// Initial total number of buckets probed per query, across all tables.
    pub num_probes: usize,
    /// Initial candidate budget per query; `None` is unlimited.
    pub max_num_candidates: Option<usize>,
    /// Bucket map layout.
    pub storage: BucketStorage,
    /// Threads used to build tables: `0` uses the global pool, `1` builds
    /// sequentially, larger values start a dedicated pool. `fit` fails with
    /// `InvalidArgument` when that pool cannot be started.
    pub num_setup_threads: usize,
    /// Master seed; table seeds are derived from it.
    pub seed: u64,
}

impl Default for LshParams {
    fn default() -> Self {
        Self {
            dimension: 0,
            distance: DistanceFunction::EuclideanSquared,
            family: LshFamily::CrossPolytope,
            num_tables: DEFAULT_NUM_TABLES,
            hash_length: 1,
            num_rotations: 2,
            last_cp_dimension: 0,
            num_probes: DEFAULT_NUM_TABLES,
            max_num_candidates: None,
            storage: BucketStorage::SortedArray,
            num_setup_threads: 0,
            seed: DEFAULT_SEED,
        }
    }
}

impl LshParams {
    /// Start a builder for the given dimension.
    pub fn builder(dimension: usize) -> LshParamsBuilder {
        LshParamsBuilder::new(dimension)
    }

    /// Length of the padded vector that cross-polytope rotations act on.
    pub fn rotation_dim(&self) -> usize {
        self.dimension.max(1).next_power_of_two()
    }

    /// `last_cp_dimension` with `0` resolved to the rotation dimension.
    pub fn effective_last_cp_dimension(&self) -> usize {
        if self.last_cp_dimension == 0 {
            self.rotation_dim()
        } else {
            self.last_cp_dimension
        }
    }

    /// Total bits of one table's bucket code, saturating at `usize::MAX`.
    pub fn code_bits(&self) -> usize {
        match self.family {
            LshFamily::Hyperplane => self.hash_length,
            LshFamily::CrossPolytope => {
                let full = log2(self.rotation_dim()) + 1;
                let last = log2(self.effective_last_cp_dimension()) + 1;
                self.hash_length
                    .saturating_sub(1)
                    .saturating_mul(full)
                    .saturating_add(last)
            }
        }
    }

    /// Check every field. Called once at index construction.
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(LshError::invalid("dimension must be positive"));
        }
        if self.num_tables == 0 {
            return Err(LshError::invalid("number of tables must be positive"));
        }
        if self.hash_length == 0 {
            return Err(LshError::invalid("hash length must be positive"));
        }
        // every elementary hash takes at least one bit
        if self.hash_length > MAX_CODE_BITS as usize {
            return Err(LshError::invalid(format!(
                "hash length {} exceeds the {MAX_CODE_BITS}-bit code width",
                self.hash_length
            )));
        }
        if self.num_probes < self.num_tables {
            return Err(LshError::invalid(format!(
                "number of probes must be at least the number of tables ({})",
                self.num_tables
            )));
        }
        if self.family == LshFamily::CrossPolytope {
            if self.num_rotations == 0 {
                return Err(LshError::invalid(
                    "cross-polytope hashing needs at least one rotation",
                ));
            }
            let last = self.effective_last_cp_dimension();
            if !last.is_power_of_two() || last > self.rotation_dim() {
                return Err(LshError::invalid(format!(
                    "last cross-polytope dimension {last} must be a power of two \
                     no larger than {}",
                    self.rotation_dim()
                )));
            }
        }
        let bits = self.code_bits();
        if bits > MAX_CODE_BITS as usize {
            return Err(LshError::invalid(format!(
                "{} hash functions of family {} need {bits} code bits, at most {MAX_CODE_BITS} supported",
                self.hash_length, self.family
            )));
        }
        Ok(())
    }

    /// Set `hash_length` (and `last_cp_dimension` for cross-polytope) so
    /// that one table's code carries `num_bits` bits.
    pub fn with_hash_bits(mut self, num_bits: usize) -> Result<Self> {
        let (k, last_cp) = hash_shape(num_bits, &self)?;
        self.hash_length = k;
        self.last_cp_dimension = last_cp;
        Ok(self)
    }
}

/// Fluent construction of [`LshParams`].
///
/// ```rust
/// use nearby::{DistanceFunction, LshFamily, LshParams};
///
/// let params = LshParams::builder(64)
///     .family(LshFamily::Hyperplane)
///     .distance(DistanceFunction::NegativeInnerProduct)
///     .num_tables(8)
///     .hash_length(12)
///     .num_probes(32)
///     .build()
///     .unwrap();
/// assert_eq!(params.num_probes, 32);
/// ```
#[derive(Debug, Clone)]
pub struct LshParamsBuilder {
    params: LshParams,
    num_probes: Option<usize>,
}

impl LshParamsBuilder {
    pub fn new(dimension: usize) -> Self {
        Self {
            params: LshParams {
                dimension,
                ..LshParams::default()
            },
            num_probes: None,
        }
    }

    pub fn distance(mut self, distance: DistanceFunction) -> Self {
        self.params.distance = distance;
        self
    }

    pub fn family(mut self, family: LshFamily) -> Self {
        self.params.family = family;
        self
    }

    pub fn num_tables(mut self, l: usize) -> Self {
        self.params.num_tables = l;
        self
    }

    pub fn hash_length(mut self, k: usize) -> Self {
        self.params.hash_length = k;
        self
    }

    pub fn num_rotations(mut self, n: usize) -> Self {
        self.params.num_rotations = n;
        self
    }

    pub fn last_cp_dimension(mut self, d: usize) -> Self {
        self.params.last_cp_dimension = d;
        self
    }

    /// Defaults to `num_tables` when not set.
    pub fn num_probes(mut self, n: usize) -> Self {
        self.num_probes = Some(n);
        self
    }

    pub fn max_num_candidates(mut self, n: Option<usize>) -> Self {
        self.params.max_num_candidates = n;
        self
    }

    pub fn storage(mut self, storage: BucketStorage) -> Self {
        self.params.storage = storage;
        self
    }

    pub fn num_setup_threads(mut self, n: usize) -> Self {
        self.params.num_setup_threads = n;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.params.seed = seed;
        self
    }

    /// Validate and return the parameters.
    pub fn build(self) -> Result<LshParams> {
        let mut params = self.params;
        params.num_probes = self.num_probes.unwrap_or(params.num_tables);
        params.validate()?;
        Ok(params)
    }
}

/// Pick parameters for a dataset of `num_points` vectors.
///
/// Uses cross-polytope hashing with [`DEFAULT_NUM_TABLES`] tables. A single
/// rotation suffices when the data is already well spread
/// (`is_sufficiently_random`); otherwise two are used.
pub fn derive_defaults(
    num_points: usize,
    dimension: usize,
    distance: DistanceFunction,
    is_sufficiently_random: bool,
) -> Result<LshParams> {
    if num_points == 0 {
        return Err(LshError::invalid("number of points must be positive"));
    }
    if dimension == 0 {
        return Err(LshError::invalid("dimension must be positive"));
    }

    let mut num_bits = 1usize;
    while num_points.checked_shr((num_bits + 2) as u32).unwrap_or(0) != 0 {
        num_bits += 1;
    }

    let params = LshParams {
        dimension,
        distance,
        family: LshFamily::CrossPolytope,
        num_tables: DEFAULT_NUM_TABLES,
        num_rotations: if is_sufficiently_random { 1 } else { 2 },
        num_probes: DEFAULT_NUM_TABLES,
        max_num_candidates: None,
        storage: BucketStorage::SortedArray,
        num_setup_threads: 0,
        seed: DEFAULT_SEED,
        ..LshParams::default()
    }
    .with_hash_bits(num_bits)?;

    debug!(
        num_points,
        dimension,
        num_bits,
        hash_length = params.hash_length,
        last_cp_dimension = params.last_cp_dimension,
        "derived default LSH parameters"
    );
    Ok(params)
}

/// Number of elementary hash functions whose concatenation yields a code of
/// `num_bits` bits under `params.family` and `params.dimension`.
pub fn estimate_num_hash_functions(num_bits: usize, params: &LshParams) -> Result<usize> {
    hash_shape(num_bits, params).map(|(k, _)| k)
}

/// `(hash_length, last_cp_dimension)` for a bit budget.
fn hash_shape(num_bits: usize, params: &LshParams) -> Result<(usize, usize)> {
    if num_bits == 0 {
        return Err(LshError::invalid("number of hash bits must be positive"));
    }
    if params.dimension == 0 {
        return Err(LshError::invalid("dimension must be positive"));
    }
    match params.family {
        LshFamily::Hyperplane => Ok((num_bits, params.last_cp_dimension)),
        LshFamily::CrossPolytope => {
            let rotation_dim = params.rotation_dim();
            let bits_per_function = log2(rotation_dim) + 1;
            let full = num_bits / bits_per_function;
            let remaining = num_bits % bits_per_function;
            if remaining == 0 {
                Ok((full, rotation_dim))
            } else {
                Ok((full + 1, 1 << (remaining - 1)))
            }
        }
    }
}

/// log2 of a power of two.
#[inline]
fn log2(n: usize) -> usize {
    n.trailing_zeros() as usize
}
