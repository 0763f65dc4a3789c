//! Hash tables and their construction.
//!
//! A table maps a bucket code to the ascending row indices that hash there.
//! Codes live in a 64-bit space far larger than any dataset, so buckets are
//! stored sparsely: only non-empty buckets exist.
//!
//! ```text
//! SortedArray:  keys    [c0,  c1,      c2 ]      (sorted, binary search)
//!               offsets [0,   2,       5,  6]
//!               points  [4 9 | 0 1 7 | 3]
//! ```

use crate::dataset::Dataset;
use crate::error::{LshError, Result};
use crate::hash::{HashFamily, HashFunction, LshFunction};
use crate::params::BucketStorage;
use crate::scalar::Scalar;
use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Instant;
use tracing::{info, trace};

/// Read access to one table's buckets.
pub trait BucketTable: Send + Sync {
    /// Points in bucket `code`, ascending; empty when the bucket is absent.
    fn bucket(&self, code: u64) -> &[u32];

    /// Number of non-empty buckets.
    fn num_buckets(&self) -> usize;

    /// Number of points stored (every point is in exactly one bucket).
    fn num_points(&self) -> usize;

    /// Approximate heap footprint in bytes.
    fn size_bytes(&self) -> usize;
}

/// Sorted code array with CSR offsets into a flat point array.
#[derive(Debug, Clone, Default)]
pub struct SortedArrayTable {
    keys: Vec<u64>,
    offsets: Vec<u32>,
    points: Vec<u32>,
}

impl SortedArrayTable {
    /// Build from the code of every row (`codes[i]` is row `i`'s code).
    pub fn from_codes(codes: &[u64]) -> Self {
        let mut pairs: Vec<(u64, u32)> = codes
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i as u32))
            .collect();
        pairs.sort_unstable();

        let mut keys = Vec::new();
        let mut offsets = Vec::new();
        let mut points = Vec::with_capacity(pairs.len());
        for (i, &(code, point)) in pairs.iter().enumerate() {
            if keys.last() != Some(&code) {
                keys.push(code);
                offsets.push(i as u32);
            }
            points.push(point);
        }
        offsets.push(points.len() as u32);
        Self {
            keys,
            offsets,
            points,
        }
    }
}

impl BucketTable for SortedArrayTable {
    #[inline]
    fn bucket(&self, code: u64) -> &[u32] {
        match self.keys.binary_search(&code) {
            Ok(i) => &self.points[self.offsets[i] as usize..self.offsets[i + 1] as usize],
            Err(_) => &[],
        }
    }

    fn num_buckets(&self) -> usize {
        self.keys.len()
    }

    fn num_points(&self) -> usize {
        self.points.len()
    }

    fn size_bytes(&self) -> usize {
        self.keys.len() * std::mem::size_of::<u64>()
            + (self.offsets.len() + self.points.len()) * std::mem::size_of::<u32>()
    }
}

/// `HashMap` from code to bucket.
#[derive(Debug, Clone, Default)]
pub struct HashMapTable {
    buckets: HashMap<u64, Vec<u32>>,
    num_points: usize,
}

impl HashMapTable {
    pub fn from_codes(codes: &[u64]) -> Self {
        let mut buckets: HashMap<u64, Vec<u32>> = HashMap::new();
        for (i, &code) in codes.iter().enumerate() {
            buckets.entry(code).or_default().push(i as u32);
        }
        Self {
            buckets,
            num_points: codes.len(),
        }
    }
}

impl BucketTable for HashMapTable {
    #[inline]
    fn bucket(&self, code: u64) -> &[u32] {
        self.buckets.get(&code).map(Vec::as_slice).unwrap_or(&[])
    }

    fn num_buckets(&self) -> usize {
        self.buckets.len()
    }

    fn num_points(&self) -> usize {
        self.num_points
    }

    fn size_bytes(&self) -> usize {
        self.buckets.len() * (std::mem::size_of::<u64>() + std::mem::size_of::<Vec<u32>>())
            + self.num_points * std::mem::size_of::<u32>()
    }
}

/// Buckets of one table in the configured layout.
#[derive(Debug, Clone)]
pub enum Buckets {
    SortedArray(SortedArrayTable),
    HashMap(HashMapTable),
}

impl Buckets {
    pub fn from_codes(codes: &[u64], storage: BucketStorage) -> Self {
        match storage {
            BucketStorage::SortedArray => Buckets::SortedArray(SortedArrayTable::from_codes(codes)),
            BucketStorage::HashMap => Buckets::HashMap(HashMapTable::from_codes(codes)),
        }
    }
}

impl BucketTable for Buckets {
    #[inline]
    fn bucket(&self, code: u64) -> &[u32] {
        match self {
            Buckets::SortedArray(t) => t.bucket(code),
            Buckets::HashMap(t) => t.bucket(code),
        }
    }

    fn num_buckets(&self) -> usize {
        match self {
            Buckets::SortedArray(t) => t.num_buckets(),
            Buckets::HashMap(t) => t.num_buckets(),
        }
    }

    fn num_points(&self) -> usize {
        match self {
            Buckets::SortedArray(t) => t.num_points(),
            Buckets::HashMap(t) => t.num_points(),
        }
    }

    fn size_bytes(&self) -> usize {
        match self {
            Buckets::SortedArray(t) => t.size_bytes(),
            Buckets::HashMap(t) => t.size_bytes(),
        }
    }
}

/// L hash functions and the buckets each one induces on the dataset.
#[derive(Debug, Clone)]
pub struct LshTables<T, F> {
    functions: Vec<F>,
    buckets: Vec<Buckets>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Scalar, F: LshFunction<T>> LshTables<T, F> {
    pub fn num_tables(&self) -> usize {
        self.functions.len()
    }

    pub fn function(&self, table: usize) -> &F {
        &self.functions[table]
    }

    pub fn buckets(&self, table: usize) -> &Buckets {
        &self.buckets[table]
    }

    pub fn size_bytes(&self) -> usize {
        self.buckets.iter().map(BucketTable::size_bytes).sum()
    }
}

/// Builds [`LshTables`] over a dataset.
#[derive(Debug, Clone, Copy, Default)]
pub struct TableBuilder {
    storage: BucketStorage,
    num_setup_threads: usize,
}

impl TableBuilder {
    pub fn new(storage: BucketStorage) -> Self {
        Self {
            storage,
            num_setup_threads: 0,
        }
    }

    /// `0` uses the global rayon pool, `1` builds sequentially, and any other
    /// `n` builds on a dedicated pool of `n` threads. Failing to start that
    /// pool fails the build.
    pub fn num_setup_threads(mut self, n: usize) -> Self {
        self.num_setup_threads = n;
        self
    }

    /// Draw `num_tables` functions from `family` and hash every row with each.
    pub fn build<T: Scalar>(
        &self,
        dataset: &Dataset<T>,
        family: &HashFamily,
        num_tables: usize,
    ) -> Result<LshTables<T, HashFunction<T>>> {
        if dataset.dimension() != family.dimension() {
            return Err(LshError::DimensionMismatch {
                expected: family.dimension(),
                found: dataset.dimension(),
            });
        }
        let functions = (0..num_tables).map(|t| family.draw(t)).collect();
        self.build_with(dataset, functions)
    }

    /// Hash every row with each of `functions`, one table per function.
    pub fn build_with<T: Scalar, F: LshFunction<T>>(
        &self,
        dataset: &Dataset<T>,
        functions: Vec<F>,
    ) -> Result<LshTables<T, F>> {
        if let Some(f) = functions.iter().find(|f| f.dimension() != dataset.dimension()) {
            return Err(LshError::DimensionMismatch {
                expected: f.dimension(),
                found: dataset.dimension(),
            });
        }
        if dataset.num_points() > u32::MAX as usize {
            return Err(LshError::invalid(format!(
                "dataset has {} points, at most {} supported",
                dataset.num_points(),
                u32::MAX
            )));
        }

        let start = Instant::now();
        let storage = self.storage;
        let build_one = |(t, f): (usize, &F)| -> Result<Buckets> {
            let table_start = Instant::now();
            let codes = f.hash_rows(dataset.rows())?;
            let buckets = Buckets::from_codes(&codes, storage);
            trace!(
                table = t,
                buckets = buckets.num_buckets(),
                elapsed_us = table_start.elapsed().as_micros() as u64,
                "built table"
            );
            Ok(buckets)
        };

        let buckets = self.run(&functions, build_one)?;

        let total_buckets: usize = buckets.iter().map(BucketTable::num_buckets).sum();
        info!(
            num_tables = functions.len(),
            num_points = dataset.num_points(),
            total_buckets,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "built LSH tables"
        );

        Ok(LshTables {
            functions,
            buckets,
            _marker: PhantomData,
        })
    }

    #[cfg(feature = "parallel")]
    fn run<F, B>(&self, functions: &[F], build_one: B) -> Result<Vec<Buckets>>
    where
        F: Sync,
        B: Fn((usize, &F)) -> Result<Buckets> + Send + Sync,
    {
        use rayon::prelude::*;

        let par = || -> Result<Vec<Buckets>> {
            functions.par_iter().enumerate().map(&build_one).collect()
        };
        match self.num_setup_threads {
            1 => functions.iter().enumerate().map(&build_one).collect(),
            0 => par(),
            n => {
                let pool = rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build()
                    .map_err(|e| {
                        LshError::invalid(format!("cannot start {n} setup threads: {e}"))
                    })?;
                pool.install(par)
            }
        }
    }

    #[cfg(not(feature = "parallel"))]
    fn run<F, B>(&self, functions: &[F], build_one: B) -> Result<Vec<Buckets>>
    where
        B: Fn((usize, &F)) -> Result<Buckets>,
    {
        functions.iter().enumerate().map(build_one).collect()
    }
}
