//! Element-width dispatch.
//!
//! [`AnyLshIndex`] is chosen when the element width of the data is only known
//! at run time. It fixes its width at `fit` from the dataset, then rejects
//! queries of the other width with [`LshError::ElementTypeMismatch`].

use crate::dataset::Dataset;
use crate::error::{LshError, Result};
use crate::index::LshIndex;
use crate::params::LshParams;
use crate::scalar::ElementType;
use crate::stats::QueryStatistics;

/// A dataset of either width, owned.
#[derive(Debug, Clone, PartialEq)]
pub enum AnyDataset {
    F32(Dataset<f32>),
    F64(Dataset<f64>),
}

impl AnyDataset {
    pub fn element_type(&self) -> ElementType {
        match self {
            AnyDataset::F32(_) => ElementType::F32,
            AnyDataset::F64(_) => ElementType::F64,
        }
    }
}

impl From<Dataset<f32>> for AnyDataset {
    fn from(d: Dataset<f32>) -> Self {
        AnyDataset::F32(d)
    }
}

impl From<Dataset<f64>> for AnyDataset {
    fn from(d: Dataset<f64>) -> Self {
        AnyDataset::F64(d)
    }
}

/// A flat row-major buffer of either width, borrowed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DatasetRef<'a> {
    F32(&'a [f32]),
    F64(&'a [f64]),
}

impl DatasetRef<'_> {
    /// Copy into an owned dataset of `dimension` columns.
    pub fn to_dataset(self, dimension: usize) -> Result<AnyDataset> {
        Ok(match self {
            DatasetRef::F32(d) => AnyDataset::F32(Dataset::from_flat(d.to_vec(), dimension)?),
            DatasetRef::F64(d) => AnyDataset::F64(Dataset::from_flat(d.to_vec(), dimension)?),
        })
    }
}

/// A query vector of either width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryRef<'a> {
    F32(&'a [f32]),
    F64(&'a [f64]),
}

impl QueryRef<'_> {
    pub fn element_type(&self) -> ElementType {
        match self {
            QueryRef::F32(_) => ElementType::F32,
            QueryRef::F64(_) => ElementType::F64,
        }
    }
}

impl<'a> From<&'a [f32]> for QueryRef<'a> {
    fn from(q: &'a [f32]) -> Self {
        QueryRef::F32(q)
    }
}

impl<'a> From<&'a [f64]> for QueryRef<'a> {
    fn from(q: &'a [f64]) -> Self {
        QueryRef::F64(q)
    }
}

/// Near-neighbor threshold of either width.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    F32(f32),
    F64(f64),
}

impl Threshold {
    pub fn element_type(&self) -> ElementType {
        match self {
            Threshold::F32(_) => ElementType::F32,
            Threshold::F64(_) => ElementType::F64,
        }
    }
}

#[derive(Debug)]
enum Inner {
    F32(LshIndex<f32>),
    F64(LshIndex<f64>),
}

/// An [`LshIndex`] whose element width is picked by the fitted dataset.
#[derive(Debug)]
pub struct AnyLshIndex {
    params: LshParams,
    inner: Option<Inner>,
}

/// Run `$body` against the typed index, binding the query of matching width
/// to `$q`; otherwise fail with `ElementTypeMismatch`.
macro_rules! dispatch {
    ($self:ident, $query:expr, |$index:ident, $q:ident| $body:expr) => {{
        let query: QueryRef<'_> = $query;
        match ($self.inner()?, query) {
            (Inner::F32($index), QueryRef::F32($q)) => $body,
            (Inner::F64($index), QueryRef::F64($q)) => $body,
            (inner, query) => Err(LshError::ElementTypeMismatch {
                expected: inner.element_type(),
                found: query.element_type(),
            }),
        }
    }};
}

impl Inner {
    fn element_type(&self) -> ElementType {
        match self {
            Inner::F32(_) => ElementType::F32,
            Inner::F64(_) => ElementType::F64,
        }
    }
}

impl AnyLshIndex {
    /// Validate `params`; the element width is decided by [`fit`](Self::fit).
    pub fn new(params: LshParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            inner: None,
        })
    }

    pub fn fit(&mut self, dataset: impl Into<AnyDataset>) -> Result<()> {
        if self.inner.is_some() {
            return Err(LshError::AlreadyFitted);
        }
        let inner = match dataset.into() {
            AnyDataset::F32(d) => Inner::F32(LshIndex::build(self.params.clone(), d)?),
            AnyDataset::F64(d) => Inner::F64(LshIndex::build(self.params.clone(), d)?),
        };
        self.inner = Some(inner);
        Ok(())
    }

    pub fn params(&self) -> &LshParams {
        &self.params
    }

    pub fn is_fitted(&self) -> bool {
        self.inner.is_some()
    }

    /// Width of the fitted data, `None` before `fit`.
    pub fn element_type(&self) -> Option<ElementType> {
        self.inner.as_ref().map(Inner::element_type)
    }

    pub fn num_points(&self) -> usize {
        match &self.inner {
            Some(Inner::F32(i)) => i.num_points(),
            Some(Inner::F64(i)) => i.num_points(),
            None => 0,
        }
    }

    fn inner(&self) -> Result<&Inner> {
        self.inner.as_ref().ok_or(LshError::NotFitted)
    }

    fn inner_mut(&mut self) -> Result<&mut Inner> {
        self.inner.as_mut().ok_or(LshError::NotFitted)
    }

    pub fn find_nearest_neighbor<'a>(&self, query: impl Into<QueryRef<'a>>) -> Result<Option<u32>> {
        dispatch!(self, query.into(), |index, q| index.find_nearest_neighbor(q))
    }

    pub fn find_k_nearest_neighbors<'a>(
        &self,
        query: impl Into<QueryRef<'a>>,
        k: usize,
    ) -> Result<Vec<u32>> {
        dispatch!(self, query.into(), |index, q| index.find_k_nearest_neighbors(q, k))
    }

    /// Near neighbors; the threshold must have the query's width.
    pub fn find_near_neighbors<'a>(
        &self,
        query: impl Into<QueryRef<'a>>,
        threshold: Threshold,
    ) -> Result<Vec<u32>> {
        let query = query.into();
        match (self.inner()?, query, threshold) {
            (Inner::F32(index), QueryRef::F32(q), Threshold::F32(t)) => index.find_near_neighbors(q, t),
            (Inner::F64(index), QueryRef::F64(q), Threshold::F64(t)) => index.find_near_neighbors(q, t),
            (inner, query, threshold) => {
                let expected = inner.element_type();
                let found = if query.element_type() != expected {
                    query.element_type()
                } else {
                    threshold.element_type()
                };
                Err(LshError::ElementTypeMismatch { expected, found })
            }
        }
    }

    pub fn get_candidates_with_duplicates<'a>(
        &self,
        query: impl Into<QueryRef<'a>>,
    ) -> Result<Vec<u32>> {
        dispatch!(self, query.into(), |index, q| index.get_candidates_with_duplicates(q))
    }

    pub fn get_unique_candidates<'a>(&self, query: impl Into<QueryRef<'a>>) -> Result<Vec<u32>> {
        dispatch!(self, query.into(), |index, q| index.get_unique_candidates(q))
    }

    pub fn get_unique_sorted_candidates<'a>(
        &self,
        query: impl Into<QueryRef<'a>>,
    ) -> Result<Vec<u32>> {
        dispatch!(self, query.into(), |index, q| index.get_unique_sorted_candidates(q))
    }

    pub fn set_num_probes(&mut self, n: usize) -> Result<()> {
        if n < self.params.num_tables {
            return Err(LshError::invalid(format!(
                "number of probes must be at least the number of tables ({}), got {n}",
                self.params.num_tables
            )));
        }
        match self.inner_mut()? {
            Inner::F32(i) => i.set_num_probes(n),
            Inner::F64(i) => i.set_num_probes(n),
        }
    }

    pub fn get_num_probes(&self) -> Result<usize> {
        match self.inner()? {
            Inner::F32(i) => i.get_num_probes(),
            Inner::F64(i) => i.get_num_probes(),
        }
    }

    pub fn set_max_num_candidates(&mut self, n: Option<usize>) -> Result<()> {
        match self.inner_mut()? {
            Inner::F32(i) => i.set_max_num_candidates(n),
            Inner::F64(i) => i.set_max_num_candidates(n),
        }
    }

    pub fn get_max_num_candidates(&self) -> Result<Option<usize>> {
        match self.inner()? {
            Inner::F32(i) => i.get_max_num_candidates(),
            Inner::F64(i) => i.get_max_num_candidates(),
        }
    }

    /// Zero before `fit`.
    pub fn get_query_statistics(&self) -> QueryStatistics {
        match &self.inner {
            Some(Inner::F32(i)) => i.get_query_statistics(),
            Some(Inner::F64(i)) => i.get_query_statistics(),
            None => QueryStatistics::default(),
        }
    }

    pub fn reset_query_statistics(&self) {
        match &self.inner {
            Some(Inner::F32(i)) => i.reset_query_statistics(),
            Some(Inner::F64(i)) => i.reset_query_statistics(),
            None => {}
        }
    }
}
