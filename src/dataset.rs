//! Dense row-major datasets.

use crate::error::{LshError, Result};
use crate::scalar::{ElementType, Scalar};

/// Immutable `N x dimension` matrix of vectors, stored row-major in one buffer.
///
/// An index takes ownership of its dataset at `fit` time and never mutates it.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset<T> {
    data: Vec<T>,
    num_points: usize,
    dimension: usize,
}

impl<T: Scalar> Dataset<T> {
    /// Wrap a flat row-major buffer.
    ///
    /// Fails with `InvalidArgument` for `dimension == 0` or when the buffer
    /// length is not a multiple of `dimension`.
    pub fn from_flat(data: Vec<T>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(LshError::invalid("dimension must be positive"));
        }
        if data.len() % dimension != 0 {
            return Err(LshError::invalid(format!(
                "buffer of {} values does not split into rows of {dimension}",
                data.len()
            )));
        }
        Ok(Self {
            num_points: data.len() / dimension,
            data,
            dimension,
        })
    }

    /// Copy rows into a new dataset; every row must have the first row's length.
    pub fn from_rows<R: AsRef<[T]>>(rows: &[R]) -> Result<Self> {
        let dimension = rows.first().map(|r| r.as_ref().len()).unwrap_or(0);
        if dimension == 0 {
            return Err(LshError::invalid("dataset rows must be non-empty"));
        }
        let mut data = Vec::with_capacity(rows.len() * dimension);
        for row in rows {
            let row = row.as_ref();
            if row.len() != dimension {
                return Err(LshError::DimensionMismatch {
                    expected: dimension,
                    found: row.len(),
                });
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            data,
            num_points: rows.len(),
            dimension,
        })
    }

    /// Row `idx`.
    #[inline]
    pub fn row(&self, idx: usize) -> &[T] {
        let start = idx * self.dimension;
        &self.data[start..start + self.dimension]
    }

    /// All rows in order.
    pub fn rows(&self) -> std::slice::ChunksExact<'_, T> {
        self.data.chunks_exact(self.dimension)
    }

    pub fn num_points(&self) -> usize {
        self.num_points
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn is_empty(&self) -> bool {
        self.num_points == 0
    }

    /// The underlying row-major buffer.
    pub fn as_flat(&self) -> &[T] {
        &self.data
    }

    pub fn element_type(&self) -> ElementType {
        T::ELEMENT_TYPE
    }

    /// Approximate heap footprint in bytes.
    pub fn size_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<T>()
    }
}
