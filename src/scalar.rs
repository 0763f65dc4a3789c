//! Element types the engine is instantiated at.
//!
//! The index, tables, and query pipeline are written once against
//! [`Scalar`]; `f32` and `f64` are the two concrete widths.

use num_traits::{Float, FromPrimitive, ToPrimitive};
use std::cmp::Ordering;
use std::fmt;
use std::iter::Sum;
use std::ops::AddAssign;

/// Width of the values stored in a dataset or query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ElementType {
    F32,
    F64,
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ElementType::F32 => write!(f, "f32"),
            ElementType::F64 => write!(f, "f64"),
        }
    }
}

/// Floating point element accepted by the index.
pub trait Scalar:
    Float + FromPrimitive + ToPrimitive + AddAssign + Sum + Send + Sync + fmt::Debug + 'static
{
    /// Runtime tag for this width.
    const ELEMENT_TYPE: ElementType;

    /// IEEE 754 total order, so NaN never panics a sort.
    fn total_cmp(&self, other: &Self) -> Ordering;

    /// Lossless-enough widening used for probe costs.
    #[inline]
    fn as_f64(self) -> f64 {
        self.to_f64().unwrap_or(f64::NAN)
    }

    /// Narrowing used when sampling random projections.
    #[inline]
    fn from_f64_lossy(v: f64) -> Self {
        <Self as FromPrimitive>::from_f64(v).unwrap_or_else(Self::nan)
    }
}

impl Scalar for f32 {
    const ELEMENT_TYPE: ElementType = ElementType::F32;

    #[inline]
    fn total_cmp(&self, other: &Self) -> Ordering {
        f32::total_cmp(self, other)
    }

    #[inline]
    fn as_f64(self) -> f64 {
        f64::from(self)
    }

    #[inline]
    fn from_f64_lossy(v: f64) -> Self {
        v as f32
    }
}

impl Scalar for f64 {
    const ELEMENT_TYPE: ElementType = ElementType::F64;

    #[inline]
    fn total_cmp(&self, other: &Self) -> Ordering {
        f64::total_cmp(self, other)
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self
    }

    #[inline]
    fn from_f64_lossy(v: f64) -> Self {
        v
    }
}
