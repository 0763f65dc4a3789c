//! Distance functions used for exact re-ranking.
//!
//! Both functions are "smaller is closer": [`DistanceFunction::NegativeInnerProduct`]
//! returns $-\langle a,b\rangle$ so that maximum inner product search becomes a
//! minimization like everything else.

use crate::error::LshError;
use crate::scalar::Scalar;
use crate::simd;
use std::fmt;
use std::str::FromStr;

/// Distance used to rank candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DistanceFunction {
    /// Squared Euclidean distance $\|a-b\|^2$.
    #[default]
    EuclideanSquared,
    /// Negative inner product $-\langle a,b\rangle$.
    NegativeInnerProduct,
}

impl DistanceFunction {
    /// Compute the distance between two vectors of equal length.
    #[inline]
    #[must_use]
    pub fn distance<T: Scalar>(self, a: &[T], b: &[T]) -> T {
        match self {
            DistanceFunction::EuclideanSquared => simd::l2_distance_squared(a, b),
            DistanceFunction::NegativeInnerProduct => -simd::dot(a, b),
        }
    }

    /// Whether a computed distance passes a near-neighbor threshold.
    ///
    /// For `EuclideanSquared` the threshold bounds the distance from above.
    /// For `NegativeInnerProduct` the threshold is a similarity: a point
    /// qualifies when its inner product with the query is at least `threshold`.
    #[inline]
    #[must_use]
    pub fn within<T: Scalar>(self, distance: T, threshold: T) -> bool {
        match self {
            DistanceFunction::EuclideanSquared => distance <= threshold,
            DistanceFunction::NegativeInnerProduct => -distance >= threshold,
        }
    }

    /// Canonical lowercase name, as accepted by [`FromStr`].
    pub fn as_str(self) -> &'static str {
        match self {
            DistanceFunction::EuclideanSquared => "euclidean_squared",
            DistanceFunction::NegativeInnerProduct => "negative_inner_product",
        }
    }
}

impl fmt::Display for DistanceFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceFunction {
    type Err = LshError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "euclidean_squared" => Ok(DistanceFunction::EuclideanSquared),
            "negative_inner_product" => Ok(DistanceFunction::NegativeInnerProduct),
            other => Err(LshError::invalid(format!(
                "unrecognized distance function {other:?}"
            ))),
        }
    }
}
