//! Dense vector kernels.
//!
//! Portable implementations written so that the compiler can vectorize them:
//! four independent accumulators break the dependency chain of the reduction.
//!
//! ```rust
//! use nearby::simd::{dot, l2_distance_squared};
//!
//! let a = [1.0_f32, 0.0, 0.0];
//! let b = [0.5_f32, 0.5, 0.0];
//!
//! assert_eq!(dot(&a, &b), 0.5);
//! assert_eq!(l2_distance_squared(&a, &b), 0.5);
//! ```

use crate::scalar::Scalar;

/// Dot product of two vectors of equal length.
#[inline]
#[must_use]
pub fn dot<T: Scalar>(a: &[T], b: &[T]) -> T {
    debug_assert_eq!(a.len(), b.len());
    let mut acc = [T::zero(); 4];
    let chunks_a = a.chunks_exact(4);
    let chunks_b = b.chunks_exact(4);
    let rem_a = chunks_a.remainder();
    let rem_b = chunks_b.remainder();
    for (x, y) in chunks_a.zip(chunks_b) {
        acc[0] += x[0] * y[0];
        acc[1] += x[1] * y[1];
        acc[2] += x[2] * y[2];
        acc[3] += x[3] * y[3];
    }
    let mut tail = T::zero();
    for (x, y) in rem_a.iter().zip(rem_b) {
        tail += *x * *y;
    }
    (acc[0] + acc[1]) + (acc[2] + acc[3]) + tail
}

/// Squared L2 distance (no square root).
#[inline]
#[must_use]
pub fn l2_distance_squared<T: Scalar>(a: &[T], b: &[T]) -> T {
    debug_assert_eq!(a.len(), b.len());
    let mut acc = [T::zero(); 4];
    let chunks_a = a.chunks_exact(4);
    let chunks_b = b.chunks_exact(4);
    let rem_a = chunks_a.remainder();
    let rem_b = chunks_b.remainder();
    for (x, y) in chunks_a.zip(chunks_b) {
        let d0 = x[0] - y[0];
        let d1 = x[1] - y[1];
        let d2 = x[2] - y[2];
        let d3 = x[3] - y[3];
        acc[0] += d0 * d0;
        acc[1] += d1 * d1;
        acc[2] += d2 * d2;
        acc[3] += d3 * d3;
    }
    let mut tail = T::zero();
    for (x, y) in rem_a.iter().zip(rem_b) {
        let d = *x - *y;
        tail += d * d;
    }
    (acc[0] + acc[1]) + (acc[2] + acc[3]) + tail
}

/// L2 norm of a vector.
#[inline]
#[must_use]
pub fn norm<T: Scalar>(v: &[T]) -> T {
    dot(v, v).sqrt()
}

/// In-place unnormalized fast Walsh-Hadamard transform.
///
/// `v.len()` must be a power of two.
pub fn fwht<T: Scalar>(v: &mut [T]) {
    let n = v.len();
    debug_assert!(n.is_power_of_two());
    let mut h = 1;
    while h < n {
        for block in v.chunks_exact_mut(2 * h) {
            let (lo, hi) = block.split_at_mut(h);
            for (x, y) in lo.iter_mut().zip(hi.iter_mut()) {
                let a = *x;
                let b = *y;
                *x = a + b;
                *y = a - b;
            }
        }
        h *= 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dot_basic() {
        let a = [1.0_f32, 2.0, 3.0];
        let b = [4.0_f32, 5.0, 6.0];
        let result = dot(&a, &b);
        assert!((result - 32.0).abs() < 1e-6);
    }

    #[test]
    fn test_dot_unrolled_matches_naive() {
        let a: Vec<f64> = (0..37).map(|i| (i as f64 * 0.37).sin()).collect();
        let b: Vec<f64> = (0..37).map(|i| (i as f64 * 0.11).cos()).collect();
        let naive: f64 = a.iter().zip(&b).map(|(x, y)| x * y).sum();
        assert!((dot(&a, &b) - naive).abs() < 1e-12);
    }

    #[test]
    fn test_norm() {
        let v = [3.0_f32, 4.0];
        assert!((norm(&v) - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_l2_distance_squared() {
        let a = [0.0_f64, 0.0, 0.0, 0.0, 0.0];
        let b = [3.0_f64, 4.0, 0.0, 0.0, 1.0];
        assert_eq!(l2_distance_squared(&a, &b), 26.0);
    }

    #[test]
    fn test_fwht_is_self_inverse_up_to_scale() {
        let original = [1.0_f64, -2.0, 0.5, 3.0, 0.0, 1.0, -1.0, 2.0];
        let mut v = original;
        fwht(&mut v);
        fwht(&mut v);
        for (x, y) in v.iter().zip(original.iter()) {
            assert!((x / 8.0 - y).abs() < 1e-12);
        }
    }

    #[test]
    fn test_fwht_preserves_energy_up_to_scale() {
        let mut v = [1.0_f32, 2.0, 3.0, 4.0];
        let before = dot(&v, &v);
        fwht(&mut v);
        assert!((dot(&v, &v) - 4.0 * before).abs() < 1e-4);
    }
}
