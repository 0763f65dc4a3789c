//! Random hyperplane LSH (Charikar 2002).
//!
//! Each elementary hash is the side of a random Gaussian hyperplane through
//! the origin the vector falls on:
//!
//! ```text
//! h_i(x) = [<r_i, x> > 0],      P[h_i(a) = h_i(b)] = 1 - θ(a,b)/π
//! ```
//!
//! Flipping bit i is ranked by `<r_i, x>^2`: a query close to hyperplane i is
//! the most likely to have true neighbors on the other side.

use super::probe::{Alternative, ElementaryHash, ProbeSequence};
use super::LshFunction;
use crate::error::Result;
use crate::scalar::Scalar;
use crate::simd;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

/// k random hyperplanes; the code is one bit per hyperplane.
#[derive(Debug, Clone)]
pub struct HyperplaneHash<T> {
    /// Row-major `hash_length x dimension`.
    planes: Vec<T>,
    dimension: usize,
    hash_length: usize,
}

impl<T: Scalar> HyperplaneHash<T> {
    /// Draw `hash_length` hyperplanes in `dimension` dimensions.
    ///
    /// `hash_length` must be at most 64.
    pub fn new(dimension: usize, hash_length: usize, seed: u64) -> Self {
        debug_assert!(hash_length <= u64::BITS as usize);
        let mut rng = StdRng::seed_from_u64(seed);
        let planes = (0..dimension * hash_length)
            .map(|_| {
                let v: f64 = rng.sample(StandardNormal);
                T::from_f64_lossy(v)
            })
            .collect();
        Self {
            planes,
            dimension,
            hash_length,
        }
    }

    fn projections<'a>(&'a self, x: &'a [T]) -> impl Iterator<Item = T> + 'a {
        self.planes
            .chunks_exact(self.dimension)
            .map(move |plane| simd::dot(plane, x))
    }
}

impl<T: Scalar> LshFunction<T> for HyperplaneHash<T> {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn hash_length(&self) -> usize {
        self.hash_length
    }

    fn hash(&self, x: &[T]) -> Result<u64> {
        self.check_dimension(x)?;
        Ok(self
            .projections(x)
            .enumerate()
            .fold(0u64, |code, (i, p)| {
                if p > T::zero() {
                    code | (1 << i)
                } else {
                    code
                }
            }))
    }

    fn probe_sequence(&self, x: &[T]) -> Result<ProbeSequence> {
        self.check_dimension(x)?;
        let functions = self
            .projections(x)
            .map(|p| {
                let side = u64::from(p > T::zero());
                let p = p.as_f64();
                ElementaryHash {
                    symbol: side,
                    width: 1,
                    alternatives: vec![Alternative {
                        symbol: side ^ 1,
                        cost: p * p,
                    }],
                }
            })
            .collect();
        Ok(ProbeSequence::new(functions))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LshError;

    #[test]
    fn same_seed_same_code() {
        let a = HyperplaneHash::<f32>::new(16, 12, 7);
        let b = HyperplaneHash::<f32>::new(16, 12, 7);
        let x: Vec<f32> = (0..16).map(|i| (i as f32).sin()).collect();
        assert_eq!(a.hash(&x).unwrap(), b.hash(&x).unwrap());
    }

    #[test]
    fn code_uses_only_hash_length_bits() {
        let h = HyperplaneHash::<f64>::new(8, 5, 1);
        for s in 0..50 {
            let x: Vec<f64> = (0..8).map(|i| ((s * 8 + i) as f64 * 0.77).cos()).collect();
            assert!(h.hash(&x).unwrap() < 32);
        }
    }

    #[test]
    fn negated_vector_flips_every_bit() {
        let h = HyperplaneHash::<f64>::new(8, 10, 3);
        let x: Vec<f64> = (0..8).map(|i| i as f64 - 3.5).collect();
        let neg: Vec<f64> = x.iter().map(|v| -v).collect();
        assert_eq!(h.hash(&x).unwrap() ^ h.hash(&neg).unwrap(), (1 << 10) - 1);
    }

    #[test]
    fn probes_start_at_hash() {
        let h = HyperplaneHash::<f32>::new(4, 6, 11);
        let x = [0.3_f32, -1.2, 0.8, 0.05];
        let probes = h.enumerate_probes(&x, 10).unwrap();
        assert_eq!(probes.len(), 10);
        assert_eq!(probes[0], h.hash(&x).unwrap());
    }

    #[test]
    fn probe_count_is_bounded_by_code_space() {
        let h = HyperplaneHash::<f32>::new(3, 3, 5);
        let x = [1.0_f32, 2.0, 3.0];
        assert_eq!(h.enumerate_probes(&x, 100).unwrap().len(), 8);
    }

    #[test]
    fn second_probe_flips_closest_hyperplane() {
        let h = HyperplaneHash::<f64>::new(6, 8, 99);
        let x = [0.4_f64, -0.1, 0.9, 0.3, -0.7, 0.2];
        let projections: Vec<f64> = h.projections(&x).collect();
        let closest = projections
            .iter()
            .enumerate()
            .min_by(|a, b| (a.1 * a.1).total_cmp(&(b.1 * b.1)))
            .map(|(i, _)| i)
            .unwrap();
        let probes = h.enumerate_probes(&x, 2).unwrap();
        assert_eq!(probes[0] ^ probes[1], 1 << closest);
    }

    #[test]
    fn short_input_is_a_dimension_mismatch() {
        let h = HyperplaneHash::<f32>::new(4, 6, 1);
        let short = [1.0_f32, -2.0, 0.5];
        let err = h.hash(&short).unwrap_err();
        assert_eq!(
            err,
            LshError::DimensionMismatch {
                expected: 4,
                found: 3
            }
        );
        assert_eq!(h.enumerate_probes(&short, 3).unwrap_err(), err);
        assert!(h.hash(&[0.0; 5]).is_err());
    }
}
