//! Cross-polytope LSH (Terasawa & Tanaka 2007; Andoni et al. 2015).
//!
//! Each elementary hash rotates the vector and returns the closest vertex of
//! the cross-polytope `{±e_1, ..., ±e_d}`:
//!
//! ```text
//! h(x) = argmax_{v ∈ {±e_j}} <v, R x>
//! ```
//!
//! A true random rotation costs O(d²). Instead `R` is a product of
//! `num_rotations` pseudo-random rotations `H D`, where `D` is a random ±1
//! diagonal and `H` the Walsh-Hadamard transform; the vector is zero-padded to
//! the next power of two first. Each rotation is O(d log d).
//!
//! Vertex `+e_j` is symbol `j` and `-e_j` is symbol `j + cp_dim`, so one hash
//! occupies `log2(cp_dim) + 1` bits. The last hash of a table may use a
//! smaller `cp_dim` (only the first coordinates of the rotated vector) so a
//! code can carry a number of bits that is not a multiple of the full width.
//!
//! Using vertex `v` instead of the winner is ranked by
//! `(<v_best, Rx> - <v, Rx>)^2`.

use super::probe::{Alternative, ElementaryHash, ProbeSequence};
use super::LshFunction;
use crate::error::Result;
use crate::scalar::Scalar;
use crate::simd;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// k cross-polytope hashes sharing one rotation dimension.
#[derive(Debug, Clone)]
pub struct CrossPolytopeHash<T> {
    dimension: usize,
    rotation_dim: usize,
    hash_length: usize,
    num_rotations: usize,
    last_cp_dimension: usize,
    /// `hash_length x num_rotations x rotation_dim` random signs.
    diagonals: Vec<T>,
}

impl<T: Scalar> CrossPolytopeHash<T> {
    /// Draw `hash_length` hashes. `last_cp_dimension` must be a power of two no
    /// larger than `dimension.next_power_of_two()`.
    pub fn new(
        dimension: usize,
        hash_length: usize,
        num_rotations: usize,
        last_cp_dimension: usize,
        seed: u64,
    ) -> Self {
        let rotation_dim = dimension.max(1).next_power_of_two();
        debug_assert!(last_cp_dimension.is_power_of_two() && last_cp_dimension <= rotation_dim);
        let mut rng = StdRng::seed_from_u64(seed);
        let diagonals = (0..hash_length * num_rotations * rotation_dim)
            .map(|_| {
                if rng.random::<bool>() {
                    T::one()
                } else {
                    -T::one()
                }
            })
            .collect();
        Self {
            dimension,
            rotation_dim,
            hash_length,
            num_rotations,
            last_cp_dimension,
            diagonals,
        }
    }

    /// Number of coordinates hash `j` chooses among.
    fn cp_dim(&self, j: usize) -> usize {
        if j + 1 == self.hash_length {
            self.last_cp_dimension
        } else {
            self.rotation_dim
        }
    }

    fn width(&self, j: usize) -> u32 {
        self.cp_dim(j).trailing_zeros() + 1
    }

    /// Apply the rotations of hash `j` to `x`, writing into `buf`. `x` must
    /// have `dimension` elements.
    fn rotate(&self, j: usize, x: &[T], buf: &mut [T]) {
        let (head, tail) = buf.split_at_mut(self.dimension);
        head.copy_from_slice(x);
        tail.fill(T::zero());
        let block = self.num_rotations * self.rotation_dim;
        let signs = &self.diagonals[j * block..(j + 1) * block];
        for diag in signs.chunks_exact(self.rotation_dim) {
            for (b, s) in buf.iter_mut().zip(diag) {
                *b = *b * *s;
            }
            simd::fwht(buf);
        }
    }

    /// `(symbol, coordinate, |value|)` of the closest vertex among the first
    /// `cp_dim` coordinates. Ties go to the lowest coordinate.
    fn closest_vertex(rotated: &[T], cp_dim: usize) -> (u64, usize, T) {
        let mut best = 0;
        let mut best_abs = rotated[0].abs();
        for (i, v) in rotated.iter().enumerate().take(cp_dim).skip(1) {
            let a = v.abs();
            if a > best_abs {
                best = i;
                best_abs = a;
            }
        }
        let symbol = if rotated[best] >= T::zero() {
            best as u64
        } else {
            (best + cp_dim) as u64
        };
        (symbol, best, best_abs)
    }

    fn hash_with_buffer(&self, x: &[T], buf: &mut [T]) -> u64 {
        let mut code = 0u64;
        let mut shift = 0u32;
        for j in 0..self.hash_length {
            self.rotate(j, x, buf);
            let (symbol, _, _) = Self::closest_vertex(buf, self.cp_dim(j));
            code |= symbol << shift;
            shift += self.width(j);
        }
        code
    }
}

impl<T: Scalar> LshFunction<T> for CrossPolytopeHash<T> {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn hash_length(&self) -> usize {
        self.hash_length
    }

    fn hash(&self, x: &[T]) -> Result<u64> {
        self.check_dimension(x)?;
        let mut buf = vec![T::zero(); self.rotation_dim];
        Ok(self.hash_with_buffer(x, &mut buf))
    }

    fn hash_rows<'a, I>(&self, rows: I) -> Result<Vec<u64>>
    where
        I: IntoIterator<Item = &'a [T]>,
    {
        let mut buf = vec![T::zero(); self.rotation_dim];
        rows.into_iter()
            .map(|row| {
                self.check_dimension(row)?;
                Ok(self.hash_with_buffer(row, &mut buf))
            })
            .collect()
    }

    fn probe_sequence(&self, x: &[T]) -> Result<ProbeSequence> {
        self.check_dimension(x)?;
        let mut buf = vec![T::zero(); self.rotation_dim];
        let functions = (0..self.hash_length)
            .map(|j| {
                self.rotate(j, x, &mut buf);
                let cp_dim = self.cp_dim(j);
                let (symbol, _, best_abs) = Self::closest_vertex(&buf, cp_dim);
                let best = best_abs.as_f64();
                let mut alternatives = Vec::with_capacity(2 * cp_dim - 1);
                for (i, v) in buf.iter().take(cp_dim).enumerate() {
                    let v = v.as_f64();
                    for (s, ip) in [(i, v), (i + cp_dim, -v)] {
                        let s = s as u64;
                        if s != symbol {
                            let gap = best - ip;
                            alternatives.push(Alternative {
                                symbol: s,
                                cost: gap * gap,
                            });
                        }
                    }
                }
                ElementaryHash {
                    symbol,
                    width: self.width(j),
                    alternatives,
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
    use std::collections::HashSet;

    #[test]
    fn rotation_preserves_norm_up_to_scale() {
        let h = CrossPolytopeHash::<f64>::new(5, 1, 3, 8, 17);
        let x = [0.5_f64, -1.0, 2.0, 0.25, 1.5];
        let mut buf = vec![0.0; 8];
        h.rotate(0, &x, &mut buf);
        let before = simd::dot(&x, &x);
        let after = simd::dot(&buf, &buf);
        // each unnormalized transform scales squared norm by 8
        assert!((after - before * 8f64.powi(3)).abs() < 1e-6 * after);
    }

    #[test]
    fn code_fits_declared_width() {
        // rotation dim 16 -> 5 bits, last hash cp_dim 4 -> 3 bits
        let h = CrossPolytopeHash::<f32>::new(16, 3, 2, 4, 5);
        for s in 0..100 {
            let x: Vec<f32> = (0..16).map(|i| ((s * 16 + i) as f32 * 0.31).sin()).collect();
            assert!(h.hash(&x).unwrap() < 1 << 13);
        }
    }

    #[test]
    fn positive_scaling_keeps_code() {
        let h = CrossPolytopeHash::<f64>::new(12, 2, 2, 16, 23);
        let x: Vec<f64> = (0..12).map(|i| (i as f64 * 1.3).cos()).collect();
        let scaled: Vec<f64> = x.iter().map(|v| v * 4.5).collect();
        assert_eq!(h.hash(&x).unwrap(), h.hash(&scaled).unwrap());
    }

    #[test]
    fn hash_rows_matches_hash() {
        let h = CrossPolytopeHash::<f32>::new(6, 2, 1, 8, 3);
        let rows: Vec<Vec<f32>> = (0..20)
            .map(|s| (0..6).map(|i| ((s * 6 + i) as f32).sin()).collect())
            .collect();
        let batch = h.hash_rows(rows.iter().map(|r| r.as_slice())).unwrap();
        for (row, code) in rows.iter().zip(batch) {
            assert_eq!(h.hash(row).unwrap(), code);
        }
    }

    #[test]
    fn probes_cover_all_vertices_of_single_hash() {
        // one hash over 4 coordinates: 8 vertices
        let h = CrossPolytopeHash::<f64>::new(4, 1, 1, 4, 8);
        let x = [0.9_f64, -0.2, 0.4, 0.1];
        let probes = h.enumerate_probes(&x, 100).unwrap();
        assert_eq!(probes.len(), 8);
        assert_eq!(probes[0], h.hash(&x).unwrap());
        let distinct: HashSet<u64> = probes.iter().copied().collect();
        assert_eq!(distinct.len(), 8);
    }

    #[test]
    fn opposite_vertex_is_probed_last() {
        let h = CrossPolytopeHash::<f64>::new(4, 1, 1, 4, 8);
        let x = [0.9_f64, -0.2, 0.4, 0.1];
        let probes = h.enumerate_probes(&x, 8).unwrap();
        let home = probes[0];
        let opposite = if home < 4 { home + 4 } else { home - 4 };
        assert_eq!(*probes.last().unwrap(), opposite);
    }

    #[test]
    fn wrong_length_is_a_dimension_mismatch() {
        let h = CrossPolytopeHash::<f32>::new(4, 2, 1, 4, 1);
        let short = [0.5_f32, 1.0, -1.0];
        let expected = LshError::DimensionMismatch {
            expected: 4,
            found: 3,
        };
        assert_eq!(h.enumerate_probes(&short, 3).unwrap_err(), expected);
        assert_eq!(h.hash(&short).unwrap_err(), expected);
        assert!(h.hash(&[0.0; 6]).is_err());
        let rows = [[0.1_f32; 4].as_slice(), short.as_slice()];
        assert_eq!(h.hash_rows(rows).unwrap_err(), expected);
    }
}
