//! Ranked multiprobe sequences.
//!
//! A table's bucket code is the concatenation of k elementary hash symbols.
//! Besides its own symbol, each elementary hash offers *alternatives*, each
//! with a cost: how far the query would have to move to land on that symbol.
//! A probe picks, for every elementary hash, either its own symbol (cost 0)
//! or one alternative; its cost is the sum of the picked costs.
//!
//! [`ProbeSequence`] yields probes in non-decreasing cost, starting with the
//! query's own bucket. Enumeration follows Lv et al.: functions are ordered by
//! their cheapest alternative and every perturbation is reached from exactly
//! one parent through one of three moves:
//!
//! ```text
//! bump:   last pick (p, r)           -> (p, r + 1)
//! expand: last pick (p, r)           -> (p, r), (p + 1, 0)
//! shift:  last pick (p, 0)           -> (p + 1, 0)
//! ```
//!
//! Each move never decreases cost, so a min-heap keyed by cost emits
//! perturbations in order. Ties are broken by generation order, which makes
//! the sequence a deterministic function of the query.
//!
//! # References
//!
//! - Lv, Josephson, Wang, Charikar, Li (2007): "Multi-probe LSH: efficient
//!   indexing for high-dimensional similarity search"
//! - Andoni, Indyk, Laarhoven, Razenshteyn, Schmidt (2015): "Practical and
//!   optimal LSH for angular distance"

use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// An alternative symbol for one elementary hash and the cost of using it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Alternative {
    pub symbol: u64,
    pub cost: f64,
}

/// Output of one elementary hash evaluated on a query.
#[derive(Debug, Clone)]
pub struct ElementaryHash {
    /// The query's own symbol.
    pub symbol: u64,
    /// Bits this symbol occupies in the code.
    pub width: u32,
    /// Every other symbol, in any order.
    pub alternatives: Vec<Alternative>,
}

/// A bucket to visit and its rank key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Probe {
    pub code: u64,
    pub cost: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Pick {
    /// Position in `ProbeSequence::order`.
    pos: u32,
    /// Index into that function's sorted alternatives.
    rank: u32,
}

#[derive(Debug, Clone)]
struct Perturbation {
    cost: f64,
    serial: u64,
    picks: SmallVec<[Pick; 4]>,
}

impl PartialEq for Perturbation {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Perturbation {}

impl PartialOrd for Perturbation {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Perturbation {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse for cheapest first.
        self.cost
            .total_cmp(&other.cost)
            .then(self.serial.cmp(&other.serial))
            .reverse()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Home,
    Perturb,
}

/// Lazily produced, ranked sequence of bucket codes for one query in one table.
///
/// Finite: it ends after every combination of symbols has been produced.
#[derive(Debug, Clone)]
pub struct ProbeSequence {
    home_code: u64,
    shifts: SmallVec<[u32; 8]>,
    masks: SmallVec<[u64; 8]>,
    alternatives: Vec<Vec<Alternative>>,
    order: Vec<usize>,
    heap: BinaryHeap<Perturbation>,
    stage: Stage,
    serial: u64,
}

impl ProbeSequence {
    /// Assemble a sequence from elementary hashes, first function in the
    /// lowest bits.
    pub fn new(functions: Vec<ElementaryHash>) -> Self {
        let mut shifts = SmallVec::with_capacity(functions.len());
        let mut masks = SmallVec::with_capacity(functions.len());
        let mut alternatives = Vec::with_capacity(functions.len());
        let mut home_code = 0u64;
        let mut shift = 0u32;
        for f in functions {
            debug_assert!(f.width >= 1 && shift + f.width <= u64::BITS);
            let mask = if f.width >= u64::BITS {
                u64::MAX
            } else {
                ((1u64 << f.width) - 1) << shift
            };
            home_code |= (f.symbol << shift) & mask;
            shifts.push(shift);
            masks.push(mask);
            alternatives.push(f.alternatives);
            shift += f.width;
        }
        Self {
            home_code,
            shifts,
            masks,
            alternatives,
            order: Vec::new(),
            heap: BinaryHeap::new(),
            stage: Stage::Home,
            serial: 0,
        }
    }

    /// The query's own bucket code.
    pub fn home_code(&self) -> u64 {
        self.home_code
    }

    /// Sort alternatives and order functions by their cheapest one.
    fn prepare(&mut self) {
        for alts in &mut self.alternatives {
            alts.sort_by(|a, b| a.cost.total_cmp(&b.cost).then(a.symbol.cmp(&b.symbol)));
        }
        let mut order: Vec<usize> = (0..self.alternatives.len())
            .filter(|&f| !self.alternatives[f].is_empty())
            .collect();
        order.sort_by(|&a, &b| {
            self.alternatives[a][0]
                .cost
                .total_cmp(&self.alternatives[b][0].cost)
                .then(a.cmp(&b))
        });
        self.order = order;
        if !self.order.is_empty() {
            self.push(SmallVec::from_slice(&[Pick { pos: 0, rank: 0 }]));
        }
    }

    fn alternative(&self, pick: Pick) -> &Alternative {
        &self.alternatives[self.order[pick.pos as usize]][pick.rank as usize]
    }

    fn push(&mut self, picks: SmallVec<[Pick; 4]>) {
        let cost = picks.iter().map(|&p| self.alternative(p).cost).sum();
        self.serial += 1;
        self.heap.push(Perturbation {
            cost,
            serial: self.serial,
            picks,
        });
    }

    fn push_successors(&mut self, picks: &SmallVec<[Pick; 4]>) {
        let Some(&last) = picks.last() else {
            return;
        };
        let depth = self.alternatives[self.order[last.pos as usize]].len();

        if (last.rank as usize) + 1 < depth {
            let mut bumped = picks.clone();
            if let Some(p) = bumped.last_mut() {
                p.rank += 1;
            }
            self.push(bumped);
        }

        if (last.pos as usize) + 1 < self.order.len() {
            let next = Pick {
                pos: last.pos + 1,
                rank: 0,
            };
            let mut expanded = picks.clone();
            expanded.push(next);
            self.push(expanded);

            if last.rank == 0 {
                let mut shifted = picks.clone();
                if let Some(p) = shifted.last_mut() {
                    *p = next;
                }
                self.push(shifted);
            }
        }
    }

    fn code_of(&self, picks: &[Pick]) -> u64 {
        let mut code = self.home_code;
        for &pick in picks {
            let f = self.order[pick.pos as usize];
            let symbol = self.alternative(pick).symbol;
            code = (code & !self.masks[f]) | ((symbol << self.shifts[f]) & self.masks[f]);
        }
        code
    }
}

impl Iterator for ProbeSequence {
    type Item = Probe;

    fn next(&mut self) -> Option<Probe> {
        match self.stage {
            Stage::Home => {
                self.stage = Stage::Perturb;
                self.prepare();
                Some(Probe {
                    code: self.home_code,
                    cost: 0.0,
                })
            }
            Stage::Perturb => {
                let p = self.heap.pop()?;
                self.push_successors(&p.picks);
                Some(Probe {
                    code: self.code_of(&p.picks),
                    cost: p.cost,
                })
            }
        }
    }
}
