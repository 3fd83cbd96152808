//! Cut bundle aggregation: sums groups of `bundle` optimality cuts from
//! distinct subproblems into a single master row, to keep the master model
//! small when the scenario count is large.

use std::collections::HashMap;

use crate::E;
use crate::stochastic::hyperplane::{Hyperplane, HyperplaneKind};

/// Accumulates optimality cuts in groups of `bundle_size`, passing all other
/// cut kinds through unchanged.
pub struct CutBundler {
    bundle_size: usize,
    n_master_cols: usize,
    accumulator: HashMap<usize, E>,
    rhs: E,
    first_id: Option<usize>,
    count: usize,
}

impl CutBundler {
    pub fn new(bundle_size: usize, n_master_cols: usize) -> Self {
        Self {
            bundle_size: bundle_size.max(1),
            n_master_cols,
            accumulator: HashMap::new(),
            rhs: 0.0,
            first_id: None,
            count: 0,
        }
    }

    /// Feeds one cut in; returns any cut(s) ready to be inserted into the
    /// master model (zero, one, or — for non-optimality cuts — exactly one
    /// passthrough alongside a still-accumulating bundle).
    pub fn push(&mut self, cut: Hyperplane) -> Vec<Hyperplane> {
        if self.bundle_size <= 1 || cut.kind() != HyperplaneKind::Optimality {
            return vec![cut];
        }

        for (&idx, &val) in cut.indices().iter().zip(cut.values().iter()) {
            *self.accumulator.entry(idx).or_insert(0.0) += val;
        }
        self.rhs += cut.rhs();
        self.first_id.get_or_insert(cut.id());
        self.count += 1;

        if self.count >= self.bundle_size {
            vec![self.drain_bundle()]
        } else {
            Vec::new()
        }
    }

    /// Flushes any partial bundle at the end of a pass, as long as no
    /// subproblem in it was infeasible (callers only push `Optimality` cuts
    /// here, so a non-empty accumulator always has a finite running q).
    pub fn flush(&mut self) -> Option<Hyperplane> {
        if self.count == 0 {
            None
        } else {
            Some(self.drain_bundle())
        }
    }

    fn drain_bundle(&mut self) -> Hyperplane {
        let id = self.first_id.take().unwrap_or(0);
        let (indices, values): (Vec<usize>, Vec<E>) = self
            .accumulator
            .drain()
            .filter(|(_, v)| *v != 0.0)
            .unzip();
        let rhs = self.rhs;
        self.rhs = 0.0;
        self.count = 0;
        let _ = self.n_master_cols;
        Hyperplane::optimality(indices, values, rhs, id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundle_of_one_passes_through_immediately() {
        let mut bundler = CutBundler::new(1, 3);
        let cut = Hyperplane::optimality(vec![0], vec![1.0], 2.0, 0);
        let out = bundler.push(cut);
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn bundle_of_two_aggregates_then_emits() {
        let mut bundler = CutBundler::new(2, 3);
        let c0 = Hyperplane::optimality(vec![0], vec![1.0], 2.0, 0);
        let c1 = Hyperplane::optimality(vec![0], vec![3.0], 5.0, 1);
        assert!(bundler.push(c0).is_empty());
        let out = bundler.push(c1);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].rhs(), 7.0);
        assert_eq!(out[0].values(), &[4.0]);
    }

    #[test]
    fn partial_bundle_flushed_at_end_of_pass() {
        let mut bundler = CutBundler::new(3, 3);
        let c0 = Hyperplane::optimality(vec![0], vec![1.0], 2.0, 0);
        assert!(bundler.push(c0).is_empty());
        let flushed = bundler.flush();
        assert!(flushed.is_some());
    }

    #[test]
    fn non_optimality_cuts_bypass_the_bundle() {
        let mut bundler = CutBundler::new(4, 3);
        let cut = Hyperplane::feasibility(vec![0], vec![1.0], 0.0, 2);
        let out = bundler.push(cut);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind(), HyperplaneKind::Feasibility);
    }
}
