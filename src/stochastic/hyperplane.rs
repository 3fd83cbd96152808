//! Cut representation and predicates.
//!
//! A [`Hyperplane`] is an immutable, affine lower bound on either the
//! recourse function (optimality / feasibility cuts) or the first-stage
//! feasible region (linear constraints ingested at setup). [`Unbounded`] and
//! [`Infeasible`] are pure signals and carry no coefficients.

use crate::E;
use crate::stochastic::error::ShapeError;

/// The kind of cut a [`Hyperplane`] represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HyperplaneKind {
    /// Lower-bounds the recourse value of subproblem `id` via `theta_id`.
    Optimality,
    /// Excludes first-stage points that make subproblem `id` infeasible.
    Feasibility,
    /// A first-stage row ingested directly from the problem data.
    LinearConstraint,
    /// Signals that a subproblem is unbounded at the queried point.
    Unbounded,
    /// Signals that the master model itself is infeasible.
    Infeasible,
}

/// A single cut: `indices`/`values` give a sparse gradient `dQ`, `rhs` is `q`.
///
/// `id` identifies the subproblem (for `Optimality`/`Feasibility`) or is
/// unused (`0`) for `LinearConstraint`/`Unbounded`/`Infeasible`.
#[derive(Debug, Clone)]
pub struct Hyperplane {
    kind: HyperplaneKind,
    indices: Vec<usize>,
    values: Vec<E>,
    rhs: E,
    /// Upper bound on `dQ . x`; `+infinity` for every kind except
    /// `LinearConstraint`, which may ingest a two-sided (but not ranged)
    /// first-stage row.
    ub: E,
    id: usize,
}

impl Hyperplane {
    pub fn optimality(indices: Vec<usize>, values: Vec<E>, rhs: E, id: usize) -> Self {
        Self {
            kind: HyperplaneKind::Optimality,
            indices,
            values,
            rhs,
            ub: E::INFINITY,
            id,
        }
    }

    pub fn feasibility(indices: Vec<usize>, values: Vec<E>, rhs: E, id: usize) -> Self {
        Self {
            kind: HyperplaneKind::Feasibility,
            indices,
            values,
            rhs,
            ub: E::INFINITY,
            id,
        }
    }

    /// A first-stage row `lb <= dQ . x <= ub`. Ranged rows (both bounds
    /// finite and different) are rejected at the call site (L8), not here.
    pub fn linear_constraint(indices: Vec<usize>, values: Vec<E>, lb: E, ub: E) -> Self {
        Self {
            kind: HyperplaneKind::LinearConstraint,
            indices,
            values,
            rhs: lb,
            ub,
            id: 0,
        }
    }

    pub fn unbounded(id: usize) -> Self {
        Self {
            kind: HyperplaneKind::Unbounded,
            indices: Vec::new(),
            values: Vec::new(),
            rhs: 0.0,
            ub: E::INFINITY,
            id,
        }
    }

    pub fn infeasible() -> Self {
        Self {
            kind: HyperplaneKind::Infeasible,
            indices: Vec::new(),
            values: Vec::new(),
            rhs: 0.0,
            ub: E::INFINITY,
            id: 0,
        }
    }

    pub fn kind(&self) -> HyperplaneKind {
        self.kind
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn rhs(&self) -> E {
        self.rhs
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn values(&self) -> &[E] {
        &self.values
    }

    /// Every kind but `Unbounded`/`Infeasible` carries a finite coefficient row.
    pub fn bounded(&self) -> bool {
        !matches!(
            self.kind,
            HyperplaneKind::Unbounded | HyperplaneKind::Infeasible
        )
    }

    fn dot(&self, x: &[E]) -> Result<E, ShapeError> {
        let mut acc = 0.0;
        for (&idx, &val) in self.indices.iter().zip(self.values.iter()) {
            let xi = x.get(idx).copied().ok_or(ShapeError::DqXLength {
                dq: self.indices.iter().copied().max().map_or(0, |m| m + 1),
                x: x.len(),
            })?;
            acc += val * xi;
        }
        Ok(acc)
    }

    /// `(dQ . x, q)` for the generic (non-optimality) cuts.
    pub fn evaluate(&self, x: &[E]) -> Result<(E, E), ShapeError> {
        Ok((self.dot(x)?, self.rhs))
    }

    /// The recourse estimate `Q = q - dQ . x` for an optimality cut at `id`.
    pub fn evaluate_optimality(&self, x: &[E]) -> Result<E, ShapeError> {
        debug_assert_eq!(self.kind, HyperplaneKind::Optimality);
        Ok(self.rhs - self.dot(x)?)
    }

    /// Whether the cut is tight at `(x, theta)` within `tau`.
    ///
    /// `theta` is only consulted for `Optimality` cuts; a `theta` of `None`
    /// (the `-infinity` sentinel not yet populated) is never active.
    pub fn active(&self, x: &[E], theta: Option<E>, tau: E) -> Result<bool, ShapeError> {
        match self.kind {
            HyperplaneKind::Optimality => {
                let q = self.evaluate_optimality(x)?;
                Ok(match theta {
                    Some(theta) => (theta - q).abs() <= tau * (1.0 + q.abs()),
                    None => false,
                })
            }
            _ => {
                let (g, q) = self.evaluate(x)?;
                Ok((g - q).abs() <= tau * (1.0 + g.abs()))
            }
        }
    }

    /// Whether `(x, theta)` satisfies this cut within `tau`.
    pub fn satisfied(&self, x: &[E], theta: Option<E>, tau: E) -> Result<bool, ShapeError> {
        match self.kind {
            HyperplaneKind::Optimality => {
                let q = self.evaluate_optimality(x)?;
                Ok(match theta {
                    Some(theta) => theta >= q - tau * (1.0 + q.abs()),
                    None => false,
                })
            }
            _ => {
                let (g, q) = self.evaluate(x)?;
                Ok(g >= q - tau * (1.0 + g.abs()))
            }
        }
    }

    pub fn violated(&self, x: &[E], theta: Option<E>, tau: E) -> Result<bool, ShapeError> {
        Ok(!self.satisfied(x, theta, tau)?)
    }

    /// How far `(x, theta)` is from satisfying this cut; `+infinity` when the
    /// `theta` sentinel has not yet been populated for an optimality cut.
    pub fn gap(&self, x: &[E], theta: Option<E>) -> Result<E, ShapeError> {
        match self.kind {
            HyperplaneKind::Optimality => {
                let q = self.evaluate_optimality(x)?;
                Ok(match theta {
                    Some(theta) => theta - q,
                    None => E::INFINITY,
                })
            }
            _ => {
                let (g, q) = self.evaluate(x)?;
                Ok(g - q)
            }
        }
    }

    /// Sparse `(indices, values, lb, ub)` row suitable for [`crate::stochastic::adapter::LpAdapter::add_row`].
    ///
    /// For `Optimality`, an extra column `n + id` with coefficient `1.0` is
    /// appended so the row reads `dQ . x + theta_id >= q`.
    pub fn lowlevel(&self, n_master_cols: usize) -> (Vec<usize>, Vec<E>, E, E) {
        match self.kind {
            HyperplaneKind::Optimality => {
                let mut indices = self.indices.clone();
                let mut values = self.values.clone();
                indices.push(n_master_cols + self.id);
                values.push(1.0);
                (indices, values, self.rhs, E::INFINITY)
            }
            _ => (self.indices.clone(), self.values.clone(), self.rhs, self.ub),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optimality_gap_is_infinite_without_theta() {
        let h = Hyperplane::optimality(vec![0, 1], vec![1.0, 1.0], 2.0, 0);
        let gap = h.gap(&[1.0, 1.0], None).unwrap();
        assert!(gap.is_infinite() && gap > 0.0);
    }

    #[test]
    fn optimality_active_and_satisfied() {
        let h = Hyperplane::optimality(vec![0], vec![1.0], 3.0, 0);
        // Q = q - dQ.x = 3 - 1*1 = 2
        assert!(h.satisfied(&[1.0], Some(2.0), 1e-6).unwrap());
        assert!(h.active(&[1.0], Some(2.0), 1e-6).unwrap());
        assert!(!h.satisfied(&[1.0], Some(1.0), 1e-6).unwrap());
    }

    #[test]
    fn linear_constraint_satisfied_ignores_theta() {
        let h = Hyperplane::linear_constraint(vec![0, 1], vec![1.0, 1.0], 1.0, E::INFINITY);
        assert!(h.satisfied(&[0.5, 0.6], None, 1e-6).unwrap());
        assert!(!h.satisfied(&[0.1, 0.1], None, 1e-6).unwrap());
    }

    #[test]
    fn dimension_mismatch_reports_both_sizes() {
        let h = Hyperplane::linear_constraint(vec![5], vec![1.0], 0.0, E::INFINITY);
        let err = h.evaluate(&[0.0, 0.0]).unwrap_err();
        assert_eq!(err, ShapeError::DqXLength { dq: 6, x: 2 });
    }

    #[test]
    fn lowlevel_appends_theta_column_for_optimality() {
        let h = Hyperplane::optimality(vec![0], vec![2.0], 4.0, 3);
        let (indices, values, lb, ub) = h.lowlevel(10);
        assert_eq!(indices, vec![0, 13]);
        assert_eq!(values, vec![2.0, 1.0]);
        assert_eq!(lb, 4.0);
        assert!(ub.is_infinite());
    }

    #[test]
    fn unbounded_and_infeasible_carry_no_coefficients() {
        assert!(!Hyperplane::unbounded(2).bounded());
        assert!(!Hyperplane::infeasible().bounded());
    }
}
