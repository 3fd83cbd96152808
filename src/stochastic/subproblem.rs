//! Second-stage subproblem evaluation: solve one scenario LP at a given
//! first-stage point and emit the cut it implies for the master model.

use crate::E;
use crate::stochastic::adapter::{LpAdapter, SolverStatus};
use crate::stochastic::error::ShapeError;
use crate::stochastic::hyperplane::Hyperplane;

/// A `(row, column, coefficient)` entry describing how a first-stage column
/// enters the right-hand side of a second-stage row: `rhs_row -= coeff * x_column`.
#[derive(Debug, Clone, Copy)]
pub struct MasterTerm {
    pub row: usize,
    pub column: usize,
    pub coeff: E,
}

/// One scenario's second-stage LP, together with the linkage back to the
/// first-stage decision and its probability weight.
pub struct Subproblem<A: LpAdapter> {
    id: usize,
    probability: E,
    master_terms: Vec<MasterTerm>,
    n_master_cols: usize,
    /// The row's static right-hand side before any first-stage linkage is applied.
    base_rhs: Vec<E>,
    model: A,
}

impl<A: LpAdapter> Subproblem<A> {
    pub fn new(
        id: usize,
        probability: E,
        master_terms: Vec<MasterTerm>,
        n_master_cols: usize,
        base_rhs: Vec<E>,
        model: A,
    ) -> Self {
        Self {
            id,
            probability,
            master_terms,
            n_master_cols,
            base_rhs,
            model,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    /// Solves the subproblem at `x` and returns the cut it implies, together
    /// with the subproblem's contribution to `Q`. `Unbounded` is carried as
    /// a signal hyperplane with `Q = -infinity`; any other non-terminal
    /// solver status is a fatal fault, not a signal, and is returned as `Err`.
    pub fn evaluate(&mut self, x: &[E]) -> Result<(Hyperplane, E), ShapeError> {
        if x.len() != self.n_master_cols {
            return Err(ShapeError::DqXLength {
                dq: self.n_master_cols,
                x: x.len(),
            });
        }

        self.apply_linkage(x);
        let outcome = self.model.solve();

        match outcome.status {
            SolverStatus::Optimal => {
                let mut dq = vec![0.0; self.n_master_cols];
                for term in &self.master_terms {
                    let lambda = outcome.duals.get(term.row).copied().unwrap_or(0.0);
                    dq[term.column] += -self.probability * lambda * term.coeff;
                }
                let dq_dot_x: E = dq.iter().zip(x.iter()).map(|(d, xi)| d * xi).sum();
                let q = self.probability * outcome.objective + dq_dot_x;
                let (indices, values): (Vec<usize>, Vec<E>) = dq
                    .into_iter()
                    .enumerate()
                    .filter(|(_, v)| *v != 0.0)
                    .unzip();
                let cut = Hyperplane::optimality(indices, values, q, self.id);
                Ok((cut, self.probability * outcome.objective))
            }
            SolverStatus::Infeasible => {
                let mut g = vec![0.0; self.n_master_cols];
                for term in &self.master_terms {
                    let ray = outcome.duals.get(term.row).copied().unwrap_or(0.0);
                    g[term.column] += -ray * term.coeff;
                }
                let g_dot_x: E = g.iter().zip(x.iter()).map(|(gi, xi)| gi * xi).sum();
                let raw_g = outcome.objective - g_dot_x;
                let scale = scaling_factor(&g, raw_g);
                let (indices, values): (Vec<usize>, Vec<E>) = g
                    .into_iter()
                    .enumerate()
                    .filter(|(_, v)| *v != 0.0)
                    .map(|(i, v)| (i, v / scale))
                    .unzip();
                let cut = Hyperplane::feasibility(indices, values, raw_g / scale, self.id);
                Ok((cut, E::INFINITY))
            }
            SolverStatus::Unbounded => Ok((Hyperplane::unbounded(self.id), E::NEG_INFINITY)),
            SolverStatus::Other => Err(ShapeError::SolverFault {
                id: self.id,
                detail: "status Other",
            }),
        }
    }

    fn apply_linkage(&mut self, x: &[E]) {
        let mut rhs_delta = vec![0.0; self.base_rhs.len()];
        for term in &self.master_terms {
            rhs_delta[term.row] -= term.coeff * x[term.column];
        }
        for (row, (&base, &delta)) in self.base_rhs.iter().zip(rhs_delta.iter()).enumerate() {
            let new_rhs = base + delta;
            self.model.set_row_bounds(row, new_rhs, new_rhs);
        }
    }
}

/// Scaling factor for a feasibility cut: `|g|` if nonzero, else the largest
/// magnitude gradient entry, else `1.0` (degenerate zero ray; skip scaling
/// rather than dividing by zero).
fn scaling_factor(gradient: &[E], g: E) -> E {
    if g.abs() > 0.0 {
        return g.abs();
    }
    let max_abs = gradient.iter().fold(0.0_f64, |acc, &v| acc.max(v.abs()));
    if max_abs > 0.0 { max_abs } else { 1.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stochastic::adapter::DenseLpAdapter;

    fn build_simple_subproblem() -> Subproblem<DenseLpAdapter> {
        // Second stage: min y s.t. y >= x_linked (row 0 rhs is tied to the
        // first-stage value); y unbounded above, y >= 0.
        let mut model = DenseLpAdapter::new();
        let y = model.add_variable(0.0, E::INFINITY, 1.0);
        model.add_row(&[y], &[1.0], 0.0, E::INFINITY).unwrap();
        let terms = vec![MasterTerm { row: 0, column: 0, coeff: 1.0 }];
        Subproblem::new(0, 1.0, terms, 1, vec![0.0], model)
    }

    #[test]
    fn optimal_subproblem_yields_optimality_cut() {
        let mut sp = build_simple_subproblem();
        let (cut, q) = sp.evaluate(&[3.0]).unwrap();
        assert_eq!(cut.kind(), crate::stochastic::hyperplane::HyperplaneKind::Optimality);
        assert!((q - 3.0).abs() < 1e-6);
    }

    #[test]
    fn dimension_mismatch_reported() {
        let mut sp = build_simple_subproblem();
        let err = sp.evaluate(&[1.0, 2.0]).unwrap_err();
        assert_eq!(err, ShapeError::DqXLength { dq: 1, x: 2 });
    }
}
