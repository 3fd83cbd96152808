//! Uniform LP/QP adapter contract and a dense reference implementation.
//!
//! The decomposition engine treats the underlying LP/QP solver as an
//! external collaborator: it only needs [`LpAdapter`]. [`DenseLpAdapter`] is
//! the one concrete backend shipped here so the engine is exercisable
//! without a production solver wired in; it rebuilds and resolves from
//! scratch on every [`LpAdapter::solve`] call, which is acceptable since
//! this crate does not warm-start across model reshapes.

use crate::E;
use crate::stochastic::error::{AdapterError, ShapeError};

/// Terminal status of a single [`LpAdapter::solve`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverStatus {
    Optimal,
    Infeasible,
    Unbounded,
    Other,
}

/// Result of a single [`LpAdapter::solve`] call.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub status: SolverStatus,
    /// Primal values for the structural variables, in `add_variable` order.
    pub primal: Vec<E>,
    /// Objective value at `primal` (meaningless unless `status == Optimal`).
    pub objective: E,
    /// Row duals in `add_row` order when `status == Optimal`, or a Farkas
    /// ray (same ordering) when `status == Infeasible`.
    pub duals: Vec<E>,
}

/// Uniform interface over an LP/QP engine, per the contract the engine is
/// written against. A production solver can implement this trait directly;
/// [`DenseLpAdapter`] is the reference implementation used in tests.
pub trait LpAdapter {
    /// Adds a structural variable with the given bounds and linear cost,
    /// returning its column index.
    fn add_variable(&mut self, lb: E, ub: E, cost: E) -> usize;

    /// Replaces the linear part of the objective.
    fn set_objective(&mut self, linear: &[E]);

    /// Returns the linear part of the objective.
    fn objective(&self) -> &[E];

    /// Sets a diagonal quadratic term (0.5 x^T diag(d) x). Only diagonal,
    /// PSD terms are required by this engine's stabilization variants.
    fn set_quadratic_objective(&mut self, diag: &[E]) -> Result<(), AdapterError>;

    /// Whether this adapter can solve a model with a quadratic objective.
    fn supports_qp(&self) -> bool;

    /// Adds a row `lb <= sum(values[k] * x[indices[k]]) <= ub`. Rejects
    /// ranged rows (both bounds finite and different): a row must be an
    /// equality (`lb == ub`) or exactly one-sided.
    fn add_row(&mut self, indices: &[usize], values: &[E], lb: E, ub: E) -> Result<usize, ShapeError>;

    /// Removes rows by index. Remaining rows keep their relative order but
    /// are renumbered to close the gap.
    fn delete_rows(&mut self, rows: &[usize]);

    /// Tightens or relaxes a variable's bounds.
    fn set_bounds(&mut self, var: usize, lb: E, ub: E);

    /// Updates a row's right-hand side bounds (used to re-link a
    /// subproblem's rows to a new first-stage point without rebuilding it).
    fn set_row_bounds(&mut self, row: usize, lb: E, ub: E);

    fn n_vars(&self) -> usize;
    fn n_rows(&self) -> usize;

    fn solve(&mut self) -> SolveOutcome;
}

#[derive(Debug, Clone)]
struct RowData {
    indices: Vec<usize>,
    values: Vec<E>,
    lb: E,
    ub: E,
}

/// Dense two-phase primal simplex (LP) / diagonal active-set (QP) adapter.
pub struct DenseLpAdapter {
    lb: Vec<E>,
    ub: Vec<E>,
    cost: Vec<E>,
    quad_diag: Option<Vec<E>>,
    rows: Vec<RowData>,
}

impl DenseLpAdapter {
    pub fn new() -> Self {
        Self {
            lb: Vec::new(),
            ub: Vec::new(),
            cost: Vec::new(),
            quad_diag: None,
            rows: Vec::new(),
        }
    }

    fn solve_lp(&self) -> SolveOutcome {
        let transform = VariableTransform::build(&self.lb, &self.ub);
        let n_y = transform.n_internal();

        // Internal cost vector.
        let mut cost_y = vec![0.0; n_y];
        for (j, t) in transform.cols.iter().enumerate() {
            match t {
                VarCol::Shift { internal, sign } | VarCol::Reflect { internal, sign } => {
                    cost_y[*internal] += self.cost[j] * sign;
                }
                VarCol::Split { pos, neg } => {
                    cost_y[*pos] += self.cost[j];
                    cost_y[*neg] -= self.cost[j];
                }
            }
        }

        // Bound rows for any variable with a finite transformed upper bound.
        let mut rows_y: Vec<(Vec<(usize, E)>, E, RowKind)> = Vec::new();
        for (j, t) in transform.cols.iter().enumerate() {
            if let Some(ub_y) = transform.upper_bound(j, &self.lb, &self.ub) {
                match t {
                    VarCol::Shift { internal, .. } | VarCol::Reflect { internal, .. } => {
                        rows_y.push((vec![(*internal, 1.0)], ub_y, RowKind::LessEqual));
                    }
                    VarCol::Split { .. } => unreachable!("split columns are never upper bounded"),
                }
            }
        }

        let n_structural_rows = self.rows.len();
        for row in &self.rows {
            let (terms, rhs_shift) =
                transform.transform_row(row.indices.as_slice(), row.values.as_slice(), &self.lb, &self.ub);
            let (kind, rhs) = classify_row(row.lb, row.ub);
            rows_y.push((terms, rhs - rhs_shift, kind));
        }

        let tableau = Tableau::build(n_y, &rows_y);
        let result = tableau.solve_two_phase(&cost_y);

        match result {
            TableauResult::Infeasible { ray } => SolveOutcome {
                status: SolverStatus::Infeasible,
                primal: Vec::new(),
                objective: 0.0,
                duals: ray[..n_structural_rows].to_vec(),
            },
            TableauResult::Unbounded => SolveOutcome {
                status: SolverStatus::Unbounded,
                primal: Vec::new(),
                objective: 0.0,
                duals: Vec::new(),
            },
            TableauResult::Optimal { y, duals, objective } => {
                let x = transform.recover(&y, &self.lb, &self.ub);
                SolveOutcome {
                    status: SolverStatus::Optimal,
                    primal: x,
                    objective,
                    duals: duals[..n_structural_rows].to_vec(),
                }
            }
        }
    }

    fn solve_qp(&self, diag: &[E]) -> SolveOutcome {
        diagonal_active_set_qp(&self.cost, diag, &self.lb, &self.ub, &self.rows)
    }
}

impl LpAdapter for DenseLpAdapter {
    fn add_variable(&mut self, lb: E, ub: E, cost: E) -> usize {
        self.lb.push(lb);
        self.ub.push(ub);
        self.cost.push(cost);
        if let Some(diag) = &mut self.quad_diag {
            diag.push(0.0);
        }
        self.lb.len() - 1
    }

    fn set_objective(&mut self, linear: &[E]) {
        self.cost = linear.to_vec();
    }

    fn objective(&self) -> &[E] {
        &self.cost
    }

    fn set_quadratic_objective(&mut self, diag: &[E]) -> Result<(), AdapterError> {
        self.quad_diag = Some(diag.to_vec());
        Ok(())
    }

    fn supports_qp(&self) -> bool {
        true
    }

    fn add_row(&mut self, indices: &[usize], values: &[E], lb: E, ub: E) -> Result<usize, ShapeError> {
        if lb.is_finite() && ub.is_finite() && lb != ub {
            return Err(ShapeError::RangedRow);
        }
        self.rows.push(RowData {
            indices: indices.to_vec(),
            values: values.to_vec(),
            lb,
            ub,
        });
        Ok(self.rows.len() - 1)
    }

    fn delete_rows(&mut self, rows: &[usize]) {
        let drop: std::collections::HashSet<usize> = rows.iter().copied().collect();
        let mut kept = Vec::with_capacity(self.rows.len());
        for (i, row) in self.rows.drain(..).enumerate() {
            if !drop.contains(&i) {
                kept.push(row);
            }
        }
        self.rows = kept;
    }

    fn set_bounds(&mut self, var: usize, lb: E, ub: E) {
        self.lb[var] = lb;
        self.ub[var] = ub;
    }

    fn set_row_bounds(&mut self, row: usize, lb: E, ub: E) {
        self.rows[row].lb = lb;
        self.rows[row].ub = ub;
    }

    fn n_vars(&self) -> usize {
        self.lb.len()
    }

    fn n_rows(&self) -> usize {
        self.rows.len()
    }

    fn solve(&mut self) -> SolveOutcome {
        match self.quad_diag.clone() {
            Some(diag) if diag.iter().any(|&d| d != 0.0) => self.solve_qp(&diag),
            _ => self.solve_lp(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RowKind {
    Equality,
    LessEqual,
    GreaterEqual,
}

fn classify_row(lb: E, ub: E) -> (RowKind, E) {
    if lb == ub {
        (RowKind::Equality, lb)
    } else if ub.is_finite() {
        (RowKind::LessEqual, ub)
    } else {
        (RowKind::GreaterEqual, lb)
    }
}

/// How a structural variable maps onto non-negative internal columns.
#[derive(Debug, Clone, Copy)]
enum VarCol {
    /// `x = l + sign*y`, `y >= 0` (sign is always `1.0`; kept for symmetry with `Reflect`).
    Shift { internal: usize, sign: E },
    /// `x = u - y`, `y >= 0`, used when only an upper bound is finite.
    Reflect { internal: usize, sign: E },
    /// `x = yp - yn`, `yp, yn >= 0`, used when the variable is free.
    Split { pos: usize, neg: usize },
}

struct VariableTransform {
    cols: Vec<VarCol>,
    n_internal: usize,
}

impl VariableTransform {
    fn build(lb: &[E], ub: &[E]) -> Self {
        let mut cols = Vec::with_capacity(lb.len());
        let mut next = 0usize;
        for (&l, &u) in lb.iter().zip(ub.iter()) {
            if l.is_finite() {
                cols.push(VarCol::Shift {
                    internal: next,
                    sign: 1.0,
                });
                next += 1;
            } else if u.is_finite() {
                cols.push(VarCol::Reflect {
                    internal: next,
                    sign: 1.0,
                });
                next += 1;
            } else {
                cols.push(VarCol::Split { pos: next, neg: next + 1 });
                next += 2;
            }
        }
        Self { cols, n_internal: next }
    }

    fn n_internal(&self) -> usize {
        self.n_internal
    }

    /// Transformed upper bound for variable `j`'s internal column, if finite.
    fn upper_bound(&self, j: usize, lb: &[E], ub: &[E]) -> Option<E> {
        match self.cols[j] {
            VarCol::Shift { .. } => {
                if ub[j].is_finite() {
                    Some(ub[j] - lb[j])
                } else {
                    None
                }
            }
            VarCol::Reflect { .. } => None,
            VarCol::Split { .. } => None,
        }
    }

    /// Rewrites a structural row into internal columns, returning the terms
    /// and the amount to subtract from the original rhs (`x_j = l_j + y_j`
    /// contributes `a_j*l_j`; `x_j = u_j - y_j` contributes `a_j*u_j`; split
    /// columns contribute nothing).
    fn transform_row(&self, indices: &[usize], values: &[E], lb: &[E], ub: &[E]) -> (Vec<(usize, E)>, E) {
        let mut terms: std::collections::BTreeMap<usize, E> = std::collections::BTreeMap::new();
        let mut rhs_shift = 0.0;
        for (&j, &a) in indices.iter().zip(values.iter()) {
            match self.cols[j] {
                VarCol::Shift { internal, sign } => {
                    *terms.entry(internal).or_insert(0.0) += a * sign;
                    rhs_shift += a * lb[j];
                }
                VarCol::Reflect { internal, sign } => {
                    *terms.entry(internal).or_insert(0.0) -= a * sign;
                    rhs_shift += a * ub[j];
                }
                VarCol::Split { pos, neg } => {
                    *terms.entry(pos).or_insert(0.0) += a;
                    *terms.entry(neg).or_insert(0.0) -= a;
                }
            }
        }
        (terms.into_iter().collect(), rhs_shift)
    }

    fn recover(&self, y: &[E], lb: &[E], ub: &[E]) -> Vec<E> {
        self.cols
            .iter()
            .enumerate()
            .map(|(j, c)| match c {
                VarCol::Shift { internal, .. } => lb[j] + y[*internal],
                VarCol::Reflect { internal, .. } => ub[j] - y[*internal],
                VarCol::Split { pos, neg } => y[*pos] - y[*neg],
            })
            .collect()
    }
}

enum TableauResult {
    Optimal { y: Vec<E>, duals: Vec<E>, objective: E },
    Infeasible { ray: Vec<E> },
    Unbounded,
}

/// Dense simplex tableau: `n` structural (non-negative) columns plus one
/// slack and one artificial per row, all rows equalities after the slack is
/// folded in.
struct Tableau {
    n_struct: usize,
    n_rows: usize,
    /// `rows[i]` has length `n_total_cols + 1` (last entry is rhs).
    data: Vec<Vec<E>>,
    basis: Vec<usize>,
    slack_col: Vec<Option<usize>>,
    artificial_col: Vec<usize>,
    artificial_base: usize,
    n_total_cols: usize,
}

const EPS: E = 1e-9;

impl Tableau {
    fn build(n_struct: usize, rows: &[(Vec<(usize, E)>, E, RowKind)]) -> Self {
        let n_rows = rows.len();
        let n_slacks = rows
            .iter()
            .filter(|(_, _, kind)| *kind != RowKind::Equality)
            .count();
        let n_total_cols = n_struct + n_slacks + n_rows;

        let mut data = vec![vec![0.0; n_total_cols + 1]; n_rows];
        let mut slack_col = vec![None; n_rows];
        let mut artificial_col = vec![0usize; n_rows];
        let mut next_slack = n_struct;
        let artificial_base = n_struct + n_slacks;

        for (i, (terms, rhs, kind)) in rows.iter().enumerate() {
            let mut rhs = *rhs;
            let mut sign = 1.0;
            if rhs < 0.0 {
                sign = -1.0;
                rhs = -rhs;
            }
            for &(j, a) in terms {
                data[i][j] = a * sign;
            }
            if *kind != RowKind::Equality {
                let slack = next_slack;
                next_slack += 1;
                let coeff = match kind {
                    RowKind::LessEqual => 1.0,
                    RowKind::GreaterEqual => -1.0,
                    RowKind::Equality => unreachable!(),
                };
                data[i][slack] = coeff * sign;
                slack_col[i] = Some(slack);
            }
            let art = artificial_base + i;
            data[i][art] = 1.0;
            artificial_col[i] = art;
            data[i][n_total_cols] = rhs;
        }

        Self {
            n_struct,
            n_rows,
            data,
            basis: artificial_col.clone(),
            slack_col,
            artificial_col,
            artificial_base,
            n_total_cols,
        }
    }

    fn reduced_costs(&self, cost: &[E]) -> Vec<E> {
        let mut row = vec![0.0; self.n_total_cols + 1];
        for j in 0..self.n_total_cols {
            row[j] = cost.get(j).copied().unwrap_or(0.0);
        }
        for i in 0..self.n_rows {
            let cb = cost.get(self.basis[i]).copied().unwrap_or(0.0);
            if cb == 0.0 {
                continue;
            }
            for j in 0..=self.n_total_cols {
                row[j] -= cb * self.data[i][j];
            }
        }
        row
    }

    fn pivot(&mut self, row: usize, col: usize) {
        let pivot_val = self.data[row][col];
        for j in 0..=self.n_total_cols {
            self.data[row][j] /= pivot_val;
        }
        for i in 0..self.n_rows {
            if i == row {
                continue;
            }
            let factor = self.data[i][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..=self.n_total_cols {
                self.data[i][j] -= factor * self.data[row][j];
            }
        }
        self.basis[row] = col;
    }

    /// Runs simplex against `cost`, restricting entering-column candidates
    /// to `0..exclude_from`. Returns `false` if unbounded.
    fn run(&mut self, cost: &[E], exclude_from: usize) -> (Vec<E>, bool) {
        loop {
            let reduced = self.reduced_costs(cost);
            let entering = (0..exclude_from.min(self.n_total_cols))
                .find(|&j| reduced[j] < -EPS);
            let Some(entering) = entering else {
                return (reduced, true);
            };
            let mut leaving: Option<usize> = None;
            let mut best_ratio = E::INFINITY;
            for i in 0..self.n_rows {
                let coeff = self.data[i][entering];
                if coeff > EPS {
                    let ratio = self.data[i][self.n_total_cols] / coeff;
                    if ratio < best_ratio - EPS
                        || (ratio < best_ratio + EPS
                            && leaving.map_or(true, |l| self.basis[l] > self.basis[i]))
                    {
                        best_ratio = ratio;
                        leaving = Some(i);
                    }
                }
            }
            let Some(leaving) = leaving else {
                return (reduced, false);
            };
            self.pivot(leaving, entering);
        }
    }

    fn solve_two_phase(mut self, cost: &[E]) -> TableauResult {
        let mut phase1_cost = vec![0.0; self.n_total_cols];
        for &a in &self.artificial_col {
            phase1_cost[a] = 1.0;
        }

        let (reduced1, bounded1) = self.run(&phase1_cost, self.n_total_cols);
        debug_assert!(bounded1, "phase 1 minimizes a sum of non-negatives; cannot be unbounded");
        let phase1_obj = -reduced1[self.n_total_cols];
        if phase1_obj > 1e-7 {
            let ray: Vec<E> = (0..self.n_rows).map(|i| -reduced1[self.artificial_col[i]]).collect();
            return TableauResult::Infeasible { ray };
        }

        // Try to pivot any basic artificial (necessarily at value 0) out of the basis.
        for i in 0..self.n_rows {
            if self.basis[i] >= self.artificial_base {
                if let Some(j) = (0..self.artificial_base).find(|&j| self.data[i][j].abs() > EPS) {
                    self.pivot(i, j);
                }
            }
        }

        let mut cost_full = vec![0.0; self.n_total_cols];
        cost_full[..cost.len().min(self.n_struct)]
            .copy_from_slice(&cost[..cost.len().min(self.n_struct)]);
        let (reduced2, bounded2) = self.run(&cost_full, self.n_struct);
        if !bounded2 {
            return TableauResult::Unbounded;
        }

        let mut y = vec![0.0; self.n_struct];
        for i in 0..self.n_rows {
            if self.basis[i] < self.n_struct {
                y[self.basis[i]] = self.data[i][self.n_total_cols];
            }
        }
        let duals: Vec<E> = (0..self.n_rows).map(|i| -reduced2[self.artificial_col[i]]).collect();
        let objective = -reduced2[self.n_total_cols];
        TableauResult::Optimal { y, duals, objective }
    }
}

/// Equality-constrained active-set QP for a diagonal, PSD quadratic term.
///
/// Used only by the regularized-decomposition localization, whose master
/// objective is always `c.x + 0.5 sigma^-1 ||x - xi||^2` restricted to the
/// first-stage block, i.e. a diagonal PSD `Q`. The working set tracks which
/// bound constraints are active; at each iteration the equality-constrained
/// subproblem over the free variables is solved by dense Gaussian
/// elimination on the KKT system, matching Nocedal & Wright's active-set
/// method for QPs with simple bounds.
fn diagonal_active_set_qp(
    cost: &[E],
    diag: &[E],
    lb: &[E],
    ub: &[E],
    rows: &[RowData],
) -> SolveOutcome {
    let n = cost.len();
    let m = rows.len();

    let mut x: Vec<E> = (0..n)
        .map(|j| {
            if lb[j].is_finite() {
                lb[j]
            } else if ub[j].is_finite() {
                ub[j]
            } else {
                0.0
            }
        })
        .collect();

    let mut active_lb = vec![false; n];
    let mut active_ub = vec![false; n];
    for j in 0..n {
        if lb[j].is_finite() && x[j] <= lb[j] + EPS {
            active_lb[j] = true;
        }
        if ub[j].is_finite() && x[j] >= ub[j] - EPS {
            active_ub[j] = true;
        }
    }

    let max_iters = 20 * (n + m + 1);
    for _ in 0..max_iters {
        let free: Vec<usize> = (0..n).filter(|&j| !active_lb[j] && !active_ub[j]).collect();
        let nf = free.len();

        // g = Q x + c, restricted to free variables.
        let grad: Vec<E> = free.iter().map(|&j| diag[j] * x[j] + cost[j]).collect();

        // KKT: [ D_ff  A_f^T ] [ d ]   [ -g ]
        //      [ A_f    0    ] [ l ] = [  0 ]
        let dim = nf + m;
        let mut a = vec![vec![0.0; dim + 1]; dim];
        for i in 0..nf {
            a[i][i] = diag[free[i]].max(0.0);
            a[i][dim] = -grad[i];
        }
        for (r, row) in rows.iter().enumerate() {
            for (&j, &v) in row.indices.iter().zip(row.values.iter()) {
                if let Some(fi) = free.iter().position(|&f| f == j) {
                    a[fi][nf + r] = v;
                    a[nf + r][fi] = v;
                }
            }
            let rhs = if row.lb == row.ub { row.lb } else if row.ub.is_finite() { row.ub } else { row.lb };
            let current: E = row.indices.iter().zip(row.values.iter()).map(|(&j, &v)| v * x[j]).sum();
            a[nf + r][dim] = rhs - current;
        }

        let sol = gaussian_eliminate(a, dim);
        let Some(sol) = sol else {
            // Singular KKT system: treat as already stationary.
            break;
        };
        let d: Vec<E> = sol[..nf].to_vec();

        if d.iter().all(|&v| v.abs() < 1e-9) {
            // Stationary for the current working set: check multiplier signs
            // on active bounds; if all compatible we are done, else release
            // the most-violating bound.
            let mut released = false;
            for j in 0..n {
                if active_lb[j] {
                    let mult = diag[j] * x[j] + cost[j];
                    if mult < -1e-7 {
                        active_lb[j] = false;
                        released = true;
                        break;
                    }
                }
                if active_ub[j] {
                    let mult = diag[j] * x[j] + cost[j];
                    if mult > 1e-7 {
                        active_ub[j] = false;
                        released = true;
                        break;
                    }
                }
            }
            if !released {
                break;
            }
            continue;
        }

        // Ratio test against inactive bounds.
        let mut alpha = 1.0;
        let mut blocking: Option<usize> = None;
        for (fi, &j) in free.iter().enumerate() {
            let step = d[fi];
            if step < -EPS && lb[j].is_finite() {
                let a_j = (lb[j] - x[j]) / step;
                if a_j < alpha {
                    alpha = a_j;
                    blocking = Some(j);
                }
            } else if step > EPS && ub[j].is_finite() {
                let a_j = (ub[j] - x[j]) / step;
                if a_j < alpha {
                    alpha = a_j;
                    blocking = Some(j);
                }
            }
        }
        alpha = alpha.max(0.0);

        for (fi, &j) in free.iter().enumerate() {
            x[j] += alpha * d[fi];
        }

        if let Some(j) = blocking {
            if d[free.iter().position(|&f| f == j).unwrap()] < 0.0 {
                active_lb[j] = true;
            } else {
                active_ub[j] = true;
            }
        }
    }

    let objective = cost.iter().zip(x.iter()).map(|(c, xi)| c * xi).sum::<E>()
        + 0.5 * diag.iter().zip(x.iter()).map(|(d, xi)| d * xi * xi).sum::<E>();

    SolveOutcome {
        status: SolverStatus::Optimal,
        primal: x,
        objective,
        duals: vec![0.0; m],
    }
}

/// Dense Gaussian elimination with partial pivoting on an augmented matrix
/// `a` of size `dim x (dim+1)`. Returns `None` if the system is singular.
fn gaussian_eliminate(mut a: Vec<Vec<E>>, dim: usize) -> Option<Vec<E>> {
    for col in 0..dim {
        let pivot_row = (col..dim).max_by(|&i, &j| {
            a[i][col].abs().partial_cmp(&a[j][col].abs()).unwrap()
        })?;
        if a[pivot_row][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot_row);
        let pivot = a[col][col];
        for j in col..=dim {
            a[col][j] /= pivot;
        }
        for i in 0..dim {
            if i == col {
                continue;
            }
            let factor = a[i][col];
            if factor == 0.0 {
                continue;
            }
            for j in col..=dim {
                a[i][j] -= factor * a[col][j];
            }
        }
    }
    Some((0..dim).map(|i| a[i][dim]).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_lp_minimization() {
        // min -x0 - x1 s.t. x0 + x1 <= 4, x0 <= 3, x0,x1 >= 0
        let mut adapter = DenseLpAdapter::new();
        let x0 = adapter.add_variable(0.0, 3.0, -1.0);
        let x1 = adapter.add_variable(0.0, E::INFINITY, -1.0);
        adapter.add_row(&[x0, x1], &[1.0, 1.0], E::NEG_INFINITY, 4.0).unwrap();

        let out = adapter.solve();
        assert_eq!(out.status, SolverStatus::Optimal);
        assert!((out.objective - (-4.0)).abs() < 1e-5);
    }

    #[test]
    fn ranged_row_rejected() {
        let mut adapter = DenseLpAdapter::new();
        let x0 = adapter.add_variable(0.0, 1.0, 1.0);
        let err = adapter.add_row(&[x0], &[1.0], 0.0, 1.0);
        assert!(err.is_err());
    }

    #[test]
    fn infeasible_lp_detected() {
        let mut adapter = DenseLpAdapter::new();
        let x0 = adapter.add_variable(0.0, E::INFINITY, 1.0);
        adapter.add_row(&[x0], &[1.0], 5.0, E::INFINITY).unwrap();
        adapter.add_row(&[x0], &[1.0], E::NEG_INFINITY, 1.0).unwrap();

        let out = adapter.solve();
        assert_eq!(out.status, SolverStatus::Infeasible);
    }

    #[test]
    fn unbounded_lp_detected() {
        let mut adapter = DenseLpAdapter::new();
        let x0 = adapter.add_variable(0.0, E::INFINITY, -1.0);
        adapter.add_row(&[x0], &[1.0], 0.0, E::INFINITY).unwrap();

        let out = adapter.solve();
        assert_eq!(out.status, SolverStatus::Unbounded);
    }

    #[test]
    fn diagonal_qp_finds_interior_minimum() {
        // min 0.5*(x0-2)^2 ~ 0.5*x0^2 - 2*x0, unconstrained except bounds.
        let mut adapter = DenseLpAdapter::new();
        let x0 = adapter.add_variable(E::NEG_INFINITY, E::INFINITY, -2.0);
        adapter.set_quadratic_objective(&[1.0]).unwrap();
        let _ = x0;

        let out = adapter.solve();
        assert_eq!(out.status, SolverStatus::Optimal);
        assert!((out.primal[0] - 2.0).abs() < 1e-4);
    }
}
