//! The serial master loop: drives subproblem resolution, cut accumulation,
//! stabilization, and the master-model resolve until convergence.

use rand::Rng;

use crate::E;
use crate::Status;
use crate::callback::{NoOpSink, ProgressReport, ProgressSink};
use crate::stochastic::adapter::{LpAdapter, SolverStatus};
use crate::stochastic::bundle::CutBundler;
use crate::stochastic::error::{EngineError, ShapeError};
use crate::stochastic::hyperplane::{Hyperplane, HyperplaneKind};
use crate::stochastic::localization::{CutPool, LocalizationState};
use crate::stochastic::options::LShapedOptions;
use crate::stochastic::subproblem::Subproblem;
use crate::terminators::Terminator;

/// Sentinel used for theta columns before any cut has tightened them;
/// values at or below this floor read as "not yet populated".
pub const THETA_FLOOR: E = -1e10;

/// Persistent columns/rows backing an LP-only (1-norm) level-set
/// projection: `dplus[j] - dminus[j] = xi[j] - x[j]` via `link_rows[j]`.
#[derive(Debug, Clone)]
struct LevelSetAux {
    dplus: Vec<usize>,
    dminus: Vec<usize>,
    link_rows: Vec<usize>,
}

/// Outcome of a completed [`LShapedEngine::solve`] call.
pub struct SolveResult {
    pub status: Status,
    pub x: Vec<E>,
    pub objective: E,
    pub iterations: usize,
    pub q_history: Vec<E>,
    pub theta_history: Vec<E>,
    pub q_tilde_history: Vec<E>,
    pub delta_history: Vec<E>,
}

/// The L-shaped decomposition engine: one master model, `S` subproblems,
/// and a localization strategy selected at construction.
pub struct LShapedEngine<A: LpAdapter> {
    options: LShapedOptions,
    master: A,
    subproblems: Vec<Subproblem<A>>,
    /// First-stage cost, kept around so the regularized-decomposition
    /// objective can be rebuilt from scratch every step instead of drifting
    /// off of whatever `-(1/sigma)*xi` term was baked in last time.
    c: Vec<E>,
    n_first_stage: usize,
    n_scenarios: usize,
    lb: Vec<E>,
    ub: Vec<E>,
    localization: LocalizationState,
    cut_pool: CutPool,
    /// Whether each scenario's theta column has had its cost promoted from
    /// `0` to `1` (linearize mode only; always all-`true` otherwise).
    theta_promoted: Vec<bool>,
    /// Persistent deviation columns/rows for an LP-only level-set projection.
    level_aux: Option<LevelSetAux>,
    x: Vec<E>,
    xi: Vec<E>,
    q_tilde: E,
    progress: Box<dyn ProgressSink>,
    terminator: Option<Box<dyn Terminator>>,
    q_history: Vec<E>,
    theta_history: Vec<E>,
    q_tilde_history: Vec<E>,
    delta_history: Vec<E>,
}

impl<A: LpAdapter> LShapedEngine<A> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        c: Vec<E>,
        lb: Vec<E>,
        ub: Vec<E>,
        first_stage_rows: Vec<Hyperplane>,
        subproblems: Vec<Subproblem<A>>,
        localization: LocalizationState,
        mut master: A,
        options: LShapedOptions,
        x0: Option<Vec<E>>,
    ) -> Result<Self, ShapeError> {
        let n_first_stage = c.len();
        let n_scenarios = subproblems.len();

        if options.crash == crate::stochastic::options::Crash::Evp {
            return Err(ShapeError::UnsupportedCrash);
        }
        if localization.requires_qp() && !master.supports_qp() {
            return Err(ShapeError::RequiresQp);
        }
        let level_set_needs_qp =
            matches!(localization, LocalizationState::LevelSet { .. }) && !options.linearize;
        if level_set_needs_qp && !master.supports_qp() {
            return Err(ShapeError::RequiresQp);
        }
        for row in &first_stage_rows {
            if row.kind() != HyperplaneKind::LinearConstraint {
                return Err(ShapeError::InvalidFirstStageRow);
            }
        }

        let x0 = match x0 {
            Some(x0) if x0.len() == n_first_stage => x0,
            Some(x0) => {
                return Err(ShapeError::X0Length {
                    given: x0.len(),
                    expected: n_first_stage,
                });
            }
            None => random_start(&lb, &ub),
        };

        for j in 0..n_first_stage {
            master.add_variable(lb[j], ub[j], c[j]);
        }
        // In linearize mode the theta cost starts at zero and is promoted to
        // one the first time an optimality cut for that id is added (R.D.
        // and level-set bundling otherwise double-count the recourse term
        // while feasibility cuts are still being collected).
        let theta_cost = if options.linearize { 0.0 } else { 1.0 };
        for _ in 0..n_scenarios {
            master.add_variable(THETA_FLOOR, E::INFINITY, theta_cost);
        }
        let theta_promoted = vec![!options.linearize; n_scenarios];

        let n_master_cols = n_first_stage + n_scenarios;
        for row in &first_stage_rows {
            let (indices, values, row_lb, row_ub) = row.lowlevel(n_master_cols);
            master.add_row(&indices, &values, row_lb, row_ub)?;
        }

        if let LocalizationState::Regularized { sigma, .. } = &localization {
            let mut diag = vec![0.0; n_master_cols];
            let mut lin = vec![theta_cost; n_master_cols];
            for j in 0..n_first_stage {
                diag[j] = 1.0 / *sigma;
                lin[j] = c[j] - (1.0 / *sigma) * x0[j];
            }
            master.set_objective(&lin);
            master
                .set_quadratic_objective(&diag)
                .map_err(|_| ShapeError::RequiresQp)?;
        }

        // Level sets in linearize mode stay LP-only: instead of a 2-norm QP
        // projection, a pair of nonnegative deviation columns per
        // first-stage variable lets the projection minimize the 1-norm
        // `||x - xi||_1` with a linear objective. The linking row's rhs is
        // re-pointed at the current incumbent before each projection solve.
        let level_aux = if matches!(localization, LocalizationState::LevelSet { .. }) && options.linearize {
            let mut dplus = Vec::with_capacity(n_first_stage);
            let mut dminus = Vec::with_capacity(n_first_stage);
            let mut link_rows = Vec::with_capacity(n_first_stage);
            for j in 0..n_first_stage {
                let dp = master.add_variable(0.0, E::INFINITY, 0.0);
                let dm = master.add_variable(0.0, E::INFINITY, 0.0);
                let row = master.add_row(&[j, dp, dm], &[1.0, -1.0, 1.0], x0[j], x0[j])?;
                dplus.push(dp);
                dminus.push(dm);
                link_rows.push(row);
            }
            Some(LevelSetAux { dplus, dminus, link_rows })
        } else {
            None
        };

        let cut_pool = CutPool::new(first_stage_rows, n_scenarios);

        Ok(Self {
            options,
            master,
            subproblems,
            c,
            n_first_stage,
            n_scenarios,
            lb,
            ub,
            localization,
            cut_pool,
            theta_promoted,
            level_aux,
            xi: x0.clone(),
            x: x0,
            q_tilde: E::INFINITY,
            progress: Box::new(NoOpSink),
            terminator: None,
            q_history: Vec::new(),
            theta_history: Vec::new(),
            q_tilde_history: Vec::new(),
            delta_history: Vec::new(),
        })
    }

    pub fn with_progress_sink(mut self, sink: Box<dyn ProgressSink>) -> Self {
        self.progress = sink;
        self
    }

    pub fn with_terminator(mut self, terminator: Box<dyn Terminator>) -> Self {
        self.terminator = Some(terminator);
        self
    }

    fn theta_values(&self) -> Vec<E> {
        self.x[self.n_first_stage..]
            .iter()
            .map(|&v| if v <= THETA_FLOOR { E::NEG_INFINITY } else { v })
            .collect()
    }

    /// Runs the engine to a terminal status, or returns an [`EngineError`]
    /// wrapping the best gap observed if the adapter stops prematurely.
    pub fn solve(&mut self, max_iterations: usize) -> Result<SolveResult, EngineError> {
        if let Some(terminator) = &mut self.terminator {
            terminator.initialize();
        }

        for iteration in 0..max_iterations {
            if let Some(terminator) = &mut self.terminator {
                if let Some(status) = terminator.terminate() {
                    return Ok(self.finish(status, iteration));
                }
            }

            let mut bundler = CutBundler::new(self.options.bundle, self.n_first_stage + self.n_scenarios);
            let mut q_sum = 0.0;
            let mut any_infeasible = false;

            for sp in &mut self.subproblems {
                let (cut, q_i) = sp.evaluate(&self.x).map_err(|_| EngineError {
                    status: Status::StoppedPrematurely,
                    gap: E::INFINITY,
                })?;

                match cut.kind() {
                    HyperplaneKind::Unbounded => return Ok(self.finish(Status::Unbounded, iteration)),
                    HyperplaneKind::Infeasible => return Ok(self.finish(Status::Infeasible, iteration)),
                    HyperplaneKind::Feasibility => {
                        if !self.options.checkfeas {
                            return Ok(self.finish(Status::Infeasible, iteration));
                        }
                        any_infeasible = true;
                        for emitted in bundler.push(cut) {
                            self.insert_cut(emitted)?;
                        }
                    }
                    _ => {
                        q_sum += q_i;
                        for emitted in bundler.push(cut) {
                            self.insert_cut(emitted)?;
                        }
                    }
                }
            }
            if let Some(flushed) = bundler.flush() {
                self.insert_cut(flushed)?;
            }

            let q = self.master_objective_at(&self.x.clone()) + q_sum;

            let outcome = self.master.solve();
            match outcome.status {
                SolverStatus::Infeasible => return Ok(self.finish(Status::Infeasible, iteration)),
                SolverStatus::Unbounded => return Ok(self.finish(Status::Unbounded, iteration)),
                SolverStatus::Other => {
                    return Err(EngineError {
                        status: Status::StoppedPrematurely,
                        gap: self.q_tilde - q,
                    });
                }
                SolverStatus::Optimal => {}
            }
            self.x = outcome.primal;

            if any_infeasible {
                continue;
            }

            let theta_model = self.theta_values();
            let theta_sum: E = theta_model.iter().filter(|v| v.is_finite()).sum();
            let theta = self.master_objective_at(&self.x.clone()) + theta_sum;

            self.q_history.push(q);
            self.theta_history.push(theta);

            let kind = self
                .localization
                .take_step(q, &mut self.q_tilde, theta, &self.x, &mut self.xi, self.options.tau);
            let _ = kind;
            self.q_tilde_history.push(self.q_tilde);
            if let Some(radius) = self.localization.radius() {
                self.delta_history.push(radius);
            }
            self.rebuild_regularizer()?;

            let (new_lb, new_ub) = self.localization.master_bounds(&self.lb, &self.ub, &self.xi);
            for j in 0..self.n_first_stage {
                self.master.set_bounds(j, new_lb[j], new_ub[j]);
            }

            self.project_level_set(theta)?;

            self.cut_pool.remove_inactive(&self.x, &theta_model, self.options.tau);
            self.cut_pool.queue_violated(&self.x, &theta_model, self.options.tau);
            while let Some(revived) = self.cut_pool.pop_violating() {
                let (indices, values, row_lb, row_ub) = revived.lowlevel(self.n_first_stage + self.n_scenarios);
                self.master.add_row(&indices, &values, row_lb, row_ub).ok();
            }

            if self.options.log {
                self.progress.update(&ProgressReport {
                    iteration,
                    lower_bound: theta,
                    upper_bound: self.q_tilde,
                    gap: self.q_tilde - theta,
                    x: &self.x,
                });
            }

            if self.localization.check_optimality(q, self.q_tilde, theta, self.options.tau) {
                return Ok(self.finish(Status::Optimal, iteration + 1));
            }
        }

        Ok(self.finish(Status::IterationLimit, max_iterations))
    }

    fn insert_cut(&mut self, cut: Hyperplane) -> Result<(), EngineError> {
        if self.options.linearize
            && cut.kind() == HyperplaneKind::Optimality
            && !self.theta_promoted[cut.id()]
        {
            let mut obj = self.master.objective().to_vec();
            obj[self.n_first_stage + cut.id()] = 1.0;
            self.master.set_objective(&obj);
            self.theta_promoted[cut.id()] = true;
        }
        let (indices, values, row_lb, row_ub) = cut.lowlevel(self.n_first_stage + self.n_scenarios);
        self.master.add_row(&indices, &values, row_lb, row_ub).map_err(|_| EngineError {
            status: Status::StoppedPrematurely,
            gap: E::INFINITY,
        })?;
        self.cut_pool.insert(cut);
        Ok(())
    }

    /// Level sets only (§4.5): projects the incumbent onto `{x : c.x + sum
    /// theta_i <= level}` using the master's own rows plus a temporary level
    /// row, minimizing `||x - xi||` (2-norm via a diagonal QP objective, or
    /// 1-norm via the persistent deviation columns when `linearize`).
    fn project_level_set(&mut self, theta: E) -> Result<(), EngineError> {
        let level = match self.localization.level(self.q_tilde, theta) {
            Some(level) if level.is_finite() => level,
            _ => return Ok(()),
        };

        let n_master_cols = self.n_first_stage + self.n_scenarios;
        let saved_objective = self.master.objective().to_vec();

        let level_row = {
            let indices: Vec<usize> = (0..n_master_cols).collect();
            let values: Vec<E> = saved_objective[..n_master_cols].to_vec();
            self.master
                .add_row(&indices, &values, E::NEG_INFINITY, level)
                .map_err(|_| EngineError {
                    status: Status::StoppedPrematurely,
                    gap: self.q_tilde - theta,
                })?
        };

        let has_aux = self.level_aux.is_some();
        if let Some(aux) = &self.level_aux {
            for (j, &row) in aux.link_rows.iter().enumerate() {
                self.master.set_row_bounds(row, self.xi[j], self.xi[j]);
            }
            let mut obj = vec![0.0; self.master.n_vars()];
            for &dp in &aux.dplus {
                obj[dp] = 1.0;
            }
            for &dm in &aux.dminus {
                obj[dm] = 1.0;
            }
            self.master.set_objective(&obj);
        } else {
            let mut diag = vec![0.0; n_master_cols];
            let mut lin = vec![0.0; n_master_cols];
            for j in 0..self.n_first_stage {
                diag[j] = 2.0;
                lin[j] = -2.0 * self.xi[j];
            }
            self.master.set_objective(&lin);
            self.master.set_quadratic_objective(&diag).map_err(|_| EngineError {
                status: Status::StoppedPrematurely,
                gap: self.q_tilde - theta,
            })?;
        }

        let outcome = self.master.solve();
        self.master.delete_rows(&[level_row]);
        self.master.set_objective(&saved_objective);
        if !has_aux {
            self.master.set_quadratic_objective(&vec![0.0; n_master_cols]).ok();
        }

        if outcome.status == SolverStatus::Optimal {
            self.xi = outcome.primal[..self.n_first_stage].to_vec();
            self.x = outcome.primal;
        }
        Ok(())
    }

    /// `c.x` using the engine's true first-stage cost, independent of
    /// whatever linear term currently sits in the master's own objective
    /// (the regularized-decomposition variant rewrites that term every step
    /// to center the proximal penalty on `xi`, and the level-set projection
    /// temporarily repoints it at a deviation norm).
    fn master_objective_at(&self, x: &[E]) -> E {
        self.c.iter().zip(x.iter()).map(|(c, xi)| c * xi).sum()
    }

    /// Rebuilds the master's regularized-decomposition objective —
    /// `c.x - (1/sigma)*xi.x` linear part plus a `1/sigma` diagonal on the
    /// x-block — from the current `sigma`/`xi`, as required on both serious
    /// and null steps (spec: "rebuild regularizer"). A no-op for every other
    /// localization variant.
    fn rebuild_regularizer(&mut self) -> Result<(), EngineError> {
        let LocalizationState::Regularized { sigma, .. } = &self.localization else {
            return Ok(());
        };
        let sigma = *sigma;
        let n_master_cols = self.n_first_stage + self.n_scenarios;

        let mut lin = self.master.objective().to_vec();
        for j in 0..self.n_first_stage {
            lin[j] = self.c[j] - (1.0 / sigma) * self.xi[j];
        }
        self.master.set_objective(&lin);

        let mut diag = vec![0.0; n_master_cols];
        for slot in diag.iter_mut().take(self.n_first_stage) {
            *slot = 1.0 / sigma;
        }
        self.master.set_quadratic_objective(&diag).map_err(|_| EngineError {
            status: Status::StoppedPrematurely,
            gap: E::INFINITY,
        })?;
        Ok(())
    }

    fn finish(&self, status: Status, iterations: usize) -> SolveResult {
        SolveResult {
            status,
            x: self.x[..self.n_first_stage].to_vec(),
            objective: *self.q_tilde_history.last().unwrap_or(&self.q_tilde),
            iterations,
            q_history: self.q_history.clone(),
            theta_history: self.theta_history.clone(),
            q_tilde_history: self.q_tilde_history.clone(),
            delta_history: self.delta_history.clone(),
        }
    }
}

pub(crate) fn random_start(lb: &[E], ub: &[E]) -> Vec<E> {
    let mut rng = rand::thread_rng();
    lb.iter()
        .zip(ub.iter())
        .map(|(&l, &u)| match (l.is_finite(), u.is_finite()) {
            (true, true) => rng.gen_range(l..=u),
            (true, false) => l,
            (false, true) => u,
            (false, false) => 0.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stochastic::adapter::DenseLpAdapter;
    use crate::stochastic::subproblem::MasterTerm;

    fn simple_two_stage_lp() -> LShapedEngine<DenseLpAdapter> {
        // First stage: min x, x in [0, 10].
        // Second stage (one scenario, prob 1): min y s.t. y >= 5 - x, y >= 0.
        let mut sub_model = DenseLpAdapter::new();
        let y = sub_model.add_variable(0.0, E::INFINITY, 1.0);
        sub_model.add_row(&[y], &[1.0], 5.0, 5.0).unwrap();
        let terms = vec![MasterTerm { row: 0, column: 0, coeff: -1.0 }];
        let sub = Subproblem::new(0, 1.0, terms, 1, vec![5.0], sub_model);

        LShapedEngine::new(
            vec![1.0],
            vec![0.0],
            vec![10.0],
            Vec::new(),
            vec![sub],
            LocalizationState::plain(),
            DenseLpAdapter::new(),
            LShapedOptions::new(),
            Some(vec![0.0]),
        )
        .unwrap()
    }

    #[test]
    fn converges_to_optimal_on_simple_two_stage_lp() {
        let mut engine = simple_two_stage_lp();
        let result = engine.solve(50).unwrap();
        assert_eq!(result.status, Status::Optimal);
        // y is linked to exactly 5 - x, so x + y = 5 for any feasible x in [0, 5].
        assert!((result.objective - 5.0).abs() < 1e-3, "objective was {}", result.objective);
    }
}
