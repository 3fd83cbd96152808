//! The distributed master loop: one coordinator thread plus `W` worker
//! threads, each owning a disjoint partition of the scenario subproblems.
//!
//! Workers never see the master model; they only ever resolve their own
//! subproblems against a first-stage point handed to them over a channel,
//! and report the resulting cut back. The coordinator advances its
//! timestamp asynchronously: once `kappa` of the outstanding subproblems
//! for the current timestamp have reported, it resolves the master, takes
//! a localization step, and broadcasts the next trial point without
//! waiting for the stragglers. Stragglers report is still folded in once
//! it eventually arrives, against whichever timestamp it was computed for.

use std::collections::{HashMap, HashSet};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;

use crate::E;
use crate::Status;
use crate::callback::{NoOpSink, ProgressReport, ProgressSink};
use crate::stochastic::adapter::{LpAdapter, SolverStatus};
use crate::stochastic::error::{EngineError, ShapeError};
use crate::stochastic::hyperplane::{Hyperplane, HyperplaneKind};
use crate::stochastic::localization::{CutPool, LocalizationState};
use crate::stochastic::master::{SolveResult, THETA_FLOOR};
use crate::stochastic::options::LShapedOptions;
use crate::stochastic::subproblem::Subproblem;
use crate::terminators::Terminator;

/// A trial point broadcast to every worker at a given timestamp.
struct Decision {
    t: u64,
    x: Vec<E>,
}

/// Told to a worker: resolve its subproblems at the decision for `t`, or
/// shut down.
enum WorkMsg {
    Compute(u64),
    Shutdown,
}

/// One subproblem's report, tagged with the timestamp it was computed for.
enum Report {
    Cut { t: u64, id: usize, q: E, cut: Hyperplane },
    Fault { t: u64, id: usize },
}

fn worker_loop<A: LpAdapter>(
    mut subproblems: Vec<Subproblem<A>>,
    decisions_rx: Receiver<Decision>,
    work_rx: Receiver<WorkMsg>,
    cutqueue_tx: Sender<Report>,
) {
    let mut pending: HashMap<u64, Vec<E>> = HashMap::new();
    loop {
        match work_rx.recv() {
            Err(_) | Ok(WorkMsg::Shutdown) => return,
            Ok(WorkMsg::Compute(t)) => {
                while !pending.contains_key(&t) {
                    match decisions_rx.recv() {
                        Ok(decision) => {
                            pending.insert(decision.t, decision.x);
                        }
                        Err(_) => return,
                    }
                }
                let x = pending.remove(&t).unwrap();
                for sp in &mut subproblems {
                    let id = sp.id();
                    match sp.evaluate(&x) {
                        Ok((cut, q)) => {
                            if cutqueue_tx.send(Report::Cut { t, id, q, cut }).is_err() {
                                return;
                            }
                        }
                        Err(_) => {
                            let _ = cutqueue_tx.send(Report::Fault { t, id });
                        }
                    }
                }
            }
        }
    }
}

/// One worker's view of which subproblem ids it is responsible for; only
/// used by the coordinator to size its per-timestamp reporting tally.
struct WorkerChannels {
    decisions: Sender<Decision>,
    work: Sender<WorkMsg>,
}

/// Coordinator-side distributed master loop. Owns the master model and the
/// localization state; every subproblem resolve happens on a worker thread.
pub struct ParallelLShapedEngine<A: LpAdapter> {
    options: LShapedOptions,
    master: A,
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
    workers: Vec<WorkerChannels>,
    handles: Vec<thread::JoinHandle<()>>,
    cutqueue_rx: Receiver<Report>,
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

impl<A: LpAdapter + Send + 'static> ParallelLShapedEngine<A> {
    /// Partitions `subproblems` round-robin across `n_workers` threads.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        c: Vec<E>,
        lb: Vec<E>,
        ub: Vec<E>,
        first_stage_rows: Vec<Hyperplane>,
        subproblems: Vec<Subproblem<A>>,
        n_workers: usize,
        localization: LocalizationState,
        mut master: A,
        options: LShapedOptions,
        x0: Option<Vec<E>>,
    ) -> Result<Self, ShapeError> {
        let n_first_stage = c.len();
        let n_scenarios = subproblems.len();
        let n_workers = n_workers.max(1);

        if options.crash == crate::stochastic::options::Crash::Evp {
            return Err(ShapeError::UnsupportedCrash);
        }
        if localization.requires_qp() && !master.supports_qp() {
            return Err(ShapeError::RequiresQp);
        }
        if matches!(localization, LocalizationState::LevelSet { .. }) && !options.linearize {
            // The distributed driver keeps the master LP-only; a 2-norm
            // projection would need a QP-capable master just like the
            // serial engine, but is not implemented here.
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
            None => crate::stochastic::master::random_start(&lb, &ub),
        };

        for j in 0..n_first_stage {
            master.add_variable(lb[j], ub[j], c[j]);
        }
        // In linearize mode the theta cost starts at zero and is promoted to
        // one the first time an optimality cut for that id is added, same as
        // the serial engine (master.rs) — otherwise a bundle that is still
        // collecting feasibility cuts double-counts the recourse term.
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
            master.set_quadratic_objective(&diag).map_err(|_| ShapeError::RequiresQp)?;
        }

        let cut_pool = CutPool::new(first_stage_rows, n_scenarios);

        let mut buckets: Vec<Vec<Subproblem<A>>> = (0..n_workers).map(|_| Vec::new()).collect();
        for (i, sp) in subproblems.into_iter().enumerate() {
            buckets[i % n_workers].push(sp);
        }

        let (cutqueue_tx, cutqueue_rx) = mpsc::channel::<Report>();
        let mut workers = Vec::with_capacity(n_workers);
        let mut handles = Vec::with_capacity(n_workers);
        for bucket in buckets {
            let (decisions_tx, decisions_rx) = mpsc::channel::<Decision>();
            let (work_tx, work_rx) = mpsc::channel::<WorkMsg>();
            let cutqueue_tx = cutqueue_tx.clone();
            let handle = thread::spawn(move || worker_loop(bucket, decisions_rx, work_rx, cutqueue_tx));
            workers.push(WorkerChannels { decisions: decisions_tx, work: work_tx });
            handles.push(handle);
        }

        Ok(Self {
            options,
            master,
            c,
            n_first_stage,
            n_scenarios,
            lb,
            ub,
            localization,
            cut_pool,
            theta_promoted,
            workers,
            handles,
            cutqueue_rx,
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

    fn broadcast(&self, t: u64, x: &[E]) {
        for w in &self.workers {
            let _ = w.decisions.send(Decision { t, x: x.to_vec() });
            let _ = w.work.send(WorkMsg::Compute(t));
        }
    }

    fn shutdown(&mut self) {
        for w in &self.workers {
            let _ = w.work.send(WorkMsg::Shutdown);
        }
        for handle in self.handles.drain(..) {
            let _ = handle.join();
        }
    }

    fn theta_values(&self) -> Vec<E> {
        self.x[self.n_first_stage..]
            .iter()
            .map(|&v| if v <= THETA_FLOOR { E::NEG_INFINITY } else { v })
            .collect()
    }

    /// `c.x` using the engine's true first-stage cost, independent of
    /// whatever linear term currently sits in the master's own objective
    /// (the regularized-decomposition variant rewrites that term every step
    /// to center the proximal penalty on `xi`).
    fn master_objective_at(&self, x: &[E]) -> E {
        self.c.iter().zip(x.iter()).map(|(c, xi)| c * xi).sum()
    }

    /// Rebuilds the master's regularized-decomposition objective —
    /// `c.x - (1/sigma)*xi.x` linear part plus a `1/sigma` diagonal on the
    /// x-block — from the current `sigma`/`xi`, as required on both serious
    /// and null steps. A no-op for every other localization variant.
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

    fn finish(&mut self, status: Status, iterations: usize) -> SolveResult {
        self.shutdown();
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

    /// Asynchronous distributed loop: advances timestamp `t` once `kappa`
    /// of the `n_scenarios` subproblems for `t` have reported, without
    /// waiting for the rest (their report is still applied to the master
    /// when it eventually arrives, against whichever `t` it names).
    pub fn solve(&mut self, max_iterations: usize) -> Result<SolveResult, EngineError> {
        if let Some(terminator) = &mut self.terminator {
            terminator.initialize();
        }

        let mut t: u64 = 0;
        self.broadcast(t, &self.x.clone());

        let mut q_partial: HashMap<u64, E> = HashMap::new();
        let mut reported: HashMap<u64, HashSet<usize>> = HashMap::new();
        let mut advanced: HashSet<u64> = HashSet::new();
        let mut iteration = 0usize;

        loop {
            if iteration >= max_iterations {
                return Ok(self.finish(Status::IterationLimit, iteration));
            }
            if let Some(terminator) = &mut self.terminator {
                if let Some(status) = terminator.terminate() {
                    return Ok(self.finish(status, iteration));
                }
            }

            let report = match self.cutqueue_rx.recv() {
                Ok(report) => report,
                Err(_) => {
                    return Err(EngineError { status: Status::StoppedPrematurely, gap: E::INFINITY });
                }
            };

            // A report for a timestamp already advanced past is a straggler:
            // its cut is still valid (cuts never expire) and is still
            // applied to the master, it just cannot retroactively
            // contribute to an advance tally that already fired.
            match report {
                Report::Fault { .. } => {
                    return Err(EngineError { status: Status::StoppedPrematurely, gap: E::INFINITY });
                }
                Report::Cut { t: cut_t, id, q, cut } => {
                    match cut.kind() {
                        HyperplaneKind::Unbounded => return Ok(self.finish(Status::Unbounded, iteration)),
                        HyperplaneKind::Infeasible => return Ok(self.finish(Status::Infeasible, iteration)),
                        HyperplaneKind::Feasibility => {
                            if !self.options.checkfeas {
                                return Ok(self.finish(Status::Infeasible, iteration));
                            }
                            self.insert_cut(cut)?;
                        }
                        _ => {
                            *q_partial.entry(cut_t).or_insert(0.0) += q;
                            self.insert_cut(cut)?;
                        }
                    }
                    reported.entry(cut_t).or_default().insert(id);
                }
            }

            let tally = reported.get(&t).map(HashSet::len).unwrap_or(0);
            let threshold = (self.options.kappa * self.n_scenarios as E).ceil() as usize;
            if !advanced.contains(&t) && tally >= threshold.max(1) {
                advanced.insert(t);
                iteration += 1;

                let outcome = self.master.solve();
                match outcome.status {
                    SolverStatus::Infeasible => return Ok(self.finish(Status::Infeasible, iteration)),
                    SolverStatus::Unbounded => return Ok(self.finish(Status::Unbounded, iteration)),
                    SolverStatus::Other => {
                        return Err(EngineError { status: Status::StoppedPrematurely, gap: E::INFINITY });
                    }
                    SolverStatus::Optimal => {}
                }
                self.x = outcome.primal;

                let q_sum = q_partial.get(&t).copied().unwrap_or(0.0);
                let q = self.master_objective_at(&self.x.clone()) + q_sum;

                let theta_model = self.theta_values();
                let theta_sum: E = theta_model.iter().filter(|v| v.is_finite()).sum();
                let theta = self.master_objective_at(&self.x.clone()) + theta_sum;

                self.q_history.push(q);
                self.theta_history.push(theta);

                self.localization
                    .take_step(q, &mut self.q_tilde, theta, &self.x, &mut self.xi, self.options.tau);
                self.q_tilde_history.push(self.q_tilde);
                if let Some(radius) = self.localization.radius() {
                    self.delta_history.push(radius);
                }
                self.rebuild_regularizer()?;

                let (new_lb, new_ub) = self.localization.master_bounds(&self.lb, &self.ub, &self.xi);
                for j in 0..self.n_first_stage {
                    self.master.set_bounds(j, new_lb[j], new_ub[j]);
                }

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
                    return Ok(self.finish(Status::Optimal, iteration));
                }

                t += 1;
                self.broadcast(t, &self.x.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stochastic::adapter::DenseLpAdapter;
    use crate::stochastic::options::LShapedOptions;
    use crate::stochastic::subproblem::MasterTerm;

    fn two_scenario_engine() -> ParallelLShapedEngine<DenseLpAdapter> {
        // First stage: min x, x in [0, 10].
        // Two scenarios, each: min y s.t. y >= d - x, y >= 0, d in {5, 3}.
        let build_sub = |id: usize, prob: E, demand: E| {
            let mut model = DenseLpAdapter::new();
            let y = model.add_variable(0.0, E::INFINITY, 1.0);
            model.add_row(&[y], &[1.0], demand, demand).unwrap();
            let terms = vec![MasterTerm { row: 0, column: 0, coeff: -1.0 }];
            Subproblem::new(id, prob, terms, 1, vec![demand], model)
        };
        let subs = vec![build_sub(0, 0.5, 5.0), build_sub(1, 0.5, 3.0)];

        ParallelLShapedEngine::new(
            vec![1.0],
            vec![0.0],
            vec![10.0],
            Vec::new(),
            subs,
            2,
            LocalizationState::plain(),
            DenseLpAdapter::new(),
            LShapedOptions::new().with_kappa(1.0),
            Some(vec![0.0]),
        )
        .unwrap()
    }

    #[test]
    fn converges_with_two_workers_reporting_synchronously() {
        let mut engine = two_scenario_engine();
        let result = engine.solve(50).unwrap();
        assert_eq!(result.status, Status::Optimal);
        // y_i = d_i - x for both scenarios, so x + 0.5*y1 + 0.5*y2 = 4 for any feasible x in [0, 3].
        assert!((result.objective - 4.0).abs() < 1e-3, "objective was {}", result.objective);
    }
}
