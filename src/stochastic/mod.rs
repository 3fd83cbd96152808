//! Two-stage stochastic linear programming via Benders (L-shaped)
//! decomposition.
//!
//! [`LShapedSolverBuilder`] assembles a first-stage problem and its
//! scenario subproblems into either the serial [`master::LShapedEngine`] or
//! the distributed [`parallel::ParallelLShapedEngine`], picking the
//! localization strategy and cut-pool bookkeeping from an
//! [`options::LShapedKind`].

pub mod adapter;
pub mod bundle;
pub mod error;
pub mod hyperplane;
pub mod localization;
pub mod master;
pub mod options;
pub mod parallel;
pub mod subproblem;

use problemo::Problem;
use problemo::common::IntoCommonProblem;

use crate::E;
use crate::stochastic::adapter::LpAdapter;
use crate::stochastic::hyperplane::Hyperplane;
use crate::stochastic::localization::LocalizationState;
use crate::stochastic::master::{LShapedEngine, SolveResult};
use crate::stochastic::options::LShapedOptions;
use crate::stochastic::parallel::ParallelLShapedEngine;
use crate::stochastic::subproblem::Subproblem;

/// Which localization strategy to run, and whether it runs against a
/// distributed pool of workers (`D*`) or a single process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LShapedKind {
    /// Plain cutting-plane L-shaped method.
    Ls,
    /// Ruszczynski's regularized decomposition.
    Rd,
    /// Linderoth & Wright's trust region method.
    Tr,
    /// Level sets.
    Lv,
    /// Distributed plain cutting-plane.
    Dls,
    /// Distributed regularized decomposition.
    Drd,
    /// Distributed trust region.
    Dtr,
    /// Distributed level sets.
    Dlv,
}

impl LShapedKind {
    fn is_distributed(self) -> bool {
        matches!(self, Self::Dls | Self::Drd | Self::Dtr | Self::Dlv)
    }

    /// Builds the localization state this kind starts from, using the
    /// tunables in `options`.
    fn localization(self, options: &LShapedOptions) -> LocalizationState {
        match self {
            Self::Ls | Self::Dls => LocalizationState::plain(),
            Self::Rd | Self::Drd => LocalizationState::regularized(options.sigma, options.gamma),
            Self::Tr | Self::Dtr => {
                LocalizationState::trust_region(options.delta_max.min(1.0), options.delta_max, options.gamma)
            }
            Self::Lv | Self::Dlv => LocalizationState::level_set(options.lambda, options.tau),
        }
    }
}

/// The assembled engine returned by [`LShapedSolverBuilder::build`]: either
/// a single-process run or a coordinator driving a worker pool. Both share
/// the same [`SolveResult`] output shape.
pub enum LShapedSolver<A: LpAdapter> {
    Serial(LShapedEngine<A>),
    Distributed(ParallelLShapedEngine<A>),
}

impl<A: LpAdapter + Send + 'static> LShapedSolver<A> {
    /// Runs the engine to a terminal status, or for at most `max_iterations`
    /// master resolves.
    pub fn solve(&mut self, max_iterations: usize) -> Result<SolveResult, Problem> {
        let result = match self {
            Self::Serial(engine) => engine.solve(max_iterations)?,
            Self::Distributed(engine) => engine.solve(max_iterations)?,
        };
        Ok(result)
    }

    pub fn with_progress_sink(self, sink: Box<dyn crate::callback::ProgressSink>) -> Self {
        match self {
            Self::Serial(engine) => Self::Serial(engine.with_progress_sink(sink)),
            Self::Distributed(engine) => Self::Distributed(engine.with_progress_sink(sink)),
        }
    }

    pub fn with_terminator(self, terminator: Box<dyn crate::terminators::Terminator>) -> Self {
        match self {
            Self::Serial(engine) => Self::Serial(engine.with_terminator(terminator)),
            Self::Distributed(engine) => Self::Distributed(engine.with_terminator(terminator)),
        }
    }
}

/// Assembles an [`LShapedSolver`] from first-stage data, scenario
/// subproblems, and a chosen variant.
///
/// Mirrors the builder pattern this crate uses elsewhere for solver
/// assembly: required fields are validated at [`Self::build`], not at each
/// setter, so partially-specified builders can be threaded through helper
/// functions before the final call.
pub struct LShapedSolverBuilder<A: LpAdapter> {
    kind: Option<LShapedKind>,
    c: Option<Vec<E>>,
    lb: Option<Vec<E>>,
    ub: Option<Vec<E>>,
    first_stage_rows: Vec<Hyperplane>,
    subproblems: Vec<Subproblem<A>>,
    master: Option<A>,
    options: LShapedOptions,
    x0: Option<Vec<E>>,
    workers: usize,
}

impl<A: LpAdapter> LShapedSolverBuilder<A> {
    pub fn new() -> Self {
        Self {
            kind: None,
            c: None,
            lb: None,
            ub: None,
            first_stage_rows: Vec::new(),
            subproblems: Vec::new(),
            master: None,
            options: LShapedOptions::new(),
            x0: None,
            workers: 1,
        }
    }

    pub fn with_kind(mut self, kind: LShapedKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// First-stage objective `c` and variable bounds.
    pub fn with_first_stage(mut self, c: Vec<E>, lb: Vec<E>, ub: Vec<E>) -> Self {
        self.c = Some(c);
        self.lb = Some(lb);
        self.ub = Some(ub);
        self
    }

    pub fn with_first_stage_row(mut self, row: Hyperplane) -> Self {
        self.first_stage_rows.push(row);
        self
    }

    pub fn with_subproblem(mut self, subproblem: Subproblem<A>) -> Self {
        self.subproblems.push(subproblem);
        self
    }

    pub fn with_subproblems(mut self, subproblems: Vec<Subproblem<A>>) -> Self {
        self.subproblems.extend(subproblems);
        self
    }

    pub fn with_master(mut self, master: A) -> Self {
        self.master = Some(master);
        self
    }

    pub fn with_options(mut self, options: LShapedOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_x0(mut self, x0: Vec<E>) -> Self {
        self.x0 = Some(x0);
        self
    }

    /// Number of worker threads for a distributed (`D*`) kind. Ignored by
    /// the serial kinds. Defaults to `1`.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn build(self) -> Result<LShapedSolver<A>, Problem>
    where
        A: LpAdapter + Send + 'static,
    {
        let kind = self.kind.ok_or_else(|| "L-shaped variant must be specified".gloss())?;
        let c = self.c.ok_or_else(|| "first-stage objective must be provided".gloss())?;
        let lb = self.lb.ok_or_else(|| "first-stage lower bounds must be provided".gloss())?;
        let ub = self.ub.ok_or_else(|| "first-stage upper bounds must be provided".gloss())?;
        let master = self.master.ok_or_else(|| "a master LP/QP adapter must be provided".gloss())?;

        let localization = kind.localization(&self.options);

        if kind.is_distributed() {
            let engine = ParallelLShapedEngine::new(
                c,
                lb,
                ub,
                self.first_stage_rows,
                self.subproblems,
                self.workers,
                localization,
                master,
                self.options,
                self.x0,
            )?;
            Ok(LShapedSolver::Distributed(engine))
        } else {
            let engine = LShapedEngine::new(
                c,
                lb,
                ub,
                self.first_stage_rows,
                self.subproblems,
                localization,
                master,
                self.options,
                self.x0,
            )?;
            Ok(LShapedSolver::Serial(engine))
        }
    }
}

impl<A: LpAdapter> Default for LShapedSolverBuilder<A> {
    fn default() -> Self {
        Self::new()
    }
}
