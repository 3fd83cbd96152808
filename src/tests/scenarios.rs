//! Simple-LP parity, infeasibility, and regularized-QP-requirement scenarios.

use rstest::rstest;
use rstest_reuse::{apply, template};

use crate::E;
use crate::Status;
use crate::stochastic::{LShapedKind, LShapedSolver, LShapedSolverBuilder};
use crate::stochastic::adapter::{AdapterError, DenseLpAdapter, LpAdapter, SolveOutcome};
use crate::stochastic::error::ShapeError;
use crate::stochastic::options::LShapedOptions;
use crate::stochastic::subproblem::{MasterTerm, Subproblem};

/// `min y s.t. y - s = demand - (x1 + x2), y,s >= 0` linked by `coeff = 1.0`
/// on both first-stage columns, so the subproblem's recourse value is
/// `max(0, demand - (x1 + x2))`.
fn newsvendor_subproblem(id: usize, probability: E, demand: E) -> Subproblem<DenseLpAdapter> {
    let mut model = DenseLpAdapter::new();
    let y = model.add_variable(0.0, E::INFINITY, 1.0);
    let s = model.add_variable(0.0, E::INFINITY, 0.0);
    model.add_row(&[y, s], &[1.0, -1.0], demand, demand).unwrap();
    let terms = vec![
        MasterTerm { row: 0, column: 0, coeff: 1.0 },
        MasterTerm { row: 0, column: 1, coeff: 1.0 },
    ];
    Subproblem::new(id, probability, terms, 2, vec![demand], model)
}

/// The "simple-lp" scenario from the testable-properties scenario list:
/// two first-stage variables, two scenarios. Whatever `x1 + x2` the engine
/// settles on in `[0, 3]`, the true recourse function makes the total
/// objective exactly `4.0` (see derivation in the module doc), so every
/// localization variant should land on the same value.
fn simple_lp_solver(kind: LShapedKind, workers: usize, linearize: bool) -> LShapedSolver<DenseLpAdapter> {
    let subs = vec![newsvendor_subproblem(0, 0.5, 5.0), newsvendor_subproblem(1, 0.5, 3.0)];
    LShapedSolverBuilder::<DenseLpAdapter>::new()
        .with_kind(kind)
        .with_first_stage(vec![1.0, 1.0], vec![0.0, 0.0], vec![10.0, 10.0])
        .with_subproblems(subs)
        .with_master(DenseLpAdapter::new())
        .with_options(LShapedOptions::new().with_linearize(linearize))
        .with_x0(vec![0.0, 0.0])
        .with_workers(workers)
        .build()
        .unwrap()
}

/// Shared linearize-mode dimension applied to both the serial and the
/// distributed variant cases below.
#[template]
#[rstest]
fn linearize_modes(#[values(true, false)] linearize: bool) {}

#[apply(linearize_modes)]
#[case::plain(LShapedKind::Ls)]
#[case::regularized(LShapedKind::Rd)]
#[case::trust_region(LShapedKind::Tr)]
#[case::level_set(LShapedKind::Lv)]
fn simple_lp_serial_variant_converges(linearize: bool, #[case] kind: LShapedKind) {
    let mut solver = simple_lp_solver(kind, 1, linearize);
    let result = solver.solve(200).unwrap();
    assert_eq!(result.status, Status::Optimal, "{kind:?} (linearize={linearize}) did not converge");
    assert!(
        (result.objective - 4.0).abs() < 1e-3,
        "{kind:?} (linearize={linearize}) converged to {} instead of 4.0",
        result.objective
    );
}

#[apply(linearize_modes)]
#[case::plain(LShapedKind::Dls)]
#[case::regularized(LShapedKind::Drd)]
#[case::trust_region(LShapedKind::Dtr)]
#[case::level_set(LShapedKind::Dlv)]
fn simple_lp_distributed_variant_converges(linearize: bool, #[case] kind: LShapedKind) {
    let mut solver = simple_lp_solver(kind, 2, linearize);
    let result = solver.solve(200).unwrap();
    assert_eq!(result.status, Status::Optimal, "{kind:?} (linearize={linearize}) did not converge");
    assert!(
        (result.objective - 4.0).abs() < 1e-3,
        "{kind:?} (linearize={linearize}) converged to {} instead of 4.0",
        result.objective
    );
}

/// Async determinism-under-permutation (scenario 6): the distributed
/// coordinator's cut arrival order is at the mercy of OS thread scheduling,
/// yet every run should land on the same optimum to within `tau`.
#[test]
fn async_level_set_converges_regardless_of_arrival_order() {
    for _ in 0..5 {
        let mut solver = simple_lp_solver(LShapedKind::Dls, 2, true);
        let result = solver.solve(200).unwrap();
        assert_eq!(result.status, Status::Optimal);
        assert!((result.objective - 4.0).abs() < 1e-3);
    }
}

/// A subproblem that is feasible only while `x <= 5`: `y = x` with `y`
/// capped at an upper bound of `5`.
fn capped_subproblem() -> Subproblem<DenseLpAdapter> {
    let mut model = DenseLpAdapter::new();
    let y = model.add_variable(0.0, 5.0, 0.0);
    model.add_row(&[y], &[1.0], 0.0, 0.0).unwrap();
    let terms = vec![MasterTerm { row: 0, column: 0, coeff: -1.0 }];
    Subproblem::new(0, 1.0, terms, 1, vec![0.0], model)
}

#[test]
fn default_engine_reports_infeasible_when_recourse_is_infeasible() {
    let mut solver = LShapedSolverBuilder::<DenseLpAdapter>::new()
        .with_kind(LShapedKind::Ls)
        .with_first_stage(vec![-1.0], vec![0.0], vec![10.0])
        .with_subproblem(capped_subproblem())
        .with_master(DenseLpAdapter::new())
        .with_x0(vec![0.0])
        .build()
        .unwrap();
    let result = solver.solve(50).unwrap();
    assert_eq!(result.status, Status::Infeasible);
}

#[test]
fn checkfeas_recovers_extensive_form_optimum_with_bundle_one_or_two() {
    for bundle in [1usize, 2usize] {
        let mut solver = LShapedSolverBuilder::<DenseLpAdapter>::new()
            .with_kind(LShapedKind::Ls)
            .with_first_stage(vec![-1.0], vec![0.0], vec![10.0])
            .with_subproblem(capped_subproblem())
            .with_master(DenseLpAdapter::new())
            .with_options(LShapedOptions::new().with_checkfeas(true).with_bundle(bundle))
            .with_x0(vec![0.0])
            .build()
            .unwrap();
        let result = solver.solve(200).unwrap();
        assert_eq!(result.status, Status::Optimal, "bundle={bundle}");
        assert!((result.x[0] - 5.0).abs() < 1e-3, "bundle={bundle} x={:?}", result.x);
    }
}

/// An adapter that never supports a quadratic objective, used only to
/// exercise the "regularized decomposition over an LP-only adapter" failure.
struct LpOnlyAdapter(DenseLpAdapter);

impl LpAdapter for LpOnlyAdapter {
    fn add_variable(&mut self, lb: E, ub: E, cost: E) -> usize {
        self.0.add_variable(lb, ub, cost)
    }
    fn set_objective(&mut self, linear: &[E]) {
        self.0.set_objective(linear)
    }
    fn objective(&self) -> &[E] {
        self.0.objective()
    }
    fn set_quadratic_objective(&mut self, _diag: &[E]) -> Result<(), AdapterError> {
        Err(AdapterError::NoQpSupport)
    }
    fn supports_qp(&self) -> bool {
        false
    }
    fn add_row(&mut self, indices: &[usize], values: &[E], lb: E, ub: E) -> Result<usize, ShapeError> {
        self.0.add_row(indices, values, lb, ub)
    }
    fn delete_rows(&mut self, rows: &[usize]) {
        self.0.delete_rows(rows)
    }
    fn set_bounds(&mut self, var: usize, lb: E, ub: E) {
        self.0.set_bounds(var, lb, ub)
    }
    fn set_row_bounds(&mut self, row: usize, lb: E, ub: E) {
        self.0.set_row_bounds(row, lb, ub)
    }
    fn n_vars(&self) -> usize {
        self.0.n_vars()
    }
    fn n_rows(&self) -> usize {
        self.0.n_rows()
    }
    fn solve(&mut self) -> SolveOutcome {
        self.0.solve()
    }
}

#[test]
fn regularized_decomposition_over_lp_only_adapter_fails_before_iterating() {
    let sub = newsvendor_subproblem(0, 1.0, 5.0);
    let built = LShapedSolverBuilder::<LpOnlyAdapter>::new()
        .with_kind(LShapedKind::Rd)
        .with_first_stage(vec![1.0, 1.0], vec![0.0, 0.0], vec![10.0, 10.0])
        .with_subproblem(sub)
        .with_master(LpOnlyAdapter(DenseLpAdapter::new()))
        .with_x0(vec![0.0, 0.0])
        .build();
    assert!(built.is_err(), "expected construction to fail before any iteration");
}
