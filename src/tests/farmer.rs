//! The Birge & Louveaux farmer problem: three crops, three weather
//! scenarios, a land budget enforced as a first-stage linear constraint.
//!
//! 500 acres are split between wheat, corn, and sugar beets. Each acre
//! planted costs `150`/`230`/`260` respectively. Yields scale with the
//! weather scenario (good/average/bad, each probability 1/3). Wheat and
//! corn must cover a minimum household/feed requirement, any shortfall
//! bought at a premium and any surplus sold; beets sell at a high price up
//! to a quota and a much lower price above it.

use crate::E;
use crate::Status;
use crate::stochastic::LShapedKind;
use crate::stochastic::adapter::DenseLpAdapter;
use crate::stochastic::hyperplane::Hyperplane;
use crate::stochastic::options::LShapedOptions;
use crate::stochastic::subproblem::{MasterTerm, Subproblem};
use crate::stochastic::LShapedSolverBuilder;

const WHEAT_REQUIREMENT: E = 240.0;
const CORN_REQUIREMENT: E = 200.0;
const BEET_QUOTA: E = 6000.0;

/// Builds one weather scenario's recourse LP. `yields` is
/// `(wheat, corn, beets)` tons/acre under this scenario.
fn farmer_scenario(id: usize, probability: E, yields: (E, E, E)) -> Subproblem<DenseLpAdapter> {
    let (yield_wheat, yield_corn, yield_beets) = yields;
    let mut model = DenseLpAdapter::new();

    // Wheat: buy at 238/ton, sell at 170/ton.
    let buy_wheat = model.add_variable(0.0, E::INFINITY, 238.0);
    let sell_wheat = model.add_variable(0.0, E::INFINITY, -170.0);
    // Corn: buy at 210/ton, sell at 150/ton.
    let buy_corn = model.add_variable(0.0, E::INFINITY, 210.0);
    let sell_corn = model.add_variable(0.0, E::INFINITY, -150.0);
    // Beets: sell up to the quota at 36/ton, anything above at 10/ton.
    let sell_beets_quota = model.add_variable(0.0, BEET_QUOTA, -36.0);
    let sell_beets_excess = model.add_variable(0.0, E::INFINITY, -10.0);
    // Surplus slacks turning each `>=`/`<=` requirement into an equality row.
    let surplus_wheat = model.add_variable(0.0, E::INFINITY, 0.0);
    let surplus_corn = model.add_variable(0.0, E::INFINITY, 0.0);
    let surplus_beets = model.add_variable(0.0, E::INFINITY, 0.0);

    // buy_wheat - sell_wheat - surplus_wheat = WHEAT_REQUIREMENT - yield_wheat * x_wheat
    let row_wheat = model
        .add_row(
            &[buy_wheat, sell_wheat, surplus_wheat],
            &[1.0, -1.0, -1.0],
            WHEAT_REQUIREMENT,
            WHEAT_REQUIREMENT,
        )
        .unwrap();
    // buy_corn - sell_corn - surplus_corn = CORN_REQUIREMENT - yield_corn * x_corn
    let row_corn = model
        .add_row(&[buy_corn, sell_corn, surplus_corn], &[1.0, -1.0, -1.0], CORN_REQUIREMENT, CORN_REQUIREMENT)
        .unwrap();
    // -sell_beets_quota - sell_beets_excess - surplus_beets = -yield_beets * x_beets
    let row_beets = model
        .add_row(&[sell_beets_quota, sell_beets_excess, surplus_beets], &[-1.0, -1.0, -1.0], 0.0, 0.0)
        .unwrap();

    let terms = vec![
        MasterTerm { row: row_wheat, column: 0, coeff: yield_wheat },
        MasterTerm { row: row_corn, column: 1, coeff: yield_corn },
        MasterTerm { row: row_beets, column: 2, coeff: yield_beets },
    ];
    Subproblem::new(id, probability, terms, 3, vec![WHEAT_REQUIREMENT, CORN_REQUIREMENT, 0.0], model)
}

fn farmer_problem(bundle: usize) -> crate::stochastic::LShapedSolver<DenseLpAdapter> {
    let subs = vec![
        farmer_scenario(0, 1.0 / 3.0, (3.0, 3.6, 24.0)), // good weather
        farmer_scenario(1, 1.0 / 3.0, (2.5, 3.0, 20.0)), // average weather
        farmer_scenario(2, 1.0 / 3.0, (2.0, 2.4, 16.0)), // bad weather
    ];
    let land_budget = Hyperplane::linear_constraint(vec![0, 1, 2], vec![1.0, 1.0, 1.0], E::NEG_INFINITY, 500.0);

    LShapedSolverBuilder::<DenseLpAdapter>::new()
        .with_kind(LShapedKind::Ls)
        .with_first_stage(vec![150.0, 230.0, 260.0], vec![0.0, 0.0, 0.0], vec![500.0, 500.0, 500.0])
        .with_first_stage_row(land_budget)
        .with_subproblems(subs)
        .with_master(DenseLpAdapter::new())
        .with_options(LShapedOptions::new().with_bundle(bundle).with_tau(1e-5))
        .with_x0(vec![0.0, 0.0, 0.0])
        .build()
        .unwrap()
}

/// The textbook extensive-form optimum plants all 500 acres (budget binds),
/// with beet acreage pinned at 250 (to exploit the `36`/ton quota price
/// without triggering the `10`/ton excess price) and the rest split between
/// wheat and corn. Birge & Louveaux (*Introduction to Stochastic
/// Programming*) report the recourse problem's expected *profit* as
/// 108,390; this engine minimizes cost (planting cost plus purchases minus
/// sales), i.e. negative profit, so the matching objective is `-108,390`.
const FARMER_OPTIMUM: E = -108_390.0;

#[test]
fn farmer_converges_to_extensive_form_optimum() {
    let mut solver = farmer_problem(1);
    let result = solver.solve(500).unwrap();
    assert_eq!(result.status, Status::Optimal);
    assert!(
        (result.objective - FARMER_OPTIMUM).abs() / FARMER_OPTIMUM.abs() < 5e-3,
        "objective {} too far from known optimum {}",
        result.objective,
        FARMER_OPTIMUM
    );
}

#[test]
fn farmer_converges_with_bundle_of_two() {
    let mut solver = farmer_problem(2);
    let result = solver.solve(500).unwrap();
    assert_eq!(result.status, Status::Optimal);
    assert!(
        (result.objective - FARMER_OPTIMUM).abs() / FARMER_OPTIMUM.abs() < 5e-3,
        "objective {} too far from known optimum {}",
        result.objective,
        FARMER_OPTIMUM
    );
}
