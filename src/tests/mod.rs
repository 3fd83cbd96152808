//! End-to-end convergence scenarios exercising the assembled
//! [`crate::stochastic::LShapedSolver`] rather than individual module units.
//!
//! Larger, cross-module scenarios live here alongside the per-module
//! `#[cfg(test)]` blocks: these read against whole two-stage problems
//! (simple-lp, the classic farmer problem, an always/sometimes-infeasible
//! recourse) rather than a single function.

mod farmer;
mod scenarios;
