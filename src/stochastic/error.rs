//! Error types for the decomposition engine.

use derive_more::{Display, Error};

use crate::I;

/// Errors raised while building or mutating problem data (cuts, rows, vectors).
#[derive(Debug, Display, Error, PartialEq)]
pub enum ShapeError {
    #[display("gradient has length {dq} but x has length {x}")]
    DqXLength { dq: usize, x: usize },
    #[display(
        "row has both a finite lower bound and a finite (different) upper bound; ranged rows are rejected"
    )]
    RangedRow,
    #[display("x0 has length {given} but the first-stage problem has {expected} columns")]
    X0Length { given: usize, expected: usize },
    #[display("crash strategy 'EVP' is not implemented; use 'none'")]
    UnsupportedCrash,
    #[display("a first-stage row passed to the engine was not a LinearConstraint hyperplane")]
    InvalidFirstStageRow,
    #[display("the selected localization variant requires a QP-capable adapter, but the configured adapter does not support quadratic objectives")]
    RequiresQp,
    #[display("subproblem {id} solver returned a non-terminal status ({detail}); this is a fatal solver fault")]
    SolverFault { id: usize, detail: &'static str },
}

/// Errors raised by the LP/QP adapter boundary.
#[derive(Debug, Display, Error, PartialEq)]
pub enum AdapterError {
    #[display("the configured adapter does not support quadratic objectives")]
    NoQpSupport,
    #[display("adapter failed to solve the model: {reason}")]
    SolveFailed { reason: String },
    #[display("row index {index} is out of range (model has {n_rows} rows)")]
    RowOutOfRange { index: I, n_rows: usize },
}

/// A terminal, non-optimal engine status paired with the best gap observed.
#[derive(Debug, Display, Error, PartialEq)]
#[display("engine stopped with status {status:?} after gap {gap:e}")]
pub struct EngineError {
    pub status: crate::Status,
    pub gap: crate::E,
}
