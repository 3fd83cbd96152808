//! Progress reporting sink for the decomposition loop.
//!
//! The master loop (serial or parallel) reports its state once per iteration
//! through an injected [`ProgressSink`] rather than printing directly, so
//! tests can substitute [`NoOpSink`] and interactive callers can substitute
//! [`ConvergenceOutput`] or [`IndicatifSink`].

use crate::E;

/// Snapshot of engine progress passed to a [`ProgressSink`] once per iteration.
#[derive(Debug, Clone)]
pub struct ProgressReport<'a> {
    pub iteration: usize,
    /// Current lower model value (master objective including the theta columns).
    pub lower_bound: E,
    /// Best recourse upper bound observed so far (Q or the incumbent Q-tilde).
    pub upper_bound: E,
    /// `upper_bound - lower_bound`, the quantity compared against tau.
    pub gap: E,
    /// Current first-stage iterate.
    pub x: &'a [E],
}

/// Hook invoked once per iteration with the current solver state.
pub trait ProgressSink {
    /// Creates a new sink. Implementations that hold no configuration can ignore this.
    fn new() -> Self
    where
        Self: Sized;

    /// Called at the end of each iteration with the current progress report.
    fn update(&mut self, report: &ProgressReport);
}

/// A sink that does nothing. Use when no per-iteration output is needed.
pub struct NoOpSink;

impl ProgressSink for NoOpSink {
    fn new() -> Self {
        Self
    }

    fn update(&mut self, _report: &ProgressReport) {
        // Do nothing
    }
}

/// Prints the bound history and gap to stdout each iteration.
pub struct ConvergenceOutput;

impl ProgressSink for ConvergenceOutput {
    fn new() -> Self {
        Self
    }

    fn update(&mut self, report: &ProgressReport) {
        let txt = format!(
            "| {:4}: | {:<12.6e} | {:<12.6e} | {:<12.6e} |",
            report.iteration, report.lower_bound, report.upper_bound, report.gap,
        );
        println!("{}", txt);
    }
}

/// Drives an indeterminate-length `indicatif` spinner from engine reports.
pub struct IndicatifSink {
    bar: indicatif::ProgressBar,
}

impl ProgressSink for IndicatifSink {
    fn new() -> Self {
        let bar = indicatif::ProgressBar::new_spinner();
        if let Ok(style) = indicatif::ProgressStyle::with_template("{spinner} [{elapsed_precise}] {msg}")
        {
            bar.set_style(style);
        }
        Self { bar }
    }

    fn update(&mut self, report: &ProgressReport) {
        self.bar.set_message(format!(
            "iter {}: lb={:.6e} ub={:.6e} gap={:.3e}",
            report.iteration, report.lower_bound, report.upper_bound, report.gap,
        ));
        self.bar.tick();
    }
}
