//! Configuration for the L-shaped decomposition engine.

use crate::E;

/// Crash strategy for the initial first-stage iterate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Crash {
    /// Use the user-supplied (or random) `x0` as given.
    #[default]
    None,
    /// Crash from the expected-value problem. Not implemented; selecting this
    /// is a construction-time [`crate::stochastic::error::ShapeError::UnsupportedCrash`].
    Evp,
}

/// Which localization strategy stabilizes the master iterate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocalizationKind {
    /// No stabilization; the plain L-shaped method.
    Plain,
    /// Regularized decomposition (Ruszczynski): quadratic proximal term.
    Regularized,
    /// Trust region (Linderoth & Wright): box constraint around the incumbent.
    TrustRegion,
    /// Level sets: projection onto a level set of the current lower model.
    LevelSet,
}

/// Tunable parameters for an [`crate::stochastic::master::LShapedEngine`].
///
/// Mirrors the option surface of the method this crate implements: a small,
/// fully-known set of named fields rather than a dynamically registered
/// option bag, since nothing here is added or composed at runtime.
#[derive(Debug, Clone)]
pub struct LShapedOptions {
    /// Convergence tolerance used throughout the hyperplane predicates.
    pub tau: E,
    /// Step-acceptance parameter for regularized decomposition / trust region.
    pub gamma: E,
    /// Number of subproblem cuts aggregated into a single master row.
    pub bundle: usize,
    /// Initial regularization weight (regularized decomposition only).
    pub sigma: E,
    /// Level parameter (level sets only).
    pub lambda: E,
    /// Fraction of outstanding subproblems required before an asynchronous
    /// coordinator advances its timestamp.
    pub kappa: E,
    /// Whether trust-region radii adapt automatically.
    pub autotune: bool,
    /// Use a 1-norm projection (LP-only) instead of a 2-norm projection (QP)
    /// for the level-set variant.
    pub linearize: bool,
    /// Emit one [`crate::callback::ProgressSink::update`] call per iteration.
    pub log: bool,
    /// Generate feasibility cuts instead of terminating on subproblem infeasibility.
    pub checkfeas: bool,
    /// Maximum trust-region radius.
    pub delta_max: E,
    /// Crash strategy for the initial iterate.
    pub crash: Crash,
}

impl Default for LShapedOptions {
    fn default() -> Self {
        Self {
            tau: 1e-6,
            gamma: 1e-4,
            bundle: 1,
            sigma: 1.0,
            lambda: 0.5,
            kappa: 0.3,
            autotune: true,
            linearize: false,
            log: false,
            checkfeas: false,
            delta_max: 1e6,
            crash: Crash::None,
        }
    }
}

impl LShapedOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tau(mut self, tau: E) -> Self {
        self.tau = tau;
        self
    }

    pub fn with_gamma(mut self, gamma: E) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_bundle(mut self, bundle: usize) -> Self {
        self.bundle = bundle.max(1);
        self
    }

    pub fn with_sigma(mut self, sigma: E) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn with_lambda(mut self, lambda: E) -> Self {
        self.lambda = lambda;
        self
    }

    pub fn with_kappa(mut self, kappa: E) -> Self {
        self.kappa = kappa;
        self
    }

    pub fn with_autotune(mut self, autotune: bool) -> Self {
        self.autotune = autotune;
        self
    }

    pub fn with_linearize(mut self, linearize: bool) -> Self {
        self.linearize = linearize;
        self
    }

    pub fn with_log(mut self, log: bool) -> Self {
        self.log = log;
        self
    }

    pub fn with_checkfeas(mut self, checkfeas: bool) -> Self {
        self.checkfeas = checkfeas;
        self
    }

    pub fn with_delta_max(mut self, delta_max: E) -> Self {
        self.delta_max = delta_max;
        self
    }

    pub fn with_crash(mut self, crash: Crash) -> Self {
        self.crash = crash;
        self
    }
}
