//! Stabilization state machines.
//!
//! The method admits several localization strategies that steer the
//! sequence of first-stage trial points towards the optimum faster than the
//! plain cutting-plane recursion. Rather than composing these behind a
//! trait object per strategy, they are re-expressed as one tagged enum
//! carrying variant-specific state; dispatch is a `match`, resolved
//! statically.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use crate::E;
use crate::stochastic::hyperplane::Hyperplane;

/// What kind of step `take_step` just performed, for logging/decisions
/// that depend on whether the incumbent moved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// The incumbent `xi` was updated to the new trial point.
    Serious,
    /// The incumbent was left unchanged.
    Null,
}

/// Tagged localization state. `Plain` carries nothing; the others carry
/// exactly the fields their update rule needs.
#[derive(Debug, Clone)]
pub enum LocalizationState {
    Plain,
    /// Ruszczynski's regularized decomposition.
    Regularized { sigma: E, gamma: E },
    /// Linderoth & Wright's trust region.
    TrustRegion {
        delta: E,
        delta_max: E,
        c_delta: u32,
        gamma: E,
    },
    /// Level sets.
    LevelSet { lambda: E, tau: E },
}

impl LocalizationState {
    pub fn plain() -> Self {
        Self::Plain
    }

    pub fn regularized(sigma: E, gamma: E) -> Self {
        Self::Regularized { sigma, gamma }
    }

    pub fn trust_region(delta0: E, delta_max: E, gamma: E) -> Self {
        Self::TrustRegion {
            delta: delta0,
            delta_max,
            c_delta: 0,
            gamma,
        }
    }

    pub fn level_set(lambda: E, tau: E) -> Self {
        Self::LevelSet { lambda, tau }
    }

    pub fn requires_qp(&self) -> bool {
        matches!(self, Self::Regularized { .. })
    }

    /// Current trust-region radius, for tests/diagnostics; `None` outside
    /// the trust-region variant.
    pub fn radius(&self) -> Option<E> {
        match self {
            Self::TrustRegion { delta, .. } => Some(*delta),
            _ => None,
        }
    }

    /// Updates variant-specific state from one iteration's `(Q, theta)`
    /// pair, deciding whether the trial point `x` becomes the new
    /// incumbent `xi`. Returns which kind of step was taken.
    ///
    /// `q_tilde` is the best recourse value seen so far (the incumbent's Q);
    /// it, and `xi`, are updated in place on a serious/major step.
    pub fn take_step(&mut self, q: E, q_tilde: &mut E, theta: E, x: &[E], xi: &mut Vec<E>, tau: E) -> StepKind {
        match self {
            Self::Plain => {
                *q_tilde = q;
                StepKind::Null
            }
            Self::Regularized { sigma, gamma } => {
                if (theta - q).abs() <= tau * (1.0 + theta.abs()) {
                    *xi = x.to_vec();
                    *q_tilde = q;
                    *sigma *= 2.0;
                    StepKind::Serious
                } else if q + tau * (1.0 + q.abs()) <= *gamma * *q_tilde + (1.0 - *gamma) * theta {
                    *xi = x.to_vec();
                    *q_tilde = q;
                    StepKind::Serious
                } else {
                    *sigma /= 2.0;
                    StepKind::Null
                }
            }
            Self::TrustRegion {
                delta,
                delta_max,
                c_delta,
                gamma,
            } => {
                let inf_norm_step: E = xi
                    .iter()
                    .zip(x.iter())
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0, E::max);

                if q <= *q_tilde - *gamma * (*q_tilde - theta).abs() {
                    *c_delta = 0;
                    let prior_q_tilde = *q_tilde;
                    *xi = x.to_vec();
                    *q_tilde = q;
                    let can_enlarge = (q - prior_q_tilde).abs() <= 0.5 * (prior_q_tilde - theta)
                        && inf_norm_step - *delta <= tau;
                    if can_enlarge {
                        *delta = (2.0 * *delta).min(*delta_max);
                    }
                    StepKind::Serious
                } else {
                    let denom = *q_tilde - theta;
                    let rho = if denom.abs() > 1e-12 {
                        delta.min(1.0) * (q - *q_tilde) / denom
                    } else {
                        0.0
                    };
                    if rho > 0.0 {
                        *c_delta += 1;
                    }
                    if rho > 3.0 || (*c_delta >= 3 && rho > 1.0 && rho <= 3.0) {
                        *c_delta = 0;
                        *delta /= rho.max(1.0).min(4.0);
                    }
                    StepKind::Null
                }
            }
            Self::LevelSet { .. } => {
                *xi = x.to_vec();
                *q_tilde = q;
                StepKind::Serious
            }
        }
    }

    /// Whether the current `(Q, Q-tilde, theta)` triple is optimal within `tau`.
    pub fn check_optimality(&self, q: E, q_tilde: E, theta: E, tau: E) -> bool {
        let reference = match self {
            Self::Regularized { .. } => q_tilde,
            _ => q,
        };
        theta.is_finite() && (theta - reference).abs() <= tau * (1.0 + theta.abs())
    }

    /// The level used by the level-set projection: `lambda*Q-tilde + (1-lambda)*theta`.
    pub fn level(&self, q_tilde: E, theta: E) -> Option<E> {
        match self {
            Self::LevelSet { lambda, .. } => Some(*lambda * q_tilde + (1.0 - *lambda) * theta),
            _ => None,
        }
    }

    /// First-stage bounds to impose on the master for this iteration, given
    /// the problem's own bounds and the incumbent `xi`. Only the trust
    /// region variant restricts them.
    pub fn master_bounds(&self, lb: &[E], ub: &[E], xi: &[E]) -> (Vec<E>, Vec<E>) {
        match self {
            Self::TrustRegion { delta, .. } => {
                let new_lb = lb.iter().zip(xi.iter()).map(|(&l, &x)| l.max(x - delta)).collect();
                let new_ub = ub.iter().zip(xi.iter()).map(|(&u, &x)| u.min(x + delta)).collect();
                (new_lb, new_ub)
            }
            _ => (lb.to_vec(), ub.to_vec()),
        }
    }
}

/// Entry in the `violating` priority queue: max-first by gap.
struct ViolatingEntry {
    gap: OrderedFloat<E>,
    cut: Hyperplane,
}

impl PartialEq for ViolatingEntry {
    fn eq(&self, other: &Self) -> bool {
        self.gap == other.gap
    }
}
impl Eq for ViolatingEntry {}
impl PartialOrd for ViolatingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for ViolatingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.gap.cmp(&other.gap)
    }
}

/// Cut pools used by the localized variants to age cuts out of the master
/// model and revive them once they become violated again.
pub struct CutPool {
    pub committee: Vec<Hyperplane>,
    pub inactive: Vec<Hyperplane>,
    violating: BinaryHeap<ViolatingEntry>,
    baseline: usize,
}

impl CutPool {
    pub fn new(first_stage_rows: Vec<Hyperplane>, n_subproblems: usize) -> Self {
        let baseline = first_stage_rows.len() + n_subproblems;
        Self {
            committee: first_stage_rows,
            inactive: Vec::new(),
            violating: BinaryHeap::new(),
            baseline,
        }
    }

    pub fn insert(&mut self, cut: Hyperplane) {
        self.committee.push(cut);
    }

    /// Evicts committee entries that are neither active nor required to
    /// keep the committee at or above the baseline size, scanning by
    /// ascending index for deterministic, reproducible eviction order.
    pub fn remove_inactive(&mut self, x: &[E], theta: &[E], tau: E) {
        let total = self.committee.len();
        let mut kept = Vec::with_capacity(total);
        for (i, cut) in self.committee.drain(..).enumerate() {
            let theta_id = theta.get(cut.id()).copied();
            let active = cut.active(x, theta_id, tau).unwrap_or(true);
            let remaining_after_this = total - i - 1;
            if active || kept.len() + remaining_after_this < self.baseline {
                kept.push(cut);
            } else {
                self.inactive.push(cut);
            }
        }
        self.committee = kept;
    }

    /// Moves violated cuts out of `inactive` and into the `violating` queue,
    /// ordered so the most-violated cut is reinserted first.
    pub fn queue_violated(&mut self, x: &[E], theta: &[E], tau: E) {
        let mut kept = Vec::new();
        for cut in self.inactive.drain(..) {
            let theta_id = theta.get(cut.id()).copied();
            let gap = cut.gap(x, theta_id).unwrap_or(E::INFINITY);
            if cut.violated(x, theta_id, tau).unwrap_or(false) {
                self.violating.push(ViolatingEntry {
                    gap: OrderedFloat(gap),
                    cut,
                });
            } else {
                kept.push(cut);
            }
        }
        self.inactive = kept;
    }

    /// Pops the most-violated revived cut, reinserting it into the committee.
    pub fn pop_violating(&mut self) -> Option<Hyperplane> {
        self.violating.pop().map(|entry| {
            self.committee.push(entry.cut.clone());
            entry.cut
        })
    }

    pub fn len(&self) -> usize {
        self.committee.len() + self.inactive.len() + self.violating.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regularized_serious_step_doubles_sigma() {
        let mut state = LocalizationState::regularized(1.0, 0.1);
        let mut q_tilde = 10.0;
        let mut xi = vec![0.0];
        let kind = state.take_step(5.0, &mut q_tilde, 5.0000001, &[1.0], &mut xi, 1e-6);
        assert_eq!(kind, StepKind::Serious);
        match state {
            LocalizationState::Regularized { sigma, .. } => assert_eq!(sigma, 2.0),
            _ => panic!("expected regularized state"),
        }
    }

    #[test]
    fn trust_region_enlarges_on_good_major_step() {
        let mut state = LocalizationState::trust_region(1.0, 8.0, 1e-4);
        let mut q_tilde = 10.0;
        let mut xi = vec![0.0];
        // theta close to q_tilde so the enlarge condition's half-gap is generous,
        // and ||xi - x|| stays within delta + tau.
        let kind = state.take_step(9.99, &mut q_tilde, 9.98, &[0.5], &mut xi, 1e-6);
        assert_eq!(kind, StepKind::Serious);
        // Delta doubles from 1.0 to 2.0, well under the 8.0 cap.
        assert_eq!(state.radius().unwrap(), 2.0);
    }

    #[test]
    fn trust_region_never_exceeds_delta_max() {
        let mut state = LocalizationState::trust_region(7.0, 8.0, 1e-4);
        let mut q_tilde = 10.0;
        let mut xi = vec![0.0];
        state.take_step(9.99, &mut q_tilde, 9.98, &[0.1], &mut xi, 1e-6);
        assert!(state.radius().unwrap() <= 8.0);
    }

    #[test]
    fn cut_pool_keeps_baseline_even_when_all_inactive() {
        let rows = vec![Hyperplane::linear_constraint(vec![0], vec![1.0], 0.0, E::INFINITY)];
        let mut pool = CutPool::new(rows, 0);
        pool.remove_inactive(&[0.0], &[], 1e-6);
        assert_eq!(pool.committee.len(), 1);
    }
}
