// Copyright (c) 2024 Botho Foundation

//! Round-by-round privacy composition under an observation schedule.
//!
//! Each round is one Sampled Gaussian Mechanism step. When secure
//! aggregation holds, the committee only sees the batch sum and noise is
//! amortized across the batch (`σ × √batch`). When the adversary observed the
//! round, per-client updates are exposed and only the baseline `σ` protects
//! them. The per-order Renyi divergence of every round is summed and
//! converted to (ε, δ) after each round.
//!
//! ```text
//! state_0 = 0
//! state_r = state_{r-1} + RDP(q, σ_r, 1 step)
//! ε_r     = min_α ( state_r[α] + ln(1/δ) / (α − 1) )
//! ```
//!
//! [`RdpState`] is an immutable value: [`PrivacyCompositionEngine::advance`]
//! takes the previous state and returns the next one, so any single round can
//! be replayed or tested in isolation.

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::accountant::RenyiAccountant;
use crate::error::{check_probability, PrivacyError, Result};
use crate::schedule::ObservationSchedule;

/// Inputs shared by every round of a composition.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompositionParameters {
    /// Batch size over population size.
    pub sampling_ratio: f64,
    /// Noise multiplier when the adversary observed the round.
    pub baseline_noise_multiplier: f64,
    /// Clients aggregated per round.
    pub batch_size: u64,
    /// δ for the (ε, δ) conversion.
    pub target_delta: f64,
    /// Candidate Renyi orders, strictly ascending, all greater than one.
    pub orders: Vec<f64>,
}

impl CompositionParameters {
    pub fn validate(&self) -> Result<()> {
        check_probability("sampling ratio", self.sampling_ratio)?;
        if !self.baseline_noise_multiplier.is_finite() || self.baseline_noise_multiplier <= 0.0 {
            return Err(PrivacyError::InvalidParameter(format!(
                "noise multiplier must be positive, got {}",
                self.baseline_noise_multiplier
            )));
        }
        if self.batch_size == 0 {
            return Err(PrivacyError::InvalidParameter(
                "batch size must be at least 1".to_string(),
            ));
        }
        if !(self.target_delta > 0.0 && self.target_delta < 1.0) {
            return Err(PrivacyError::InvalidParameter(format!(
                "target delta must be in (0, 1), got {}",
                self.target_delta
            )));
        }
        if self.orders.is_empty() {
            return Err(PrivacyError::InvalidParameter(
                "at least one renyi order is required".to_string(),
            ));
        }
        if self.orders.iter().any(|&alpha| alpha.is_nan() || alpha <= 1.0) {
            return Err(PrivacyError::InvalidParameter(
                "renyi orders must all be greater than 1".to_string(),
            ));
        }
        if !self.orders.windows(2).all(|w| w[0] < w[1]) {
            return Err(PrivacyError::InvalidParameter(
                "renyi orders must be strictly ascending".to_string(),
            ));
        }
        Ok(())
    }

    /// `σ × √batch`, used when secure aggregation hides individual updates.
    pub fn amplified_noise_multiplier(&self) -> f64 {
        self.baseline_noise_multiplier * (self.batch_size as f64).sqrt()
    }

    fn lowest_order(&self) -> f64 {
        self.orders[0]
    }

    fn highest_order(&self) -> f64 {
        self.orders[self.orders.len() - 1]
    }
}

/// Cumulative Renyi divergence, one entry per candidate order.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RdpState {
    divergences: Vec<f64>,
}

impl RdpState {
    /// No privacy spent yet.
    pub fn zero(order_count: usize) -> Self {
        Self {
            divergences: vec![0.0; order_count],
        }
    }

    /// Divergence of `steps` identical steps, each contributing `increment`.
    pub fn repeated(increment: &[f64], steps: u64) -> Self {
        Self {
            divergences: increment.iter().map(|d| d * steps as f64).collect(),
        }
    }

    /// This state with one more step's divergence added.
    ///
    /// Increments must be non-negative: composition never reduces the
    /// privacy spent.
    pub fn compose(&self, increment: &[f64]) -> Result<Self> {
        if increment.len() != self.divergences.len() {
            return Err(PrivacyError::InvalidParameter(format!(
                "increment has {} orders, state has {}",
                increment.len(),
                self.divergences.len()
            )));
        }
        if let Some(bad) = increment.iter().find(|d| d.is_nan() || **d < 0.0) {
            return Err(PrivacyError::InvalidParameter(format!(
                "divergence increment must be non-negative, got {bad}"
            )));
        }
        Ok(Self {
            divergences: self
                .divergences
                .iter()
                .zip(increment)
                .map(|(total, step)| total + step)
                .collect(),
        })
    }

    pub fn divergences(&self) -> &[f64] {
        &self.divergences
    }
}

/// Privacy guarantee after a given round.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PrivacyResult {
    pub epsilon: f64,
    pub optimal_order: f64,
    /// 1-indexed round.
    pub round: u64,
}

/// Which end of the order list the optimum landed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum OrderBoundary {
    Lowest,
    Highest,
}

/// The optimal order sits on the edge of the candidate list, so the true
/// optimum may lie outside it and ε may be overstated.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct OrderBoundaryWarning {
    pub round: u64,
    pub optimal_order: f64,
    pub boundary: OrderBoundary,
}

impl fmt::Display for OrderBoundaryWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let side = match self.boundary {
            OrderBoundary::Lowest => "lowest",
            OrderBoundary::Highest => "highest",
        };
        write!(
            f,
            "round {}: optimal order {} is the {side} candidate; widen the order list",
            self.round, self.optimal_order
        )
    }
}

/// Output of a single round transition.
#[derive(Clone, Debug, PartialEq)]
pub struct RoundTransition {
    pub state: RdpState,
    pub result: PrivacyResult,
    pub warning: Option<OrderBoundaryWarning>,
}

/// ε trajectory of a whole composition.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CompositionTrace {
    pub results: Vec<PrivacyResult>,
    pub warnings: Vec<OrderBoundaryWarning>,
    pub final_state: RdpState,
}

impl CompositionTrace {
    /// ε after each round, in round order.
    pub fn epsilons(&self) -> Vec<f64> {
        self.results.iter().map(|r| r.epsilon).collect()
    }

    pub fn final_result(&self) -> Option<&PrivacyResult> {
        self.results.last()
    }

    /// ε after the last round; zero for an empty composition.
    pub fn final_epsilon(&self) -> f64 {
        self.final_result().map_or(0.0, |r| r.epsilon)
    }
}

/// Composes per-round Sampled Gaussian Mechanism steps into (ε, δ).
#[derive(Clone, Debug)]
pub struct PrivacyCompositionEngine<A> {
    accountant: A,
    params: CompositionParameters,
}

impl<A: RenyiAccountant> PrivacyCompositionEngine<A> {
    pub fn new(accountant: A, params: CompositionParameters) -> Result<Self> {
        params.validate()?;
        Ok(Self { accountant, params })
    }

    pub fn params(&self) -> &CompositionParameters {
        &self.params
    }

    /// Noise multiplier for a round, given whether the adversary observed it.
    pub fn noise_multiplier_for(&self, observed: bool) -> f64 {
        if observed {
            self.params.baseline_noise_multiplier
        } else {
            self.params.amplified_noise_multiplier()
        }
    }

    pub fn initial_state(&self) -> RdpState {
        RdpState::zero(self.params.orders.len())
    }

    /// Divergence of a single step at `noise_multiplier`.
    pub fn step_increment(&self, noise_multiplier: f64) -> Result<Vec<f64>> {
        Ok(self.accountant.compute_rdp(
            self.params.sampling_ratio,
            noise_multiplier,
            1,
            &self.params.orders,
        )?)
    }

    /// Convert a state into the guarantee reported for `round`.
    pub fn evaluate(
        &self,
        state: &RdpState,
        round: u64,
    ) -> Result<(PrivacyResult, Option<OrderBoundaryWarning>)> {
        let spent = self.accountant.privacy_spent(
            &self.params.orders,
            state.divergences(),
            self.params.target_delta,
        )?;
        let result = PrivacyResult {
            epsilon: spent.epsilon,
            optimal_order: spent.optimal_order,
            round,
        };

        let boundary = if spent.optimal_order == self.params.lowest_order() {
            Some(OrderBoundary::Lowest)
        } else if spent.optimal_order == self.params.highest_order() {
            Some(OrderBoundary::Highest)
        } else {
            None
        };
        let warning = boundary.map(|boundary| OrderBoundaryWarning {
            round,
            optimal_order: spent.optimal_order,
            boundary,
        });

        Ok((result, warning))
    }

    /// Apply round `round` to `state`.
    pub fn advance(&self, state: &RdpState, round: u64, observed: bool) -> Result<RoundTransition> {
        let increment = self.step_increment(self.noise_multiplier_for(observed))?;
        let state = state.compose(&increment)?;
        let (result, warning) = self.evaluate(&state, round)?;
        Ok(RoundTransition {
            state,
            result,
            warning,
        })
    }

    /// Compose every round of `schedule`, in order.
    pub fn compose(&self, schedule: &ObservationSchedule) -> Result<CompositionTrace> {
        let mut state = self.initial_state();
        let mut results = Vec::with_capacity(schedule.len());
        let mut warnings = Vec::new();

        for (round, observed) in (1u64..).zip(schedule.iter()) {
            let transition = self.advance(&state, round, observed)?;
            debug!(
                round,
                observed,
                epsilon = transition.result.epsilon,
                order = transition.result.optimal_order,
                "composed round"
            );
            if let Some(warning) = transition.warning {
                if warnings.is_empty() {
                    warn!("{warning}");
                }
                warnings.push(warning);
            }
            results.push(transition.result);
            state = transition.state;
        }

        Ok(CompositionTrace {
            results,
            warnings,
            final_state: state,
        })
    }

    /// ε after each of `total_rounds` independent, identically noised rounds.
    ///
    /// Every round uses the same `noise_multiplier`, so the state after `r`
    /// rounds is `r` times the single-step divergence.
    pub fn independent_rounds(
        &self,
        total_rounds: u64,
        noise_multiplier: f64,
    ) -> Result<CompositionTrace> {
        let increment = self.step_increment(noise_multiplier)?;
        let mut results = Vec::new();
        let mut warnings = Vec::new();
        let mut state = self.initial_state();

        for round in 1..=total_rounds {
            state = RdpState::repeated(&increment, round);
            let (result, warning) = self.evaluate(&state, round)?;
            if let Some(warning) = warning {
                if warnings.is_empty() {
                    warn!("{warning}");
                }
                warnings.push(warning);
            }
            results.push(result);
        }

        Ok(CompositionTrace {
            results,
            warnings,
            final_state: state,
        })
    }
}
