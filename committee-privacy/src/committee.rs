// Copyright (c) 2024 Botho Foundation

//! Probability that an adversary observes or dominates a committee.
//!
//! A committee of `k` seats is filled by drawing nodes without replacement
//! from a population of `N`. The population is split into adversarial and
//! honest probability mass; each draw removes `1/N` of mass from the class it
//! landed in and from the remaining total, so later draws are conditioned on
//! earlier ones. When the adversary's mass `p × N` is a whole number of nodes
//! this is exactly hypergeometric sampling.
//!
//! ## Non-integral adversary mass
//!
//! When `p × N` is not a whole number the recurrence has no consistent
//! meaning: one class runs out of mass part-way through a draw and the
//! orderings stop being exchangeable. Every probability is then the linear
//! interpolation between the two neighbouring whole adversary counts, weighted
//! by the fractional part of `p × N`. This is an approximation with no
//! characterized error bound, but it keeps every value a proper probability
//! and preserves the relations between them.

use serde::Serialize;
use statrs::function::factorial::ln_binomial;

use crate::error::{check_probability, PrivacyError, Result};
use crate::stake::AdversaryStakeFraction;

/// `p × N` within this distance of a whole number is treated as whole.
const INTEGRAL_TOLERANCE: f64 = 1e-9;

/// Population and committee sizes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct CommitteeParameters {
    population_size: u64,
    committee_size: u64,
}

impl CommitteeParameters {
    /// Requires `1 <= committee_size <= population_size`.
    pub fn new(population_size: u64, committee_size: u64) -> Result<Self> {
        if population_size == 0 {
            return Err(PrivacyError::InvalidParameter(
                "population size must be at least 1".to_string(),
            ));
        }
        if committee_size == 0 {
            return Err(PrivacyError::InvalidParameter(
                "committee size must be at least 1".to_string(),
            ));
        }
        if committee_size > population_size {
            return Err(PrivacyError::InvalidParameter(format!(
                "committee size {committee_size} exceeds population size {population_size}"
            )));
        }
        Ok(Self {
            population_size,
            committee_size,
        })
    }

    pub fn population_size(&self) -> u64 {
        self.population_size
    }

    pub fn committee_size(&self) -> u64 {
        self.committee_size
    }

    /// Smallest seat count treated as a majority: `ceil(k / 2)`.
    pub fn majority_threshold(&self) -> u64 {
        self.committee_size.div_ceil(2)
    }
}

/// Analytic model of adversarial committee membership for one round.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct CommitteeObservationModel {
    params: CommitteeParameters,
    adversary_prob: f64,
}

impl CommitteeObservationModel {
    pub fn new(params: CommitteeParameters, fraction: AdversaryStakeFraction) -> Self {
        Self {
            params,
            adversary_prob: fraction.value(),
        }
    }

    /// Build from raw values, validating each.
    pub fn from_raw(adversary_prob: f64, committee_size: u64, total_nodes: u64) -> Result<Self> {
        check_probability("adversary probability", adversary_prob)?;
        let params = CommitteeParameters::new(total_nodes, committee_size)?;
        Ok(Self {
            params,
            adversary_prob,
        })
    }

    pub fn params(&self) -> CommitteeParameters {
        self.params
    }

    pub fn adversary_prob(&self) -> f64 {
        self.adversary_prob
    }

    /// Probability that at least one seat goes to the adversary.
    ///
    /// `1 − P(every draw is honest)`.
    pub fn probability_at_least_one_adversarial_seat(&self) -> f64 {
        // A single seat is adversarial with exactly the per-draw probability.
        if self.params.committee_size == 1 {
            return self.adversary_prob;
        }
        1.0 - self.interpolate(|adversaries| self.all_honest_given(adversaries))
    }

    /// Probability that exactly `k` seats go to the adversary.
    ///
    /// Iterative conditioning over one ordering, scaled by `C(committee, k)`,
    /// collapses to the hypergeometric mass `C(a, k) C(N − a, c − k) / C(N, c)`,
    /// which is evaluated through log-binomials.
    pub fn probability_exactly_k_adversarial(&self, k: u64) -> Result<f64> {
        let committee = self.params.committee_size;
        if k > committee {
            return Err(PrivacyError::InvalidParameter(format!(
                "cannot seat {k} adversaries on a committee of {committee}"
            )));
        }
        Ok(self.interpolate(|adversaries| self.exactly_k_given(adversaries, k)))
    }

    /// Probability that the adversary holds at least `ceil(k / 2)` seats.
    pub fn probability_majority(&self) -> f64 {
        if self.params.committee_size == 1 {
            return self.adversary_prob;
        }
        let threshold = self.params.majority_threshold();
        self.interpolate(|adversaries| {
            (threshold..=self.params.committee_size)
                .map(|k| self.exactly_k_given(adversaries, k))
                .sum()
        })
    }

    /// Rounds out of `rounds` in which the adversary is expected to hold a
    /// seat, rounded to the nearest whole round.
    pub fn expected_observed_rounds(&self, rounds: u64) -> u64 {
        expected_rounds(rounds, self.probability_at_least_one_adversarial_seat())
    }

    /// Rounds out of `rounds` in which the adversary is expected to hold a
    /// majority.
    pub fn expected_majority_rounds(&self, rounds: u64) -> u64 {
        expected_rounds(rounds, self.probability_majority())
    }

    /// Evaluate `f` at the adversary's node count, interpolating between the
    /// neighbouring whole counts when `p × N` is fractional.
    fn interpolate(&self, f: impl Fn(u64) -> f64) -> f64 {
        let mass = self.adversary_prob * self.params.population_size as f64;
        let nearest = mass.round();
        if (mass - nearest).abs() < INTEGRAL_TOLERANCE {
            return f(nearest as u64);
        }
        let lower = mass.floor();
        let weight = mass - lower;
        (1.0 - weight) * f(lower as u64) + weight * f(lower as u64 + 1)
    }

    /// P(no adversarial seat) with exactly `adversaries` adversarial nodes.
    fn all_honest_given(&self, adversaries: u64) -> f64 {
        let population = self.params.population_size;
        let honest = population - adversaries;
        if self.params.committee_size > honest {
            return 0.0;
        }

        let mut probability = 1.0;
        for i in 0..self.params.committee_size {
            probability *= (honest - i) as f64 / (population - i) as f64;
        }
        probability
    }

    /// P(exactly `k` adversarial seats) with exactly `adversaries`
    /// adversarial nodes.
    fn exactly_k_given(&self, adversaries: u64, k: u64) -> f64 {
        let population = self.params.population_size;
        let committee = self.params.committee_size;
        let honest = population - adversaries;
        if k > adversaries || committee - k > honest {
            return 0.0;
        }

        // C(a, k) C(N - a, c - k) / C(N, c), summed in log space so large
        // committees stay finite.
        let ln_mass = ln_binomial(adversaries, k) + ln_binomial(honest, committee - k)
            - ln_binomial(population, committee);
        ln_mass.exp().min(1.0)
    }
}

/// `round(rounds × probability)`, halves rounded away from zero.
pub(crate) fn expected_rounds(rounds: u64, probability: f64) -> u64 {
    (rounds as f64 * probability).round() as u64
}

/// Smallest committee size whose majority probability is at most
/// `max_majority_probability`.
///
/// Returns `None` when no committee up to the full population meets the
/// bound. Even committee sizes count a tie as a majority, so the search does
/// not assume monotonicity and returns the first size that qualifies.
pub fn min_committee_size_for_majority_bound(
    fraction: AdversaryStakeFraction,
    population_size: u64,
    max_majority_probability: f64,
) -> Result<Option<u64>> {
    check_probability("majority probability bound", max_majority_probability)?;

    for committee_size in 1..=population_size {
        let params = CommitteeParameters::new(population_size, committee_size)?;
        let model = CommitteeObservationModel::new(params, fraction);
        if model.probability_majority() <= max_majority_probability {
            return Ok(Some(committee_size));
        }
    }
    Ok(None)
}
