// Copyright (c) 2024 Botho Foundation

//! End-to-end scenario: stake, committee odds, schedule, and both ε curves.

use std::fmt;

use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::accountant::RenyiAccountant;
use crate::committee::{CommitteeObservationModel, CommitteeParameters};
use crate::composition::{CompositionTrace, PrivacyCompositionEngine};
use crate::config::ScenarioConfig;
use crate::error::{PrivacyError, Result};
use crate::sampler::{empirical_observation_rate, select_adversarial_minimal_set};
use crate::schedule::RoundScheduleGenerator;

/// Which system an ε curve describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum SystemLabel {
    /// Plain federated learning: every round exposes per-client updates.
    #[serde(rename = "fed_learn")]
    FederatedLearning,
    /// Committee aggregation with adversarial observation.
    #[serde(rename = "committee")]
    Committee,
}

impl SystemLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemLabel::FederatedLearning => "fed_learn",
            SystemLabel::Committee => "committee",
        }
    }
}

impl fmt::Display for SystemLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One point of an ε curve.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct EpsilonRecord {
    pub system: SystemLabel,
    pub round: u64,
    pub epsilon: f64,
}

/// Everything a scenario run produces.
#[derive(Clone, Debug, Serialize)]
pub struct ScenarioReport {
    pub config: ScenarioConfig,
    pub total_rounds: u64,
    /// Adversary's share of total stake.
    pub adversary_fraction: f64,
    /// Size of the greedily chosen adversarial node set.
    pub adversarial_nodes: usize,
    /// Per-round probability of at least one adversarial seat.
    pub observation_probability: f64,
    /// Per-round probability of an adversarial majority.
    pub majority_probability: f64,
    /// Rounds the schedule marks as observed.
    pub observed_rounds: u64,
    /// Expected rounds with an adversarial majority.
    pub majority_rounds: u64,
    /// Share of concrete committee draws that seated the adversary.
    pub empirical_observation_rate: Option<f64>,
    pub committee: CompositionTrace,
    pub baseline: CompositionTrace,
}

impl ScenarioReport {
    /// Both curves as `(system, round, ε)` records, baseline first.
    pub fn records(&self) -> Vec<EpsilonRecord> {
        let curve = |system, trace: &CompositionTrace| {
            trace
                .results
                .iter()
                .map(move |r| EpsilonRecord {
                    system,
                    round: r.round,
                    epsilon: r.epsilon,
                })
                .collect::<Vec<_>>()
        };
        let mut records = curve(SystemLabel::FederatedLearning, &self.baseline);
        records.extend(curve(SystemLabel::Committee, &self.committee));
        records
    }

    /// Final ε of the committee curve.
    pub fn final_epsilon(&self) -> f64 {
        self.committee.final_epsilon()
    }

    /// Final ε of the plain federated learning curve.
    pub fn baseline_epsilon(&self) -> f64 {
        self.baseline.final_epsilon()
    }
}

/// Run one scenario.
///
/// Builds a uniform stake map, picks the adversary's nodes greedily, derives
/// the per-round observation probability, shuffles the observation schedule
/// and composes both the committee and the plain federated learning curves.
pub fn run_scenario<A, R>(
    config: &ScenarioConfig,
    accountant: A,
    rng: &mut R,
) -> Result<ScenarioReport>
where
    A: RenyiAccountant,
    R: Rng + ?Sized,
{
    config.validate()?;

    let stake_map = config.stake_map()?;
    let total_stake = stake_map.total_stake();
    let target_stake = config.adversary.target_stake(total_stake)?;
    let adversarial_nodes = select_adversarial_minimal_set(target_stake, &stake_map)?;
    let fraction = config.adversary.fraction(total_stake)?;

    let params = CommitteeParameters::new(config.population_size, config.committee_size)?;
    let model = CommitteeObservationModel::new(params, fraction);
    let observation_probability = model.probability_at_least_one_adversarial_seat();
    let majority_probability = model.probability_majority();

    let total_rounds = config.total_rounds()?;
    let schedule =
        RoundScheduleGenerator::new(total_rounds, observation_probability)?.generate(rng)?;

    let engine = PrivacyCompositionEngine::new(accountant, config.composition_parameters())?;
    let committee = engine.compose(&schedule)?;
    let baseline = engine.independent_rounds(total_rounds, config.noise_multiplier)?;

    let committee_size = usize::try_from(config.committee_size).map_err(|_| {
        PrivacyError::InvalidParameter(format!(
            "committee size {} does not fit in memory",
            config.committee_size
        ))
    })?;
    let empirical = empirical_observation_rate(
        &stake_map,
        committee_size,
        &adversarial_nodes,
        config.membership_trials,
        rng,
    );

    let report = ScenarioReport {
        config: config.clone(),
        total_rounds,
        adversary_fraction: fraction.value(),
        adversarial_nodes: adversarial_nodes.len(),
        observation_probability,
        majority_probability,
        observed_rounds: schedule.observed_count(),
        majority_rounds: model.expected_majority_rounds(total_rounds),
        empirical_observation_rate: empirical,
        committee,
        baseline,
    };

    info!(
        nodes = config.population_size,
        committee = config.committee_size,
        adversary = report.adversary_fraction,
        rounds = total_rounds,
        observed = report.observed_rounds,
        epsilon = report.final_epsilon(),
        baseline_epsilon = report.baseline_epsilon(),
        "scenario complete"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accountant::{FixedDivergenceAccountant, SampledGaussianAccountant};
    use crate::stake::AdversaryStake;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn small_config() -> ScenarioConfig {
        ScenarioConfig {
            population_size: 100,
            batch_size: 10,
            committee_size: 5,
            adversary: AdversaryStake::Fraction(0.1),
            rounds: Some(40),
            delta: 1e-5,
            ..ScenarioConfig::default()
        }
    }

    #[test]
    fn test_labels() {
        assert_eq!(SystemLabel::FederatedLearning.to_string(), "fed_learn");
        assert_eq!(SystemLabel::Committee.as_str(), "committee");
        assert_eq!(
            serde_json::to_string(&SystemLabel::FederatedLearning).unwrap(),
            "\"fed_learn\""
        );
    }

    #[test]
    fn test_scenario_shape() {
        let config = small_config();
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let report = run_scenario(&config, SampledGaussianAccountant, &mut rng).unwrap();

        assert_eq!(report.total_rounds, 40);
        assert_eq!(report.adversarial_nodes, 10);
        assert!((report.adversary_fraction - 0.1).abs() < 1e-12);
        assert_eq!(report.committee.results.len(), 40);
        assert_eq!(report.baseline.results.len(), 40);
        assert_eq!(
            report.observed_rounds,
            (40.0 * report.observation_probability).round() as u64
        );
        assert!(report.observation_probability >= report.majority_probability);
        assert_eq!(report.empirical_observation_rate, None);

        let records = report.records();
        assert_eq!(records.len(), 80);
        assert_eq!(records[0].system, SystemLabel::FederatedLearning);
        assert_eq!(records[0].round, 1);
        assert_eq!(records[40].system, SystemLabel::Committee);
    }

    #[test]
    fn test_committee_never_worse_than_plain_federated_learning() {
        let config = small_config();
        let mut rng = ChaCha20Rng::seed_from_u64(17);
        let report = run_scenario(&config, SampledGaussianAccountant, &mut rng).unwrap();
        assert!(report.final_epsilon() <= report.baseline_epsilon() + 1e-12);
    }

    #[test]
    fn test_adversary_free_scenario_never_observed() {
        let config = small_config().with_adversary(AdversaryStake::Stake(0.0));
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        let report = run_scenario(&config, FixedDivergenceAccountant::default(), &mut rng).unwrap();
        assert_eq!(report.adversarial_nodes, 0);
        assert_eq!(report.observed_rounds, 0);
        assert_eq!(report.majority_rounds, 0);
    }

    #[test]
    fn test_membership_trials_enabled() {
        let config = ScenarioConfig {
            membership_trials: 500,
            ..small_config()
        };
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let report = run_scenario(&config, FixedDivergenceAccountant::default(), &mut rng).unwrap();
        let rate = report.empirical_observation_rate.unwrap();
        assert!((0.0..=1.0).contains(&rate));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ScenarioConfig {
            committee_size: 0,
            ..small_config()
        };
        let mut rng = ChaCha20Rng::seed_from_u64(0);
        assert!(matches!(
            run_scenario(&config, SampledGaussianAccountant, &mut rng),
            Err(PrivacyError::InvalidParameter(_))
        ));
    }
}
