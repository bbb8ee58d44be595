// Copyright (c) 2024 Botho Foundation

use std::fs;
use std::path::Path;

use anyhow::{Context, Result as AnyResult};
use bth_rdp_accountant::default_orders;
use serde::{Deserialize, Serialize};

use crate::composition::CompositionParameters;
use crate::error::{PrivacyError, Result};
use crate::stake::{AdversaryStake, StakeMap};

/// Rounds analysed when neither `rounds` nor `epochs` is given.
pub const DEFAULT_ROUNDS: u64 = 100;

/// One committee privacy scenario.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Number of participating nodes
    #[serde(default = "default_population_size")]
    pub population_size: u64,

    /// Clients aggregated per round
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,

    /// Seats on each round's committee
    #[serde(default = "default_committee_size")]
    pub committee_size: u64,

    /// Adversary's stake, absolute or as a share of the total
    #[serde(default = "default_adversary")]
    pub adversary: AdversaryStake,

    /// Baseline noise multiplier
    #[serde(default = "default_noise_multiplier")]
    pub noise_multiplier: f64,

    /// Target delta
    #[serde(default = "default_delta")]
    pub delta: f64,

    /// Training rounds; mutually exclusive with `epochs`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rounds: Option<u64>,

    /// Passes over the population, may be fractional
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epochs: Option<f64>,

    /// Candidate Renyi orders
    #[serde(default = "default_orders")]
    pub orders: Vec<f64>,

    /// Seed for schedule shuffling and committee draws
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Concrete committee draws for the empirical observation rate; 0 skips it
    #[serde(default)]
    pub membership_trials: u64,
}

fn default_population_size() -> u64 {
    100
}

fn default_batch_size() -> u64 {
    10
}

fn default_committee_size() -> u64 {
    30
}

fn default_adversary() -> AdversaryStake {
    AdversaryStake::Stake(30.0)
}

fn default_noise_multiplier() -> f64 {
    1.0
}

fn default_delta() -> f64 {
    1e-6
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            population_size: default_population_size(),
            batch_size: default_batch_size(),
            committee_size: default_committee_size(),
            adversary: default_adversary(),
            noise_multiplier: default_noise_multiplier(),
            delta: default_delta(),
            rounds: None,
            epochs: None,
            orders: default_orders(),
            seed: None,
            membership_trials: 0,
        }
    }
}

impl ScenarioConfig {
    /// Load a scenario from a TOML file
    pub fn load(path: &Path) -> AnyResult<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read scenario from {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("Failed to parse scenario from {}", path.display()))
    }

    /// Save the scenario to a TOML file
    pub fn save(&self, path: &Path) -> AnyResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("Failed to serialize scenario")?;

        fs::write(path, contents)
            .with_context(|| format!("Failed to write scenario to {}", path.display()))?;

        Ok(())
    }

    /// Reject values that would make the analysis meaningless.
    pub fn validate(&self) -> Result<()> {
        if self.population_size == 0 {
            return Err(PrivacyError::InvalidParameter(
                "population size must be at least 1".to_string(),
            ));
        }
        if self.batch_size > self.population_size {
            return Err(PrivacyError::InvalidParameter(format!(
                "population size {} must be at least the batch size {}",
                self.population_size, self.batch_size
            )));
        }
        if self.committee_size == 0 || self.committee_size > self.population_size {
            return Err(PrivacyError::InvalidParameter(format!(
                "committee size must be in [1, {}], got {}",
                self.population_size, self.committee_size
            )));
        }
        if self.rounds.is_some() && self.epochs.is_some() {
            return Err(PrivacyError::InvalidParameter(
                "specify either rounds or epochs, not both".to_string(),
            ));
        }
        if let Some(epochs) = self.epochs {
            if !epochs.is_finite() || epochs <= 0.0 {
                return Err(PrivacyError::InvalidParameter(format!(
                    "epochs must be positive, got {epochs}"
                )));
            }
        }
        self.adversary.target_stake(self.population_size)?;
        self.composition_parameters().validate()
    }

    /// `batch_size / population_size`.
    pub fn sampling_ratio(&self) -> f64 {
        self.batch_size as f64 / self.population_size as f64
    }

    /// Rounds to analyse: `rounds`, else `ceil(epochs × N / batch)`, else
    /// [`DEFAULT_ROUNDS`].
    pub fn total_rounds(&self) -> Result<u64> {
        match (self.rounds, self.epochs) {
            (Some(rounds), _) => Ok(rounds),
            (None, Some(epochs)) => {
                if self.batch_size == 0 {
                    return Err(PrivacyError::InvalidParameter(
                        "batch size must be at least 1".to_string(),
                    ));
                }
                let steps =
                    (epochs * self.population_size as f64 / self.batch_size as f64).ceil();
                if !steps.is_finite() || steps < 0.0 {
                    return Err(PrivacyError::InvalidParameter(format!(
                        "epochs {epochs} do not give a valid round count"
                    )));
                }
                Ok(steps as u64)
            }
            (None, None) => Ok(DEFAULT_ROUNDS),
        }
    }

    /// One unit of stake per node.
    pub fn stake_map(&self) -> Result<StakeMap> {
        StakeMap::uniform(self.population_size)
    }

    pub fn composition_parameters(&self) -> CompositionParameters {
        CompositionParameters {
            sampling_ratio: self.sampling_ratio(),
            baseline_noise_multiplier: self.noise_multiplier,
            batch_size: self.batch_size,
            target_delta: self.delta,
            orders: self.orders.clone(),
        }
    }

    /// A copy of this scenario with a different adversary.
    pub fn with_adversary(&self, adversary: AdversaryStake) -> Self {
        Self {
            adversary,
            ..self.clone()
        }
    }
}
