// Copyright (c) 2024 Botho Foundation

//! Node stake and the adversary's share of it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{check_probability, PrivacyError, Result};

/// Stake weight carried by a node.
pub type Stake = u64;

/// Identifier of a participating node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node-{}", self.0)
    }
}

/// Stake held by every node in a scenario.
///
/// Total stake is always positive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StakeMap {
    stakes: BTreeMap<NodeId, Stake>,
    total: Stake,
}

impl StakeMap {
    /// One unit of stake for each of `population` nodes.
    pub fn uniform(population: u64) -> Result<Self> {
        if population == 0 {
            return Err(PrivacyError::InvalidParameter(
                "population size must be at least 1".to_string(),
            ));
        }
        Self::from_stakes((0..population).map(|id| (NodeId(id), 1)))
    }

    /// Build a map from explicit `(node, stake)` pairs.
    ///
    /// Node identifiers must be unique and the stakes must not all be zero.
    pub fn from_stakes(entries: impl IntoIterator<Item = (NodeId, Stake)>) -> Result<Self> {
        let mut stakes = BTreeMap::new();
        let mut total: Stake = 0;

        for (node, stake) in entries {
            if stakes.insert(node, stake).is_some() {
                return Err(PrivacyError::InvalidParameter(format!(
                    "duplicate stake entry for {node}"
                )));
            }
            total = total.checked_add(stake).ok_or_else(|| {
                PrivacyError::InvalidParameter("total stake overflows u64".to_string())
            })?;
        }

        if total == 0 {
            return Err(PrivacyError::InvalidParameter(
                "total stake must be positive".to_string(),
            ));
        }

        Ok(Self { stakes, total })
    }

    /// Sum of all stake.
    pub fn total_stake(&self) -> Stake {
        self.total
    }

    /// Stake of a single node.
    pub fn stake_of(&self, node: NodeId) -> Option<Stake> {
        self.stakes.get(&node).copied()
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.stakes.len()
    }

    /// Never true for a constructed map, provided for API symmetry.
    pub fn is_empty(&self) -> bool {
        self.stakes.is_empty()
    }

    /// Iterate nodes in identifier order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, Stake)> + '_ {
        self.stakes.iter().map(|(&node, &stake)| (node, stake))
    }

    /// Fraction of total stake held by `nodes`.
    pub fn fraction_held_by(&self, nodes: &BTreeSet<NodeId>) -> Result<AdversaryStakeFraction> {
        let mut held: Stake = 0;
        for node in nodes {
            let stake = self.stake_of(*node).ok_or_else(|| {
                PrivacyError::InvalidParameter(format!("{node} is not in the stake map"))
            })?;
            held += stake;
        }
        AdversaryStakeFraction::from_stake(held as f64, self.total as f64)
    }
}

/// How much stake the adversary controls.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdversaryStake {
    /// Absolute stake, in the same units as the stake map.
    Stake(f64),
    /// Share of total stake in `[0, 1]`.
    Fraction(f64),
}

impl AdversaryStake {
    /// Absolute stake the adversary must accumulate out of `total`.
    pub fn target_stake(&self, total: Stake) -> Result<f64> {
        let total = total as f64;
        let target = match *self {
            AdversaryStake::Stake(stake) => stake,
            AdversaryStake::Fraction(fraction) => {
                check_probability("adversary fraction", fraction)?;
                fraction * total
            }
        };
        if !(0.0..=total).contains(&target) {
            return Err(PrivacyError::InvalidParameter(format!(
                "adversary stake must be in [0, {total}], got {target}"
            )));
        }
        Ok(target)
    }

    /// The adversary's share of `total` stake.
    pub fn fraction(&self, total: Stake) -> Result<AdversaryStakeFraction> {
        AdversaryStakeFraction::from_stake(self.target_stake(total)?, total as f64)
    }
}

/// The adversary's share of total stake, always in `[0, 1]`.
///
/// Under uniform-stake sampling this is also the probability that a single
/// committee draw lands on an adversarial node.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize)]
pub struct AdversaryStakeFraction(f64);

impl AdversaryStakeFraction {
    /// Wrap a fraction, rejecting values outside `[0, 1]`.
    pub fn new(fraction: f64) -> Result<Self> {
        check_probability("adversary stake fraction", fraction)?;
        Ok(Self(fraction))
    }

    /// `adversary_stake / total_stake`.
    pub fn from_stake(adversary_stake: f64, total_stake: f64) -> Result<Self> {
        if total_stake <= 0.0 || total_stake.is_nan() {
            return Err(PrivacyError::InvalidParameter(format!(
                "total stake must be positive, got {total_stake}"
            )));
        }
        if adversary_stake < 0.0 || adversary_stake.is_nan() {
            return Err(PrivacyError::InvalidParameter(format!(
                "adversary stake must be non-negative, got {adversary_stake}"
            )));
        }
        Self::new(adversary_stake / total_stake)
    }

    pub fn value(self) -> f64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniform_map() {
        let map = StakeMap::uniform(100).unwrap();
        assert_eq!(map.len(), 100);
        assert_eq!(map.total_stake(), 100);
        assert_eq!(map.stake_of(NodeId(42)), Some(1));
        assert_eq!(map.stake_of(NodeId(100)), None);
    }

    #[test]
    fn test_empty_population_rejected() {
        assert!(matches!(
            StakeMap::uniform(0),
            Err(PrivacyError::InvalidParameter(_))
        ));
        assert!(StakeMap::from_stakes([(NodeId(1), 0), (NodeId(2), 0)]).is_err());
    }

    #[test]
    fn test_duplicate_nodes_rejected() {
        let result = StakeMap::from_stakes([(NodeId(1), 5), (NodeId(1), 7)]);
        assert!(matches!(result, Err(PrivacyError::InvalidParameter(_))));
    }

    #[test]
    fn test_fraction_held_by() {
        let map = StakeMap::from_stakes([(NodeId(0), 10), (NodeId(1), 30), (NodeId(2), 60)])
            .unwrap();
        let adversaries: BTreeSet<_> = [NodeId(0), NodeId(1)].into_iter().collect();
        let fraction = map.fraction_held_by(&adversaries).unwrap();
        assert!((fraction.value() - 0.4).abs() < 1e-12);

        let unknown: BTreeSet<_> = [NodeId(9)].into_iter().collect();
        assert!(map.fraction_held_by(&unknown).is_err());
    }

    #[test]
    fn test_adversary_stake_targets() {
        assert_eq!(AdversaryStake::Stake(30.0).target_stake(100).unwrap(), 30.0);
        assert_eq!(AdversaryStake::Fraction(0.25).target_stake(200).unwrap(), 50.0);
        assert!(AdversaryStake::Stake(101.0).target_stake(100).is_err());
        assert!(AdversaryStake::Stake(-1.0).target_stake(100).is_err());
        assert!(AdversaryStake::Fraction(1.5).target_stake(100).is_err());

        let fraction = AdversaryStake::Stake(30.0).fraction(100).unwrap();
        assert!((fraction.value() - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_fraction_bounds() {
        assert!(AdversaryStakeFraction::new(0.0).is_ok());
        assert!(AdversaryStakeFraction::new(1.0).is_ok());
        assert!(AdversaryStakeFraction::new(-0.1).is_err());
        assert!(AdversaryStakeFraction::new(f64::NAN).is_err());
        assert!(AdversaryStakeFraction::from_stake(1.0, 0.0).is_err());
    }
}
