// Copyright (c) 2024 Botho Foundation

//! Concrete stake-weighted committee draws.
//!
//! The analytic model in [`crate::committee`] gives probabilities; this module
//! draws actual committees so the two can be compared. Nodes own a slice of
//! the unit interval proportional to their stake and every seat is an
//! independent uniform draw, so the same node can fill several seats.

use std::collections::BTreeSet;

use rand::Rng;

use crate::error::{PrivacyError, Result};
use crate::stake::{NodeId, Stake, StakeMap};

/// Draw `committee_size` seats, each mapped to the node whose cumulative
/// stake interval `(prev, current]` contains a uniform draw.
///
/// Nodes are laid out in ascending stake order, ties broken by identifier.
/// Sampling is with replacement.
pub fn select_committee<R: Rng + ?Sized>(
    stake_map: &StakeMap,
    committee_size: usize,
    rng: &mut R,
) -> Vec<NodeId> {
    let partition = cumulative_partition(stake_map);

    (0..committee_size)
        .map(|_| {
            // Uniform on (0, 1], matching the half-open intervals.
            let x = 1.0 - rng.gen::<f64>();
            node_at(&partition, x)
        })
        .collect()
}

/// `(node, upper bound)` pairs; the final bound is exactly 1.
fn cumulative_partition(stake_map: &StakeMap) -> Vec<(NodeId, f64)> {
    let total = stake_map.total_stake() as f64;
    let mut nodes: Vec<(NodeId, Stake)> = stake_map.iter().collect();
    nodes.sort_by_key(|&(node, stake)| (stake, node));

    let mut cumulative = 0.0;
    let mut partition: Vec<(NodeId, f64)> = nodes
        .into_iter()
        .map(|(node, stake)| {
            cumulative += stake as f64 / total;
            (node, cumulative)
        })
        .collect();
    if let Some(last) = partition.last_mut() {
        last.1 = 1.0;
    }
    partition
}

/// Node owning `x` in `(0, 1]`.
///
/// Zero-stake nodes sort first with an upper bound of 0, so no positive `x`
/// lands on them.
fn node_at(partition: &[(NodeId, f64)], x: f64) -> NodeId {
    let index = partition.partition_point(|&(_, bound)| bound < x);
    partition[index.min(partition.len() - 1)].0
}

/// Whether any seat in `committee` belongs to the adversary.
pub fn adversary_intersects_committee(
    committee: &[NodeId],
    adversarial_nodes: &BTreeSet<NodeId>,
) -> bool {
    committee.iter().any(|node| adversarial_nodes.contains(node))
}

/// Accumulate nodes from smallest stake upward until their combined stake
/// reaches `target_stake`.
///
/// This is greedy, not a minimum-cardinality set. The stopping test runs
/// before each node is taken, so a zero target yields the empty set rather
/// than the single smallest node; any positive target takes at least one.
pub fn select_adversarial_minimal_set(
    target_stake: f64,
    stake_map: &StakeMap,
) -> Result<BTreeSet<NodeId>> {
    let total = stake_map.total_stake() as f64;
    if target_stake.is_nan() || target_stake < 0.0 || target_stake > total {
        return Err(PrivacyError::InvalidParameter(format!(
            "target stake must be in [0, {total}], got {target_stake}"
        )));
    }

    let mut nodes: Vec<(NodeId, Stake)> = stake_map.iter().collect();
    nodes.sort_by_key(|&(node, stake)| (stake, node));

    let mut selected = BTreeSet::new();
    let mut accumulated = 0.0;
    for (node, stake) in nodes {
        if accumulated >= target_stake {
            break;
        }
        selected.insert(node);
        accumulated += stake as f64;
    }
    Ok(selected)
}

/// Draw one committee and report whether the adversary holds a seat.
pub fn adversary_observes<R: Rng + ?Sized>(
    stake_map: &StakeMap,
    committee_size: usize,
    adversarial_nodes: &BTreeSet<NodeId>,
    rng: &mut R,
) -> bool {
    let committee = select_committee(stake_map, committee_size, rng);
    adversary_intersects_committee(&committee, adversarial_nodes)
}

/// Fraction of `trials` independent committee draws that seat the
/// adversary. Zero trials gives `None`.
pub fn empirical_observation_rate<R: Rng + ?Sized>(
    stake_map: &StakeMap,
    committee_size: usize,
    adversarial_nodes: &BTreeSet<NodeId>,
    trials: u64,
    rng: &mut R,
) -> Option<f64> {
    if trials == 0 {
        return None;
    }
    let hits = (0..trials)
        .filter(|_| adversary_observes(stake_map, committee_size, adversarial_nodes, rng))
        .count();
    Some(hits as f64 / trials as f64)
}
