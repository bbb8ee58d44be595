// Copyright (c) 2024 Botho Foundation

//! Which rounds the adversary observes.
//!
//! The number of observed rounds is fixed up front at
//! `round(total_rounds × p)`; only their positions are random. This trades
//! per-round independence for an exact long-run frequency, so a schedule
//! never over- or under-counts observed rounds by chance.

use rand::{seq::SliceRandom, Rng};
use serde::Serialize;

use crate::committee::expected_rounds;
use crate::error::{PrivacyError, Result};

/// Per-round flags: `true` when the adversary observed that round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ObservationSchedule {
    rounds: Vec<bool>,
}

impl ObservationSchedule {
    /// A schedule with exactly `observed` observed rounds out of `total`,
    /// in uniformly random positions.
    pub fn with_observed_count<R: Rng + ?Sized>(
        total: u64,
        observed: u64,
        rng: &mut R,
    ) -> Result<Self> {
        if observed > total {
            return Err(PrivacyError::ScheduleCount { observed, total });
        }
        let total = usize::try_from(total).map_err(|_| {
            PrivacyError::InvalidSchedule(format!("{total} rounds do not fit in memory"))
        })?;
        let observed = observed as usize;

        let mut rounds = vec![true; observed];
        rounds.resize(total, false);
        rounds.shuffle(rng);
        Ok(Self { rounds })
    }

    /// Build a schedule from explicit flags.
    pub fn from_flags(rounds: Vec<bool>) -> Self {
        Self { rounds }
    }

    /// No round observed.
    pub fn never_observed(total: usize) -> Self {
        Self {
            rounds: vec![false; total],
        }
    }

    /// Every round observed.
    pub fn always_observed(total: usize) -> Self {
        Self {
            rounds: vec![true; total],
        }
    }

    pub fn len(&self) -> usize {
        self.rounds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rounds.is_empty()
    }

    /// Whether 1-indexed `round` was observed.
    pub fn is_observed(&self, round: u64) -> Option<bool> {
        let index = usize::try_from(round.checked_sub(1)?).ok()?;
        self.rounds.get(index).copied()
    }

    pub fn observed_count(&self) -> u64 {
        self.rounds.iter().filter(|&&observed| observed).count() as u64
    }

    /// Flags in round order.
    pub fn iter(&self) -> impl Iterator<Item = bool> + '_ {
        self.rounds.iter().copied()
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.rounds
    }
}

/// Turns a per-round observation probability into a schedule.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RoundScheduleGenerator {
    total_rounds: u64,
    observation_probability: f64,
}

impl RoundScheduleGenerator {
    pub fn new(total_rounds: u64, observation_probability: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&observation_probability) {
            return Err(PrivacyError::InvalidSchedule(format!(
                "observation probability must be in [0, 1], got {observation_probability}"
            )));
        }
        Ok(Self {
            total_rounds,
            observation_probability,
        })
    }

    pub fn total_rounds(&self) -> u64 {
        self.total_rounds
    }

    /// `round(total_rounds × observation_probability)`.
    pub fn expected_observed_rounds(&self) -> u64 {
        expected_rounds(self.total_rounds, self.observation_probability)
    }

    /// Shuffle the expected number of observed rounds into place.
    pub fn generate<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<ObservationSchedule> {
        ObservationSchedule::with_observed_count(
            self.total_rounds,
            self.expected_observed_rounds(),
            rng,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_expected_count_rounding() {
        let gen = RoundScheduleGenerator::new(50, 0.31).unwrap();
        assert_eq!(gen.expected_observed_rounds(), 16);

        let gen = RoundScheduleGenerator::new(10, 0.25).unwrap();
        assert_eq!(gen.expected_observed_rounds(), 3);

        let gen = RoundScheduleGenerator::new(0, 0.9).unwrap();
        assert_eq!(gen.expected_observed_rounds(), 0);
    }

    #[test]
    fn test_invalid_probability_rejected() {
        for p in [-0.1, 1.01, f64::NAN] {
            assert!(matches!(
                RoundScheduleGenerator::new(10, p),
                Err(PrivacyError::InvalidSchedule(_))
            ));
        }
    }

    #[test]
    fn test_observed_count_above_total_rejected() {
        let mut rng = ChaCha20Rng::seed_from_u64(1);
        assert_eq!(
            ObservationSchedule::with_observed_count(5, 6, &mut rng),
            Err(PrivacyError::ScheduleCount {
                observed: 6,
                total: 5
            })
        );
    }

    #[test]
    fn test_same_seed_same_schedule() {
        let gen = RoundScheduleGenerator::new(200, 0.4).unwrap();
        let a = gen.generate(&mut ChaCha20Rng::seed_from_u64(7)).unwrap();
        let b = gen.generate(&mut ChaCha20Rng::seed_from_u64(7)).unwrap();
        let c = gen.generate(&mut ChaCha20Rng::seed_from_u64(8)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.observed_count(), c.observed_count());
    }

    #[test]
    fn test_round_lookup_is_one_indexed() {
        let schedule = ObservationSchedule::from_flags(vec![true, false, false]);
        assert_eq!(schedule.is_observed(0), None);
        assert_eq!(schedule.is_observed(1), Some(true));
        assert_eq!(schedule.is_observed(3), Some(false));
        assert_eq!(schedule.is_observed(4), None);
    }

    #[test]
    fn test_extremes() {
        let mut rng = ChaCha20Rng::seed_from_u64(3);
        let none = RoundScheduleGenerator::new(20, 0.0)
            .unwrap()
            .generate(&mut rng)
            .unwrap();
        assert_eq!(none, ObservationSchedule::never_observed(20));

        let all = RoundScheduleGenerator::new(20, 1.0)
            .unwrap()
            .generate(&mut rng)
            .unwrap();
        assert_eq!(all, ObservationSchedule::always_observed(20));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn observed_count_independent_of_seed(
            rounds in 0u64..2_000,
            p in 0.0f64..=1.0,
            seed in any::<u64>(),
        ) {
            let gen = RoundScheduleGenerator::new(rounds, p).unwrap();
            let schedule = gen.generate(&mut ChaCha20Rng::seed_from_u64(seed)).unwrap();
            prop_assert_eq!(schedule.len() as u64, rounds);
            prop_assert_eq!(schedule.observed_count(), (rounds as f64 * p).round() as u64);
        }
    }
}
