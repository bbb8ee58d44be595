// Copyright (c) 2024 Botho Foundation
//
//! Scenario Integration Tests
//!
//! Exercises the public API end to end:
//! - Committee odds against closed-form hypergeometric values
//! - Composition of exposed versus securely aggregated rounds
//! - Scenario files loaded from disk, run, and written back out
//! - Concrete committee draws against the analytic seat probability

use std::collections::BTreeSet;

use bth_committee_privacy::{
    append_summary_row, run_scenario, select_adversarial_minimal_set, write_records_csv,
    AdversaryStake, AdversaryStakeFraction, CommitteeObservationModel, CommitteeParameters,
    CompositionParameters, ObservationSchedule, PrivacyCompositionEngine,
    SampledGaussianAccountant, ScenarioConfig, StakeMap, SummaryRow, SystemLabel,
};
use bth_rdp_accountant::default_orders;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use statrs::function::factorial::ln_binomial;
use tempfile::tempdir;

// ============================================================================
// Committee odds
// ============================================================================

#[test]
fn thirty_percent_adversary_almost_always_seated() {
    let params = CommitteeParameters::new(100, 30).unwrap();
    let fraction = AdversaryStakeFraction::from_stake(30.0, 100.0).unwrap();
    let model = CommitteeObservationModel::new(params, fraction);

    let seat = model.probability_at_least_one_adversarial_seat();
    let closed_form = 1.0 - (ln_binomial(70, 30) - ln_binomial(100, 30)).exp();

    assert!(seat > 0.99);
    assert!((seat - closed_form).abs() < 1e-6);
    assert!(seat >= model.probability_majority());
}

#[test]
fn single_seat_committee_matches_stake_share() {
    for adversaries in [0u64, 7, 50, 100] {
        let params = CommitteeParameters::new(100, 1).unwrap();
        let fraction = AdversaryStakeFraction::from_stake(adversaries as f64, 100.0).unwrap();
        let model = CommitteeObservationModel::new(params, fraction);
        let p = fraction.value();
        assert_eq!(model.probability_at_least_one_adversarial_seat(), p);
        assert_eq!(model.probability_majority(), p);
    }
}

// ============================================================================
// Composition
// ============================================================================

fn engine(
    sampling_ratio: f64,
    noise: f64,
    batch: u64,
) -> PrivacyCompositionEngine<SampledGaussianAccountant> {
    PrivacyCompositionEngine::new(
        SampledGaussianAccountant,
        CompositionParameters {
            sampling_ratio,
            baseline_noise_multiplier: noise,
            batch_size: batch,
            target_delta: 1e-5,
            orders: default_orders(),
        },
    )
    .unwrap()
}

#[test]
fn secure_aggregation_lowers_final_epsilon() {
    let engine = engine(0.01, 1.0, 64);
    let hidden = engine
        .compose(&ObservationSchedule::never_observed(50))
        .unwrap();
    let exposed = engine
        .compose(&ObservationSchedule::always_observed(50))
        .unwrap();

    assert!(hidden.final_epsilon() < exposed.final_epsilon());
    assert!((exposed.final_epsilon() - 1.528).abs() < 0.01);
    assert!((hidden.final_epsilon() - 0.0445).abs() < 0.002);
}

#[test]
fn mixed_schedule_lies_between_extremes() {
    let engine = engine(0.01, 1.0, 64);
    let mut rng = ChaCha20Rng::seed_from_u64(99);
    let mixed = ObservationSchedule::with_observed_count(50, 20, &mut rng).unwrap();

    let low = engine.compose(&ObservationSchedule::never_observed(50)).unwrap();
    let mid = engine.compose(&mixed).unwrap();
    let high = engine.compose(&ObservationSchedule::always_observed(50)).unwrap();

    assert!(low.final_epsilon() < mid.final_epsilon());
    assert!(mid.final_epsilon() < high.final_epsilon());
}

#[test]
fn dp_sgd_reference_point() {
    // 60 epochs of 256-example batches over 60000 examples at sigma 1.12.
    let engine = engine(256.0 / 60_000.0, 1.12, 256);
    let baseline = engine.independent_rounds(14_063, 1.12).unwrap();
    let last = baseline.final_result().unwrap();
    assert_eq!(last.round, 14_063);
    assert!((last.epsilon - 2.92).abs() < 0.01, "epsilon {}", last.epsilon);
    assert_eq!(last.optimal_order, 9.0);
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn scenario_from_file_to_outputs() {
    let dir = tempdir().unwrap();
    let scenario_path = dir.path().join("scenario.toml");
    std::fs::write(
        &scenario_path,
        r#"
population_size = 200
batch_size = 20
committee_size = 10
adversary = { stake = 20 }
noise_multiplier = 1.0
delta = 1e-5
rounds = 60
seed = 42
"#,
    )
    .unwrap();

    let config = ScenarioConfig::load(&scenario_path).unwrap();
    assert_eq!(config.adversary, AdversaryStake::Stake(20.0));

    let mut rng = ChaCha20Rng::seed_from_u64(config.seed.unwrap());
    let report = run_scenario(&config, SampledGaussianAccountant, &mut rng).unwrap();

    let records = report.records();
    assert_eq!(records.len(), 120);
    assert!(records
        .iter()
        .filter(|r| r.system == SystemLabel::Committee)
        .zip(records.iter().filter(|r| r.system == SystemLabel::FederatedLearning))
        .all(|(committee, fed)| committee.epsilon <= fed.epsilon + 1e-12));

    let csv_path = dir.path().join("privacy_analysis.csv");
    write_records_csv(&records, std::fs::File::create(&csv_path).unwrap()).unwrap();
    let csv = std::fs::read_to_string(&csv_path).unwrap();
    assert_eq!(csv.lines().count(), 121);
    assert!(csv.starts_with("system,round,epsilon\nfed_learn,1,"));

    let summary_path = dir.path().join("results.csv");
    append_summary_row(&summary_path, &SummaryRow::from_report(&report)).unwrap();
    let summary = std::fs::read_to_string(&summary_path).unwrap();
    assert_eq!(summary.lines().count(), 2);
    assert!(summary.lines().nth(1).unwrap().starts_with("200,0.1,0.1,1,0.00001,10,"));
}

#[test]
fn same_seed_reproduces_scenario() {
    let config = ScenarioConfig {
        population_size: 150,
        batch_size: 15,
        committee_size: 6,
        adversary: AdversaryStake::Fraction(0.2),
        rounds: Some(80),
        ..ScenarioConfig::default()
    };

    let run = || {
        run_scenario(&config, SampledGaussianAccountant, &mut ChaCha20Rng::seed_from_u64(8))
            .unwrap()
    };
    let a = run();
    let b = run();
    assert_eq!(a.records(), b.records());
    assert_eq!(a.observed_rounds, b.observed_rounds);
}

// ============================================================================
// Concrete committee draws
// ============================================================================

#[test]
fn sampled_committees_track_analytic_seat_probability() {
    let stake_map = StakeMap::uniform(1_000).unwrap();
    let adversaries: BTreeSet<_> = select_adversarial_minimal_set(100.0, &stake_map).unwrap();
    assert_eq!(adversaries.len(), 100);

    let params = CommitteeParameters::new(1_000, 5).unwrap();
    let fraction = stake_map.fraction_held_by(&adversaries).unwrap();
    let analytic = CommitteeObservationModel::new(params, fraction)
        .probability_at_least_one_adversarial_seat();

    let mut rng = ChaCha20Rng::seed_from_u64(31);
    let empirical = bth_committee_privacy::empirical_observation_rate(
        &stake_map,
        5,
        &adversaries,
        5_000,
        &mut rng,
    )
    .unwrap();

    // Draws are with replacement; for a committee this small relative to the
    // population the two agree to well within sampling error.
    assert!((empirical - analytic).abs() < 0.03, "{empirical} vs {analytic}");
}
