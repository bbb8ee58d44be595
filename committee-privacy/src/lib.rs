// Copyright (c) 2024 Botho Foundation

//! Differential privacy accounting for committee-aggregated federated
//! learning.
//!
//! Each training round is aggregated by a committee drawn by stake. When
//! every seat is honest, secure aggregation hides individual updates and the
//! round's noise is amortized across the batch. When an adversary holds a
//! seat, the round falls back to per-client noise. This crate estimates how
//! often that happens and what it costs in cumulative (ε, δ).
//!
//! ## Pipeline
//!
//! | Step | Module | Output |
//! |------|--------|--------|
//! | Adversary's stake | [`stake`] | [`AdversaryStakeFraction`] |
//! | Committee odds | [`committee`] | P(seat), P(majority) |
//! | Observed rounds | [`schedule`] | [`ObservationSchedule`] |
//! | Composition | [`composition`] | ε after every round |
//! | Concrete draws | [`sampler`] | committees, adversarial sets |
//!
//! [`run_scenario`] chains these together and also computes the plain
//! federated learning curve, where every round is exposed, for comparison.
//!
//! ## Noise model
//!
//! - Observed round: noise multiplier `σ`
//! - Secure aggregation: `σ × √batch`

pub mod accountant;
pub mod committee;
pub mod composition;
pub mod config;
pub mod report;
pub mod sampler;
pub mod scenario;
pub mod schedule;
pub mod stake;

mod error;

pub use accountant::{FixedDivergenceAccountant, RenyiAccountant, SampledGaussianAccountant};
pub use committee::{
    min_committee_size_for_majority_bound, CommitteeObservationModel, CommitteeParameters,
};
pub use composition::{
    CompositionParameters, CompositionTrace, OrderBoundary, OrderBoundaryWarning,
    PrivacyCompositionEngine, PrivacyResult, RdpState, RoundTransition,
};
pub use config::ScenarioConfig;
pub use error::{PrivacyError, Result};
pub use report::{
    append_summary_row, format_scenario_report, records_to_json, write_records_csv, SummaryRow,
};
pub use sampler::{
    adversary_intersects_committee, adversary_observes, empirical_observation_rate,
    select_adversarial_minimal_set, select_committee,
};
pub use scenario::{run_scenario, EpsilonRecord, ScenarioReport, SystemLabel};
pub use schedule::{ObservationSchedule, RoundScheduleGenerator};
pub use stake::{AdversaryStake, AdversaryStakeFraction, NodeId, Stake, StakeMap};
