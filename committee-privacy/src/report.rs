// Copyright (c) 2024 Botho Foundation

//! Scenario output: ε records as CSV or JSON, one-line summaries, and a
//! human-readable report.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::scenario::{EpsilonRecord, ScenarioReport};

/// Column order of the appended summary file.
pub const SUMMARY_COLUMNS: [&str; 10] = [
    "number_nodes",
    "sample_ratio",
    "adversarial_client_control",
    "noise_multiplier",
    "delta",
    "committee_size",
    "epsilon",
    "rounds_adversary_observes",
    "rounds_adversary_majority",
    "epsilon_list",
];

/// One line of the summary file.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SummaryRow {
    pub number_nodes: u64,
    pub sample_ratio: f64,
    pub adversarial_client_control: f64,
    pub noise_multiplier: f64,
    pub delta: f64,
    pub committee_size: u64,
    pub epsilon: f64,
    pub rounds_adversary_observes: u64,
    pub rounds_adversary_majority: u64,
    /// Committee ε after every round.
    pub epsilon_list: Vec<f64>,
}

impl SummaryRow {
    pub fn from_report(report: &ScenarioReport) -> Self {
        Self {
            number_nodes: report.config.population_size,
            sample_ratio: report.config.sampling_ratio(),
            adversarial_client_control: report.adversary_fraction,
            noise_multiplier: report.config.noise_multiplier,
            delta: report.config.delta,
            committee_size: report.config.committee_size,
            epsilon: report.final_epsilon(),
            rounds_adversary_observes: report.observed_rounds,
            rounds_adversary_majority: report.majority_rounds,
            epsilon_list: report.committee.epsilons(),
        }
    }

    /// Comma-separated values in [`SUMMARY_COLUMNS`] order. The ε list is
    /// written as one quoted `"[e1;e2;...]"` field.
    pub fn to_csv_line(&self) -> String {
        let epsilon_list = self
            .epsilon_list
            .iter()
            .map(f64::to_string)
            .collect::<Vec<_>>()
            .join(";");
        format!(
            "{},{},{},{},{},{},{},{},{},\"[{}]\"",
            self.number_nodes,
            self.sample_ratio,
            self.adversarial_client_control,
            self.noise_multiplier,
            self.delta,
            self.committee_size,
            self.epsilon,
            self.rounds_adversary_observes,
            self.rounds_adversary_majority,
            epsilon_list,
        )
    }
}

/// Write `system,round,epsilon` rows, header first.
pub fn write_records_csv<W: Write>(records: &[EpsilonRecord], mut writer: W) -> io::Result<()> {
    writeln!(writer, "system,round,epsilon")?;
    for record in records {
        writeln!(writer, "{},{},{}", record.system, record.round, record.epsilon)?;
    }
    writer.flush()
}

/// Records as a pretty-printed JSON array.
pub fn records_to_json(records: &[EpsilonRecord]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(records)
}

/// Append `row` to the CSV summary at `path`, writing the header first when
/// the file is new or empty.
pub fn append_summary_row(path: &Path, row: &SummaryRow) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open summary file {}", path.display()))?;

    let is_empty = file
        .metadata()
        .with_context(|| format!("Failed to stat summary file {}", path.display()))?
        .len()
        == 0;

    if is_empty {
        writeln!(file, "{}", SUMMARY_COLUMNS.join(","))
            .with_context(|| format!("Failed to write header to {}", path.display()))?;
    }
    writeln!(file, "{}", row.to_csv_line())
        .with_context(|| format!("Failed to append to {}", path.display()))?;

    Ok(())
}

/// Human-readable scenario report.
pub fn format_scenario_report(report: &ScenarioReport) -> String {
    let config = &report.config;
    let mut out = String::new();

    out.push_str("╔══════════════════════════════════════════════════════════════════╗\n");
    out.push_str("║              COMMITTEE PRIVACY ACCOUNTING REPORT                 ║\n");
    out.push_str("╠══════════════════════════════════════════════════════════════════╣\n");
    out.push_str(&format!(
        "║  Nodes: {:>8}   Batch: {:>6}   Committee: {:>5}   Rounds: {:>6} ║\n",
        config.population_size, config.batch_size, config.committee_size, report.total_rounds
    ));
    out.push_str("╚══════════════════════════════════════════════════════════════════╝\n\n");

    out.push_str("ADVERSARY\n");
    out.push_str("─────────────────────────────────────────────────────────────────────\n");
    out.push_str(&format!(
        "Stake fraction:             {:>10.4}   ({} nodes)\n",
        report.adversary_fraction, report.adversarial_nodes
    ));
    out.push_str(&format!(
        "P(seat on committee):       {:>10.6}\n",
        report.observation_probability
    ));
    if let Some(rate) = report.empirical_observation_rate {
        out.push_str(&format!(
            "Empirical seat rate:        {:>10.6}   ({} draws, with replacement)\n",
            rate, config.membership_trials
        ));
    }
    out.push_str(&format!(
        "P(committee majority):      {:>10.6}\n",
        report.majority_probability
    ));
    out.push_str(&format!(
        "Rounds observed:            {:>10}\n",
        report.observed_rounds
    ));
    out.push_str(&format!(
        "Rounds with majority:       {:>10}\n\n",
        report.majority_rounds
    ));

    out.push_str("PRIVACY\n");
    out.push_str("─────────────────────────────────────────────────────────────────────\n");
    out.push_str("System          Epsilon     Delta       Optimal order\n");
    out.push_str("─────────────────────────────────────────────────────────────────────\n");
    for (label, trace) in [("fed_learn", &report.baseline), ("committee", &report.committee)] {
        let order = trace
            .final_result()
            .map_or_else(|| "-".to_string(), |r| format!("{}", r.optimal_order));
        out.push_str(&format!(
            "{:<15} {:>9.4}   {:<10e}  {}\n",
            label,
            trace.final_epsilon(),
            config.delta,
            order
        ));
    }

    let warnings = report.committee.warnings.len() + report.baseline.warnings.len();
    if warnings > 0 {
        out.push_str(&format!(
            "\n{warnings} rounds hit the edge of the order list; widen it for a tighter bound.\n"
        ));
    }

    out
}
