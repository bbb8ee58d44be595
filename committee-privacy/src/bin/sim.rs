// Copyright (c) 2024 Botho Foundation

//! Committee privacy accounting CLI.
//!
//! Estimate how much differential privacy a committee-aggregated federated
//! learning run spends when an adversary holds part of the stake.

#[cfg(feature = "cli")]
mod cli {
    use std::fs;
    use std::path::PathBuf;

    use anyhow::{Context, Result};
    use bth_committee_privacy::{
        append_summary_row, format_scenario_report, min_committee_size_for_majority_bound,
        records_to_json, run_scenario, write_records_csv, AdversaryStake,
        CommitteeObservationModel, CommitteeParameters, PrivacyError, SampledGaussianAccountant,
        ScenarioConfig, ScenarioReport, SummaryRow,
    };
    use clap::{Args, Parser, Subcommand, ValueEnum};
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;
    use rayon::prelude::*;
    use tracing::info;
    use tracing_subscriber::EnvFilter;

    #[derive(Parser)]
    #[command(name = "committee-privacy-sim")]
    #[command(about = "Differential privacy of committee-aggregated federated learning")]
    pub struct Cli {
        /// Scenario file (TOML); flags override its values
        #[arg(short, long, global = true)]
        pub config: Option<PathBuf>,

        /// Enable verbose logging
        #[arg(short, long, global = true)]
        pub verbose: bool,

        /// Seed for schedule shuffling and committee draws
        #[arg(long, global = true)]
        pub seed: Option<u64>,

        #[command(subcommand)]
        pub command: Command,
    }

    /// Scenario overrides shared by every subcommand.
    #[derive(Args, Debug, Default)]
    pub struct ScenarioArgs {
        /// Number of participating nodes
        #[arg(long)]
        pub nodes: Option<u64>,

        /// Clients aggregated per round
        #[arg(long)]
        pub batch_size: Option<u64>,

        /// Seats on each round's committee
        #[arg(long)]
        pub committee_size: Option<u64>,

        /// Adversary stake, in units of stake
        #[arg(long, conflicts_with = "adversary_fraction")]
        pub adversary_stake: Option<f64>,

        /// Adversary stake as a share of the total (0.0 to 1.0)
        #[arg(long)]
        pub adversary_fraction: Option<f64>,

        /// Baseline noise multiplier
        #[arg(long)]
        pub noise_multiplier: Option<f64>,

        /// Target delta
        #[arg(long)]
        pub delta: Option<f64>,

        /// Training rounds
        #[arg(long, conflicts_with = "epochs")]
        pub rounds: Option<u64>,

        /// Passes over the population (may be fractional)
        #[arg(long)]
        pub epochs: Option<f64>,

        /// Concrete committee draws for the empirical seat rate
        #[arg(long)]
        pub membership_trials: Option<u64>,
    }

    impl ScenarioArgs {
        fn apply(&self, config: &mut ScenarioConfig) {
            if let Some(nodes) = self.nodes {
                config.population_size = nodes;
            }
            if let Some(batch_size) = self.batch_size {
                config.batch_size = batch_size;
            }
            if let Some(committee_size) = self.committee_size {
                config.committee_size = committee_size;
            }
            if let Some(stake) = self.adversary_stake {
                config.adversary = AdversaryStake::Stake(stake);
            }
            if let Some(fraction) = self.adversary_fraction {
                config.adversary = AdversaryStake::Fraction(fraction);
            }
            if let Some(noise) = self.noise_multiplier {
                config.noise_multiplier = noise;
            }
            if let Some(delta) = self.delta {
                config.delta = delta;
            }
            if let Some(rounds) = self.rounds {
                config.rounds = Some(rounds);
                config.epochs = None;
            }
            if let Some(epochs) = self.epochs {
                config.epochs = Some(epochs);
                config.rounds = None;
            }
            if let Some(trials) = self.membership_trials {
                config.membership_trials = trials;
            }
        }
    }

    #[derive(Clone, Copy, Debug, ValueEnum)]
    pub enum OutputFormat {
        Csv,
        Json,
    }

    #[derive(Subcommand)]
    pub enum Command {
        /// Compare plain federated learning with committee aggregation
        Compare {
            #[command(flatten)]
            scenario: ScenarioArgs,

            /// Where to write the per-round epsilon records
            #[arg(short, long, default_value = "privacy_analysis.csv")]
            output: PathBuf,

            /// Record format
            #[arg(long, value_enum, default_value = "csv")]
            format: OutputFormat,
        },

        /// Run a scenario and append its summary row to a CSV file
        Assess {
            #[command(flatten)]
            scenario: ScenarioArgs,

            /// Summary file to append to
            #[arg(short, long, default_value = "results.csv")]
            output: PathBuf,
        },

        /// Tabulate seat and majority probabilities across committee sizes
        Committee {
            #[command(flatten)]
            scenario: ScenarioArgs,

            /// Smallest committee size
            #[arg(long, default_value = "1")]
            min_size: u64,

            /// Largest committee size (defaults to the population)
            #[arg(long)]
            max_size: Option<u64>,

            /// Step between committee sizes
            #[arg(long, default_value = "1")]
            step: u64,
        },

        /// Smallest committee whose majority probability stays under a bound
        MinCommittee {
            #[command(flatten)]
            scenario: ScenarioArgs,

            /// Largest acceptable per-round majority probability
            #[arg(long, default_value = "1e-6")]
            max_probability: f64,
        },

        /// Run scenarios for several adversary fractions in parallel
        Sweep {
            #[command(flatten)]
            scenario: ScenarioArgs,

            /// Adversary stake fractions, comma-separated
            #[arg(long, value_delimiter = ',', default_value = "0.05,0.1,0.2,0.3,0.4")]
            fractions: Vec<f64>,

            /// Append one summary row per scenario to this CSV file
            #[arg(short, long)]
            output: Option<PathBuf>,
        },
    }

    /// Level used when `RUST_LOG` is unset.
    fn default_log_level(verbose: bool) -> &'static str {
        if verbose {
            "debug"
        } else {
            "info"
        }
    }

    /// `RUST_LOG` wins over the verbosity flag.
    fn log_filter(verbose: bool) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_log_level(verbose)))
    }

    pub fn run(cli: Cli) -> Result<()> {
        tracing_subscriber::fmt()
            .with_env_filter(log_filter(cli.verbose))
            .with_target(false)
            .init();

        let base = match &cli.config {
            Some(path) => ScenarioConfig::load(path)?,
            None => ScenarioConfig::default(),
        };
        let seed = cli.seed;

        match cli.command {
            Command::Compare {
                scenario,
                output,
                format,
            } => run_compare(scenario_config(base, &scenario, seed)?, output, format),
            Command::Assess { scenario, output } => {
                run_assess(scenario_config(base, &scenario, seed)?, output)
            }
            Command::Committee {
                scenario,
                min_size,
                max_size,
                step,
            } => run_committee_table(
                scenario_config(base, &scenario, seed)?,
                min_size,
                max_size,
                step,
            ),
            Command::MinCommittee {
                scenario,
                max_probability,
            } => run_min_committee(scenario_config(base, &scenario, seed)?, max_probability),
            Command::Sweep {
                scenario,
                fractions,
                output,
            } => run_sweep(scenario_config(base, &scenario, seed)?, &fractions, output),
        }
    }

    /// Apply flag overrides, fix the seed, and validate.
    fn scenario_config(
        mut config: ScenarioConfig,
        args: &ScenarioArgs,
        seed: Option<u64>,
    ) -> Result<ScenarioConfig> {
        args.apply(&mut config);
        if seed.is_some() {
            config.seed = seed;
        }
        if config.seed.is_none() {
            config.seed = Some(rand::thread_rng().gen());
        }
        config.validate().context("Invalid scenario")?;
        Ok(config)
    }

    fn seeded_rng(config: &ScenarioConfig) -> ChaCha20Rng {
        ChaCha20Rng::seed_from_u64(config.seed.unwrap_or_default())
    }

    fn run_compare(config: ScenarioConfig, output: PathBuf, format: OutputFormat) -> Result<()> {
        info!(seed = config.seed, "Running committee privacy comparison");

        let mut rng = seeded_rng(&config);
        let report = run_scenario(&config, SampledGaussianAccountant, &mut rng)?;
        let records = report.records();

        match format {
            OutputFormat::Csv => {
                let file = fs::File::create(&output)
                    .with_context(|| format!("Failed to create {}", output.display()))?;
                write_records_csv(&records, std::io::BufWriter::new(file))
                    .with_context(|| format!("Failed to write {}", output.display()))?;
            }
            OutputFormat::Json => {
                let json = records_to_json(&records).context("Failed to serialize records")?;
                fs::write(&output, json)
                    .with_context(|| format!("Failed to write {}", output.display()))?;
            }
        }

        println!("{}", format_scenario_report(&report));
        println!("Per-round epsilon written to {}", output.display());
        Ok(())
    }

    fn run_assess(config: ScenarioConfig, output: PathBuf) -> Result<()> {
        let mut rng = seeded_rng(&config);
        let report = run_scenario(&config, SampledGaussianAccountant, &mut rng)?;
        let row = SummaryRow::from_report(&report);

        println!(
            "Sampling ratio {:.3}%, noise multiplier {}, {} nodes, committee of {}, \
             adversary {:.3} over {} rounds",
            row.sample_ratio * 100.0,
            row.noise_multiplier,
            row.number_nodes,
            row.committee_size,
            row.adversarial_client_control,
            report.total_rounds
        );
        println!(
            "satisfies differential privacy with epsilon = {:.3} and delta = {}",
            row.epsilon, row.delta
        );
        println!(
            "The adversary observes {} rounds and holds a majority in {}",
            row.rounds_adversary_observes, row.rounds_adversary_majority
        );

        append_summary_row(&output, &row)?;
        info!("Summary appended to {}", output.display());
        Ok(())
    }

    fn run_committee_table(
        config: ScenarioConfig,
        min_size: u64,
        max_size: Option<u64>,
        step: u64,
    ) -> Result<()> {
        let fraction = config.adversary.fraction(config.population_size)?;
        let rounds = config.total_rounds()?;
        let max_size = max_size.unwrap_or(config.population_size);
        let step = usize::try_from(step.max(1)).context("Step is too large")?;

        println!(
            "Adversary fraction {:.4} of {} nodes over {} rounds\n",
            fraction.value(),
            config.population_size,
            rounds
        );
        println!("Committee   P(seat)        P(majority)    Observed   Majority");
        println!("{}", "-".repeat(66));

        for size in (min_size.max(1)..=max_size).step_by(step) {
            let params = CommitteeParameters::new(config.population_size, size)?;
            let model = CommitteeObservationModel::new(params, fraction);
            println!(
                "{:>9}   {:<13.6e}  {:<13.6e}  {:>8}   {:>8}",
                size,
                model.probability_at_least_one_adversarial_seat(),
                model.probability_majority(),
                model.expected_observed_rounds(rounds),
                model.expected_majority_rounds(rounds),
            );
        }
        Ok(())
    }

    fn run_min_committee(config: ScenarioConfig, max_probability: f64) -> Result<()> {
        let fraction = config.adversary.fraction(config.population_size)?;
        match min_committee_size_for_majority_bound(
            fraction,
            config.population_size,
            max_probability,
        )? {
            Some(size) => println!(
                "Smallest committee with P(majority) <= {max_probability:e}: \
                 {size} of {} nodes (adversary {:.4})",
                config.population_size,
                fraction.value()
            ),
            None => println!(
                "No committee of up to {} nodes keeps P(majority) <= {max_probability:e} \
                 against adversary {:.4}",
                config.population_size,
                fraction.value()
            ),
        }
        Ok(())
    }

    fn run_sweep(config: ScenarioConfig, fractions: &[f64], output: Option<PathBuf>) -> Result<()> {
        let base_seed = config.seed.unwrap_or_default();
        info!(
            scenarios = fractions.len(),
            seed = base_seed,
            "Sweeping adversary fractions"
        );

        let reports: Vec<ScenarioReport> = fractions
            .par_iter()
            .enumerate()
            .map(|(i, &fraction)| {
                let mut scenario = config.with_adversary(AdversaryStake::Fraction(fraction));
                scenario.seed = Some(base_seed.wrapping_add(i as u64));
                let mut rng = seeded_rng(&scenario);
                run_scenario(&scenario, SampledGaussianAccountant, &mut rng)
            })
            .collect::<std::result::Result<_, PrivacyError>>()?;

        println!("Adversary   Observed   Majority   Committee eps   Fed-learn eps");
        println!("{}", "-".repeat(66));
        for report in &reports {
            println!(
                "{:>9.3}   {:>8}   {:>8}   {:>13.4}   {:>13.4}",
                report.adversary_fraction,
                report.observed_rounds,
                report.majority_rounds,
                report.final_epsilon(),
                report.baseline_epsilon(),
            );
        }

        if let Some(path) = output {
            for report in &reports {
                append_summary_row(&path, &SummaryRow::from_report(report))?;
            }
            println!("\nSummary rows appended to {}", path.display());
        }
        Ok(())
    }

}

#[cfg(feature = "cli")]
fn main() -> anyhow::Result<()> {
    use clap::Parser;
    let cli = cli::Cli::parse();
    cli::run(cli)
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("This binary requires the 'cli' feature. Build with:");
    eprintln!("  cargo build -p bth-committee-privacy --features cli --bin committee-privacy-sim");
}
