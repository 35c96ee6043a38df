#![forbid(unsafe_code)]

use std::env;

use anyhow::{Result, bail};
use clap::Parser;
use fieldops_sim::campaign::{CampaignConfig, replay_seed, run_campaign};
use fieldops_sim::faults::FaultConfig;
use fieldops_sim::SimulationConfig;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Run deterministic lifecycle simulation campaigns.
#[derive(Debug, Parser)]
#[command(name = "fieldops-sim", version, about)]
struct Args {
    /// First seed of the campaign.
    #[arg(long, default_value_t = 0)]
    seed_start: u64,

    /// Number of seeds to run.
    #[arg(long, default_value_t = 100)]
    seeds: u64,

    /// Rounds per seed.
    #[arg(long, default_value_t = 40)]
    rounds: u64,

    /// Operator intents per round.
    #[arg(long, default_value_t = 4)]
    intents: usize,

    #[arg(long, default_value_t = 12)]
    locates: usize,

    #[arg(long, default_value_t = 8)]
    repairs: usize,

    /// Store failure rate for every call kind, in percent.
    #[arg(long, default_value_t = 10, value_parser = clap::value_parser!(u8).range(0..=100))]
    fault_percent: u8,

    /// Replay one seed and print its full trace as JSON.
    #[arg(long)]
    replay: Option<u64>,

    /// Print the campaign report as JSON.
    #[arg(long)]
    json: bool,
}

impl Args {
    fn campaign(&self) -> CampaignConfig {
        CampaignConfig {
            seed_range: self.seed_start..self.seed_start.saturating_add(self.seeds),
            template: SimulationConfig {
                locates: self.locates,
                repairs: self.repairs,
                rounds: self.rounds,
                intents_per_round: self.intents,
                faults: FaultConfig {
                    patch_failure_percent: self.fault_percent,
                    delete_failure_percent: self.fault_percent,
                    list_failure_percent: self.fault_percent / 2,
                },
                ..SimulationConfig::default()
            },
        }
    }
}

fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();
    let config = args.campaign();

    if let Some(seed) = args.replay {
        let result = replay_seed(seed, &config)?;
        println!("{}", serde_json::to_string_pretty(&result)?);
        if !result.passed() {
            bail!("seed {seed} violated {} invariant(s)", result.violations.len());
        }
        return Ok(());
    }

    let report = run_campaign(&config)?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "simulation complete: seeds={} passed={} interesting={} injected_faults={}",
            report.seeds_run,
            report.seeds_passed,
            report.interesting_states_reached,
            report.injected_faults
        );
        for failure in &report.failures {
            println!("seed {}:", failure.seed);
            for violation in &failure.violations {
                println!("  {violation}");
            }
        }
    }

    if let Some(seed) = report.first_failure {
        bail!("campaign failed; replay with --replay {seed}");
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("FIELDOPS_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "fieldops=debug,info"
        } else {
            "fieldops=info,warn"
        })
    });

    let format = env::var("FIELDOPS_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry.with(fmt::layer().compact().with_writer(std::io::stderr)).init();
        }
    }
}
