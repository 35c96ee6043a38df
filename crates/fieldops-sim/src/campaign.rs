//! Campaign runner for deterministic simulation campaigns.
//!
//! Executes many seeds with shared parameters, collecting pass/fail results
//! and the first failing seed for replay.

use std::ops::Range;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::faults::FaultConfig;
use crate::{SimulationConfig, SimulationResult, Simulator};

/// Campaign-level configuration: which seeds, and the per-seed template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignConfig {
    /// Range of seeds to execute, e.g., `0..100`.
    pub seed_range: Range<u64>,
    /// Everything but the seed.
    pub template: SimulationConfig,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            seed_range: 0..50,
            template: SimulationConfig::default(),
        }
    }
}

impl CampaignConfig {
    #[must_use]
    pub fn sim_config_for_seed(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            ..self.template.clone()
        }
    }

    /// Same campaign with the store never failing.
    #[must_use]
    pub fn without_faults(mut self) -> Self {
        self.template.faults = FaultConfig::none();
        self
    }

    /// # Errors
    ///
    /// Returns an error if the seed range is empty or the template is invalid.
    pub fn validate(&self) -> Result<()> {
        if self.seed_range.is_empty() {
            bail!("seed_range must not be empty");
        }
        self.template.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedFailure {
    pub seed: u64,
    pub violations: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignReport {
    pub seeds_run: usize,
    pub seeds_passed: usize,
    /// First seed that failed (for prioritized replay).
    pub first_failure: Option<u64>,
    pub failures: Vec<SeedFailure>,
    /// Seeds that saw at least one partially failed bulk action.
    pub interesting_states_reached: usize,
    pub injected_faults: usize,
}

impl CampaignReport {
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run every seed in the config.
///
/// # Errors
///
/// Returns an error if config validation fails or a simulation cannot be
/// built.
pub fn run_campaign(config: &CampaignConfig) -> Result<CampaignReport> {
    config.validate()?;
    let mut report = CampaignReport::default();

    for seed in config.seed_range.clone() {
        let result = replay_seed(seed, config)?;
        report.seeds_run += 1;
        report.injected_faults += result.stats.injected_faults;
        if result.interesting_state_reached {
            report.interesting_states_reached += 1;
        }

        if result.passed() {
            report.seeds_passed += 1;
            continue;
        }
        warn!(seed, violations = result.violations.len(), "seed failed");
        report.first_failure.get_or_insert(seed);
        report.failures.push(SeedFailure {
            seed,
            violations: result
                .violations
                .iter()
                .map(|v| format!("round {}: {}", v.round, v.violation))
                .collect(),
        });
    }

    Ok(report)
}

/// Run one seed with full trace details.
///
/// # Errors
///
/// Returns an error when the simulation cannot be built.
pub fn replay_seed(seed: u64, config: &CampaignConfig) -> Result<SimulationResult> {
    let mut simulator = Simulator::new(config.sim_config_for_seed(seed))?;
    simulator.run()
}
