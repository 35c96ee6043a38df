//! fieldops-sim library.
//!
//! Drives the lifecycle engine with seeded operators, a simulated wall clock
//! and a store that fails on purpose, then checks lifecycle invariants after
//! every round. A seed fully determines a run.
//!
//! # Conventions
//!
//! - **Errors**: Use `anyhow::Result` for return types.
//! - **Logging**: Use `tracing` macros (`info!`, `warn!`, `debug!`, `trace!`).

pub mod campaign;
pub mod clock;
pub mod faults;
pub mod operator;
pub mod oracle;
pub mod rng;

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Result, bail};
use chrono::{DateTime, TimeDelta, Utc};
use fieldops_core::model::{CallType, Locate, Repair};
use fieldops_core::repo::Repository;
use fieldops_core::{BulkOutcome, EngineError, ListView, Record, StageChange, ViewConfig};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::clock::{ClockConfig, SimulatedClock};
use crate::faults::{FaultConfig, FlakyStore};
use crate::operator::{Intent, Inventory, Operator, OperatorMix, Resource};
use crate::oracle::{InvariantViolation, LifecycleOracle, Observation};
use crate::rng::DeterministicRng;

type LocateView = ListView<Locate, Arc<FlakyStore<Locate>>>;
type RepairView = ListView<Repair, Arc<FlakyStore<Repair>>>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub seed: u64,
    pub locates: usize,
    pub repairs: usize,
    pub rounds: u64,
    pub intents_per_round: usize,
    pub faults: FaultConfig,
    pub clock: ClockConfig,
    pub mix: OperatorMix,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            locates: 12,
            repairs: 8,
            rounds: 40,
            intents_per_round: 4,
            faults: FaultConfig::default(),
            clock: ClockConfig::default(),
            mix: OperatorMix::default(),
        }
    }
}

impl SimulationConfig {
    /// # Errors
    ///
    /// Returns an error if any parameter is out of valid range.
    pub fn validate(&self) -> Result<()> {
        if self.locates + self.repairs == 0 {
            bail!("at least one locate or repair is required");
        }
        if self.rounds == 0 {
            bail!("rounds must be > 0");
        }
        if self.intents_per_round == 0 {
            bail!("intents_per_round must be > 0");
        }
        if self.clock.step_millis <= 0 {
            bail!("clock step_millis must be > 0");
        }
        Ok(())
    }
}

/// What became of one intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum StepOutcome {
    Applied { changed: bool },
    Transition { from: String, to: String },
    Rejected { code: String },
    StoreFailed { code: String },
    Bulk { succeeded: usize, failed: Vec<String> },
    Refreshed { count: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub round: u64,
    pub at: DateTime<Utc>,
    pub intent: Intent,
    pub outcome: StepOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimStats {
    pub applied: usize,
    pub transitions: usize,
    pub rejected: usize,
    pub store_failures: usize,
    pub partial_bulk: usize,
    pub injected_faults: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundViolation {
    pub round: u64,
    pub violation: InvariantViolation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationResult {
    pub seed: u64,
    pub trace: Vec<TraceEvent>,
    pub violations: Vec<RoundViolation>,
    pub stats: SimStats,
    /// At least one bulk action partially failed, the state the retry path
    /// exists for.
    pub interesting_state_reached: bool,
}

impl SimulationResult {
    #[must_use]
    pub fn passed(&self) -> bool {
        self.violations.is_empty()
    }
}

pub struct Simulator {
    config: SimulationConfig,
    rng: DeterministicRng,
    clock: SimulatedClock,
    operator: Operator,
    locate_store: Arc<FlakyStore<Locate>>,
    repair_store: Arc<FlakyStore<Repair>>,
    locates: LocateView,
    repairs: RepairView,
    oracle: LifecycleOracle,
    step: u64,
}

impl Simulator {
    /// Build the initial world for `config.seed`.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid config or when the initial fetch
    /// fails.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let root = DeterministicRng::new(config.seed);
        let mut seed_rng = root.fork(1);
        let clock = SimulatedClock::new(config.clock);
        let start = clock.now();

        let locate_store = Arc::new(FlakyStore::new(
            seed_locates(&mut seed_rng, config.locates, start),
            config.faults,
            config.seed,
        ));
        let repair_store = Arc::new(FlakyStore::new(
            seed_repairs(config.repairs, start),
            config.faults,
            config.seed.rotate_left(32),
        ));

        let view_config = ViewConfig::default();
        let mut locates = ListView::new(Arc::clone(&locate_store), clock.handle(), view_config);
        let mut repairs = ListView::new(Arc::clone(&repair_store), clock.handle(), view_config);

        locate_store.set_armed(false);
        repair_store.set_armed(false);
        locates.refresh()?;
        repairs.refresh()?;
        locate_store.set_armed(true);
        repair_store.set_armed(true);

        Ok(Self {
            operator: Operator::new(root.fork(2), config.mix),
            rng: root.fork(3),
            config,
            clock,
            locate_store,
            repair_store,
            locates,
            repairs,
            oracle: LifecycleOracle::new(),
            step: 0,
        })
    }

    /// Run every round.
    ///
    /// # Errors
    ///
    /// Invariant violations are reported in the result, not as errors; this
    /// currently never fails once the simulator is built.
    pub fn run(&mut self) -> Result<SimulationResult> {
        let mut trace = Vec::new();
        let mut violations = Vec::new();
        let mut stats = SimStats::default();

        for round in 0..self.config.rounds {
            let mut moved_back = BTreeSet::new();
            let mut last_bulk: Option<(Resource, BulkOutcome)> = None;

            for _ in 0..self.config.intents_per_round {
                let Some(intent) = self.operator.choose(&self.inventory()) else {
                    continue;
                };
                self.step += 1;
                self.locate_store.begin_step(self.step);
                self.repair_store.begin_step(self.step);

                if let Intent::MoveBackward { id } = &intent {
                    moved_back.insert(id.clone());
                }
                let (outcome, bulk) = self.apply(&intent);
                tally(&mut stats, &outcome, bulk.as_ref().map(|(_, o)| o));
                if bulk.is_some() {
                    last_bulk = bulk;
                }
                debug!(round, ?intent, ?outcome, "step");
                trace.push(TraceEvent {
                    round,
                    at: self.clock.now(),
                    intent,
                    outcome,
                });
            }

            let found = self.check_round(&moved_back, last_bulk.as_ref());
            violations.extend(
                found
                    .into_iter()
                    .map(|violation| RoundViolation { round, violation }),
            );
            self.clock.tick(&mut self.rng);
        }

        stats.injected_faults = self.locate_store.injected() + self.repair_store.injected();
        info!(
            seed = self.config.seed,
            steps = trace.len(),
            violations = violations.len(),
            "simulation finished"
        );

        Ok(SimulationResult {
            seed: self.config.seed,
            interesting_state_reached: stats.partial_bulk > 0,
            trace,
            violations,
            stats,
        })
    }

    fn inventory(&self) -> Inventory {
        Inventory {
            live_locates: ids(self.locates.active()),
            binned_locates: ids(self.locates.binned()),
            live_repairs: ids(self.repairs.active()),
            binned_repairs: ids(self.repairs.binned()),
        }
    }

    fn apply(&mut self, intent: &Intent) -> (StepOutcome, Option<(Resource, BulkOutcome)>) {
        let single = match intent {
            Intent::MarkCalled { id, call_type } => self
                .locates
                .mark_called(id, *call_type, "sim-operator")
                .map(|changed| StepOutcome::Applied { changed }),
            Intent::CompleteLocate { id } => self
                .locates
                .complete(id)
                .map(|changed| StepOutcome::Applied { changed }),
            Intent::EditRepair { id, edit } => self
                .repairs
                .edit(id, edit.clone())
                .map(transition_or_applied),
            Intent::CompleteItem { id, item } => self
                .repairs
                .complete_item(id, item)
                .map(transition_or_applied),
            Intent::MoveForward { id } => self
                .repairs
                .move_forward(id)
                .map(|change| transition_or_applied(Some(change))),
            Intent::MoveBackward { id } => self
                .repairs
                .move_backward(id)
                .map(|change| transition_or_applied(Some(change))),
            Intent::Refresh { resource } => {
                let refreshed = match resource {
                    Resource::Locates => self.locates.refresh(),
                    Resource::Repairs => self.repairs.refresh(),
                };
                refreshed
                    .map(|count| StepOutcome::Refreshed { count })
                    .map_err(EngineError::from)
            }
            Intent::SoftDelete { resource, ids }
            | Intent::Restore { resource, ids }
            | Intent::Purge { resource, ids } => {
                let outcome = self.bulk(intent, *resource, ids);
                let step = StepOutcome::Bulk {
                    succeeded: outcome.succeeded.len(),
                    failed: outcome.failed_ids().map(str::to_string).collect(),
                };
                return (step, Some((*resource, outcome)));
            }
        };

        let outcome = single.unwrap_or_else(|err| match err {
            EngineError::Store(err) => StepOutcome::StoreFailed {
                code: err.code().code().to_string(),
            },
            other => StepOutcome::Rejected {
                code: other.code().code().to_string(),
            },
        });
        (outcome, None)
    }

    fn bulk(&mut self, intent: &Intent, resource: Resource, ids: &[String]) -> BulkOutcome {
        match resource {
            Resource::Locates => run_bulk_intent(&mut self.locates, intent, ids),
            Resource::Repairs => run_bulk_intent(&mut self.repairs, intent, ids),
        }
    }

    fn check_round(
        &mut self,
        moved_back: &BTreeSet<String>,
        last_bulk: Option<&(Resource, BulkOutcome)>,
    ) -> Vec<InvariantViolation> {
        let store_locates = self.locate_store.snapshot();
        let store_repairs = self.repair_store.snapshot();
        let bulk = last_bulk.map(|(resource, outcome)| {
            let selection = match resource {
                Resource::Locates => self.locates.selection(),
                Resource::Repairs => self.repairs.selection(),
            };
            (outcome, selection)
        });

        self.oracle.observe(&Observation {
            now: self.clock.now(),
            view_locates: self.locates.records(),
            store_locates: &store_locates,
            view_repairs: self.repairs.records(),
            store_repairs: &store_repairs,
            moved_back,
            bulk,
        })
    }
}

fn ids<'a, R: Record>(records: impl Iterator<Item = &'a R>) -> Vec<String> {
    records.map(|record| record.id().to_string()).collect()
}

fn run_bulk_intent<R, S>(view: &mut ListView<R, S>, intent: &Intent, ids: &[String]) -> BulkOutcome
where
    R: Record,
    S: Repository<R>,
{
    let selection = view.selection_mut();
    selection.clear();
    for id in ids {
        selection.toggle(id);
    }
    match intent {
        Intent::Restore { .. } => view.restore_selected(),
        Intent::Purge { .. } => view.purge_selected(),
        _ => view.soft_delete_selected("sim-admin"),
    }
}

fn transition_or_applied(change: Option<StageChange>) -> StepOutcome {
    change.map_or(StepOutcome::Applied { changed: false }, |change| {
        StepOutcome::Transition {
            from: change.from.to_string(),
            to: change.to.to_string(),
        }
    })
}

fn tally(stats: &mut SimStats, outcome: &StepOutcome, bulk: Option<&BulkOutcome>) {
    match outcome {
        StepOutcome::Applied { .. } | StepOutcome::Refreshed { .. } => stats.applied += 1,
        StepOutcome::Transition { .. } => {
            stats.applied += 1;
            stats.transitions += 1;
        }
        StepOutcome::Rejected { .. } => stats.rejected += 1,
        StepOutcome::StoreFailed { .. } => stats.store_failures += 1,
        StepOutcome::Bulk { failed, .. } => {
            stats.applied += 1;
            stats.store_failures += failed.len();
            if bulk.is_some_and(BulkOutcome::is_partial) {
                stats.partial_bulk += 1;
            }
        }
    }
}

fn seed_locates(rng: &mut DeterministicRng, count: usize, start: DateTime<Utc>) -> Vec<Locate> {
    (0..count)
        .map(|i| {
            let mut locate = Locate::new(format!("L-{i:03}"), format!("WO-{}", 5000 + i));
            locate.base.created_at = Some(start);
            // A third start out already called, some of those already late.
            if rng.chance(33) {
                let hours_ago = i64::try_from(rng.below(60)).unwrap_or(0);
                locate.locates_called = true;
                locate.call_type = Some(if rng.chance(40) {
                    CallType::Emergency
                } else {
                    CallType::Standard
                });
                locate.called_at = Some(start - TimeDelta::hours(hours_ago));
                locate.called_by = Some("dispatch".to_string());
            }
            locate
        })
        .collect()
}

fn seed_repairs(count: usize, start: DateTime<Utc>) -> Vec<Repair> {
    (0..count)
        .map(|i| {
            let mut repair = Repair::new(format!("R-{i:03}"), format!("WO-{}", 7000 + i));
            repair.base.created_at = Some(start);
            repair
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet(seed: u64) -> SimulationConfig {
        SimulationConfig {
            seed,
            rounds: 20,
            faults: FaultConfig::none(),
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn fault_free_run_passes() {
        let result = Simulator::new(quiet(1)).unwrap().run().unwrap();
        assert!(result.passed(), "{:?}", result.violations);
        assert!(!result.trace.is_empty());
        assert_eq!(result.stats.injected_faults, 0);
        assert_eq!(result.stats.store_failures, 0);
    }

    #[test]
    fn faulty_run_still_holds_invariants() {
        let config = SimulationConfig {
            seed: 11,
            faults: FaultConfig {
                patch_failure_percent: 30,
                delete_failure_percent: 30,
                list_failure_percent: 30,
            },
            ..SimulationConfig::default()
        };
        let result = Simulator::new(config).unwrap().run().unwrap();
        assert!(result.passed(), "{:?}", result.violations);
        assert!(result.stats.injected_faults > 0);
    }

    #[test]
    fn runs_are_reproducible() {
        let config = SimulationConfig {
            seed: 99,
            ..SimulationConfig::default()
        };
        let a = Simulator::new(config.clone()).unwrap().run().unwrap();
        let b = Simulator::new(config).unwrap().run().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = SimulationConfig {
            rounds: 0,
            ..SimulationConfig::default()
        };
        assert!(Simulator::new(config).is_err());
    }
}
