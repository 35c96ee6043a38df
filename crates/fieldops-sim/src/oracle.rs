//! Invariant checks run after every simulated round.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use fieldops_core::board::{LocateBoard, RepairBoard};
use fieldops_core::locate::{self, Bucket};
use fieldops_core::selection::SelectionSet;
use fieldops_core::{BulkOutcome, Locate, Record, Repair, Stage};
use serde::{Deserialize, Serialize};

/// A broken lifecycle property, with enough context to replay it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum InvariantViolation {
    /// A binned record is shown on a board.
    DeletedOnBoard { resource: String, id: String },
    /// A locate left the completed bucket.
    CompletionReverted { id: String, now: Bucket },
    /// A repair went back a stage without a manual backward move.
    StageRegressed { id: String, from: Stage, to: Stage },
    /// A repair moved forward without stamping the stage it entered.
    MissingEntryDate { id: String, stage: Stage },
    /// Deletion flag and provenance disagree.
    ProvenanceInconsistent { resource: String, id: String },
    /// The view's snapshot and the store disagree on a record.
    SnapshotDiverged { resource: String, id: String },
    /// A succeeded id is still selected, or a failed id was dropped.
    SelectionMismatch { id: String, expected_selected: bool },
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DeletedOnBoard { resource, id } => {
                write!(f, "DeletedOnBoard: {resource}/{id} is binned but on the board")
            }
            Self::CompletionReverted { id, now } => {
                write!(f, "CompletionReverted: locates/{id} was completed, now {now}")
            }
            Self::StageRegressed { id, from, to } => {
                write!(f, "StageRegressed: repairs/{id} moved {from} -> {to} on its own")
            }
            Self::MissingEntryDate { id, stage } => {
                write!(f, "MissingEntryDate: repairs/{id} has no entry date for {stage}")
            }
            Self::ProvenanceInconsistent { resource, id } => {
                write!(f, "ProvenanceInconsistent: {resource}/{id}")
            }
            Self::SnapshotDiverged { resource, id } => {
                write!(f, "SnapshotDiverged: {resource}/{id} differs between view and store")
            }
            Self::SelectionMismatch {
                id,
                expected_selected,
            } => write!(
                f,
                "SelectionMismatch: {id} should{} be selected",
                if *expected_selected { "" } else { " not" }
            ),
        }
    }
}

/// Everything the oracle needs from one round.
#[derive(Debug)]
pub struct Observation<'a> {
    pub now: DateTime<Utc>,
    pub view_locates: &'a [Locate],
    pub store_locates: &'a [Locate],
    pub view_repairs: &'a [Repair],
    pub store_repairs: &'a [Repair],
    /// Repairs an operator moved backward this round.
    pub moved_back: &'a BTreeSet<String>,
    /// Last bulk action and the selection right after it.
    pub bulk: Option<(&'a BulkOutcome, &'a SelectionSet)>,
}

/// Memory across rounds: what was completed and where each repair stood.
///
/// Repairs seen for the first time are compared against `creation`.
#[derive(Debug, Clone, Default)]
pub struct LifecycleOracle {
    completed: BTreeSet<String>,
    stages: BTreeMap<String, Stage>,
}

impl LifecycleOracle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Check one round and remember its state for the next.
    pub fn observe(&mut self, obs: &Observation<'_>) -> Vec<InvariantViolation> {
        let mut violations = Vec::new();
        check_boards(obs, &mut violations);
        check_provenance(obs.store_locates, &mut violations);
        check_provenance(obs.store_repairs, &mut violations);
        check_snapshot(obs.view_locates, obs.store_locates, &mut violations);
        check_snapshot(obs.view_repairs, obs.store_repairs, &mut violations);
        if let Some((outcome, selection)) = obs.bulk {
            check_selection(outcome, selection, &mut violations);
        }
        self.check_completion(obs, &mut violations);
        self.check_stages(obs, &mut violations);
        violations
    }

    fn check_completion(&mut self, obs: &Observation<'_>, out: &mut Vec<InvariantViolation>) {
        let mut completed = BTreeSet::new();
        for record in obs.store_locates {
            let bucket = locate::classify(record, obs.now);
            if bucket == Bucket::Completed {
                completed.insert(record.base.id.clone());
            } else if self.completed.contains(&record.base.id) {
                out.push(InvariantViolation::CompletionReverted {
                    id: record.base.id.clone(),
                    now: bucket,
                });
            }
        }
        self.completed = completed;
    }

    fn check_stages(&mut self, obs: &Observation<'_>, out: &mut Vec<InvariantViolation>) {
        let mut stages = BTreeMap::new();
        for record in obs.store_repairs {
            let id = &record.base.id;
            let from = self.stages.get(id).copied().unwrap_or(Stage::Creation);
            if record.stage < from && !obs.moved_back.contains(id) {
                out.push(InvariantViolation::StageRegressed {
                    id: id.clone(),
                    from,
                    to: record.stage,
                });
            }
            if record.stage > from && !record.stage_entry_dates.contains_key(&record.stage) {
                out.push(InvariantViolation::MissingEntryDate {
                    id: id.clone(),
                    stage: record.stage,
                });
            }
            stages.insert(id.clone(), record.stage);
        }
        self.stages = stages;
    }
}

fn check_boards(obs: &Observation<'_>, out: &mut Vec<InvariantViolation>) {
    let binned_locates: BTreeSet<&str> = deleted_ids(obs.view_locates);
    let board = LocateBoard::build(obs.view_locates, obs.now);
    for card in [&board.pending, &board.in_progress, &board.completed]
        .into_iter()
        .flatten()
    {
        if binned_locates.contains(card.id.as_str()) {
            out.push(InvariantViolation::DeletedOnBoard {
                resource: Locate::RESOURCE.to_string(),
                id: card.id.clone(),
            });
        }
    }

    let binned_repairs: BTreeSet<&str> = deleted_ids(obs.view_repairs);
    let board = RepairBoard::build(obs.view_repairs, obs.now);
    for card in board.stages.values().flatten() {
        if binned_repairs.contains(card.id.as_str()) {
            out.push(InvariantViolation::DeletedOnBoard {
                resource: Repair::RESOURCE.to_string(),
                id: card.id.clone(),
            });
        }
    }
}

fn deleted_ids<R: Record>(records: &[R]) -> BTreeSet<&str> {
    records
        .iter()
        .filter(|r| r.is_deleted())
        .map(Record::id)
        .collect()
}

fn check_provenance<R: Record>(records: &[R], out: &mut Vec<InvariantViolation>) {
    for record in records {
        if !record.base().provenance_consistent() {
            out.push(InvariantViolation::ProvenanceInconsistent {
                resource: R::RESOURCE.to_string(),
                id: record.id().to_string(),
            });
        }
    }
}

fn check_snapshot<R: Record + PartialEq>(view: &[R], store: &[R], out: &mut Vec<InvariantViolation>) {
    let by_id: BTreeMap<&str, &R> = store.iter().map(|r| (r.id(), r)).collect();
    let mut seen = BTreeSet::new();
    for record in view {
        seen.insert(record.id());
        if by_id.get(record.id()) != Some(&record) {
            out.push(InvariantViolation::SnapshotDiverged {
                resource: R::RESOURCE.to_string(),
                id: record.id().to_string(),
            });
        }
    }
    for id in by_id.keys().filter(|id| !seen.contains(*id)) {
        out.push(InvariantViolation::SnapshotDiverged {
            resource: R::RESOURCE.to_string(),
            id: (*id).to_string(),
        });
    }
}

fn check_selection(
    outcome: &BulkOutcome,
    selection: &SelectionSet,
    out: &mut Vec<InvariantViolation>,
) {
    for id in &outcome.succeeded {
        if selection.contains(id) {
            out.push(InvariantViolation::SelectionMismatch {
                id: id.clone(),
                expected_selected: false,
            });
        }
    }
    for id in outcome.failed_ids() {
        if !selection.contains(id) {
            out.push(InvariantViolation::SelectionMismatch {
                id: id.to_string(),
                expected_selected: true,
            });
        }
    }
}
