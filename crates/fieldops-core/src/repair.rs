//! Repair stage engine.
//!
//! Stages run `creation -> permitting -> approved -> testing -> completed`,
//! with `more_work` as a side branch off `creation` for jobs whose intake
//! checklist fails. Automatic transitions advance at most one stage and never
//! move backward. Checklist and completion rules are conditions checked by
//! [`evaluate`]; `permitting -> approved` and `approved -> testing` fire only
//! on the edit that sets their flag, so a flag left set from an earlier visit
//! does not push a record forward again. Manual moves bypass the checklist
//! entirely.
//!
//! `stage_entry_dates` is append-only: the first visit to a stage is
//! recorded and later visits keep the original stamp.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Action, ErrorCode, TransitionRejected};
use crate::model::repair::{AS_BUILT_CREATION, DRAIN_FIELD_REPAIR, INSPECTION_RME_ON_FILE};
use crate::model::{AsBuiltCondition, Repair, Stage, StressTest};

pub const READY_TO_SCHEDULE: &str = "Ready To Schedule";
pub const WATER_TIGHTNESS_TEST: &str = "Water Tightness Test";
pub const FOLLOW_UP_REPORT: &str = "Follow Up Report";

/// A single field edit an operator can make on a repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "field", content = "value", rename_all = "snake_case")]
pub enum RepairEdit {
    StressTest(Option<StressTest>),
    AsBuiltCondition(Option<AsBuiltCondition>),
    RmeReport(Option<bool>),
    RmeInspectionFiled(Option<bool>),
    ReadyToSchedule(bool),
    WaterTightnessTest(bool),
    FollowUpReport(bool),
    PermitSubmittedDate(Option<DateTime<Utc>>),
}

impl RepairEdit {
    /// Whether this edit can trigger an automatic transition.
    #[must_use]
    pub const fn is_relevant(&self) -> bool {
        !matches!(self, Self::PermitSubmittedDate(_))
    }
}

/// A stage change, automatic or manual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageChange {
    pub from: Stage,
    pub to: Stage,
}

/// Intake checklist labels that currently fail, in checklist order.
///
/// Unanswered questions do not fail.
#[must_use]
pub fn checklist_failures(repair: &Repair) -> Vec<&'static str> {
    let mut failing = Vec::new();
    if repair.stress_test == Some(StressTest::Failed) {
        failing.push(DRAIN_FIELD_REPAIR);
    }
    if repair.as_built_condition == Some(AsBuiltCondition::Insufficient) {
        failing.push(AS_BUILT_CREATION);
    }
    if repair.rme_report == Some(false) || repair.rme_inspection_filed == Some(false) {
        failing.push(INSPECTION_RME_ON_FILE);
    }
    failing
}

/// Whether every intake check is answered and passing.
#[must_use]
pub fn checklist_passes(repair: &Repair) -> bool {
    repair.stress_test.is_some_and(StressTest::is_passing)
        && repair.as_built_condition == Some(AsBuiltCondition::MeetsCriteria)
        && repair.rme_report == Some(true)
        && repair.rme_inspection_filed == Some(true)
}

/// Intake checklist labels not yet passing, answered or not.
fn checklist_unmet(repair: &Repair) -> Vec<&'static str> {
    let mut unmet = Vec::new();
    if !repair.stress_test.is_some_and(StressTest::is_passing) {
        unmet.push(DRAIN_FIELD_REPAIR);
    }
    if repair.as_built_condition != Some(AsBuiltCondition::MeetsCriteria) {
        unmet.push(AS_BUILT_CREATION);
    }
    if repair.rme_report != Some(true) || repair.rme_inspection_filed != Some(true) {
        unmet.push(INSPECTION_RME_ON_FILE);
    }
    unmet
}

/// Run the condition-based transition rules once.
///
/// First matching rule wins; at most one stage is advanced.
pub fn evaluate(repair: &mut Repair, now: DateTime<Utc>) -> Option<StageChange> {
    let from = repair.stage;
    let to = match from {
        Stage::Creation | Stage::MoreWork => {
            let failing = checklist_failures(repair);
            if !failing.is_empty() {
                let labels = failing.into_iter().map(str::to_string);
                if from == Stage::Creation {
                    repair.needed_items = labels.collect();
                } else {
                    for label in labels {
                        if !repair.needed_items.contains(&label) {
                            repair.needed_items.push(label);
                        }
                    }
                }
                Stage::MoreWork
            } else if checklist_passes(repair)
                && (from == Stage::Creation || repair.needed_items.is_empty())
            {
                Stage::Permitting
            } else {
                from
            }
        }
        Stage::Testing if repair.water_tightness_test && repair.follow_up_report => {
            Stage::Completed
        }
        _ => from,
    };

    (to != from).then(|| advance(repair, to, now))
}

fn advance(repair: &mut Repair, to: Stage, now: DateTime<Utc>) -> StageChange {
    let from = repair.stage;
    enter(repair, to, now);
    debug!(id = %repair.base.id, %from, %to, "automatic stage transition");
    StageChange { from, to }
}

/// Apply one field edit and re-evaluate.
///
/// # Errors
///
/// Rejects edits on deleted records.
pub fn apply_edit(
    repair: &mut Repair,
    edit: RepairEdit,
    now: DateTime<Utc>,
) -> Result<Option<StageChange>, TransitionRejected> {
    ensure_live(repair, Action::Edit)?;
    let relevant = edit.is_relevant();
    let triggered = match (repair.stage, &edit) {
        (Stage::Permitting, RepairEdit::ReadyToSchedule(true)) => Some(Stage::Approved),
        (
            Stage::Approved,
            RepairEdit::WaterTightnessTest(true) | RepairEdit::FollowUpReport(true),
        ) => Some(Stage::Testing),
        _ => None,
    };
    match edit {
        RepairEdit::StressTest(value) => repair.stress_test = value,
        RepairEdit::AsBuiltCondition(value) => repair.as_built_condition = value,
        RepairEdit::RmeReport(value) => repair.rme_report = value,
        RepairEdit::RmeInspectionFiled(value) => repair.rme_inspection_filed = value,
        RepairEdit::ReadyToSchedule(value) => repair.ready_to_schedule = value,
        RepairEdit::WaterTightnessTest(value) => repair.water_tightness_test = value,
        RepairEdit::FollowUpReport(value) => repair.follow_up_report = value,
        RepairEdit::PermitSubmittedDate(value) => repair.permit_submitted_date = value,
    }
    Ok(match triggered {
        Some(to) => Some(advance(repair, to, now)),
        None if relevant => evaluate(repair, now),
        None => None,
    })
}

/// Tick off one outstanding needed item and re-evaluate.
///
/// Completing an item that is not outstanding changes nothing.
///
/// # Errors
///
/// Rejects deleted records.
pub fn complete_needed_item(
    repair: &mut Repair,
    item: &str,
    now: DateTime<Utc>,
) -> Result<Option<StageChange>, TransitionRejected> {
    ensure_live(repair, Action::CompleteItem)?;
    let before = repair.needed_items.len();
    repair.needed_items.retain(|outstanding| outstanding != item);
    if repair.needed_items.len() == before {
        debug!(id = %repair.base.id, item, "needed item not outstanding");
        return Ok(None);
    }
    Ok(evaluate(repair, now))
}

/// Manual move one stage forward, bypassing the checklist.
///
/// # Errors
///
/// Rejects deleted records and `completed`, which has no forward stage.
pub fn move_forward(
    repair: &mut Repair,
    now: DateTime<Utc>,
) -> Result<StageChange, TransitionRejected> {
    ensure_live(repair, Action::MoveForward)?;
    let from = repair.stage;
    let Some(to) = from.next() else {
        return Err(TransitionRejected::new(
            &repair.base.id,
            Action::MoveForward,
            ErrorCode::InvalidStageTransition,
            "completed has no forward stage",
        ));
    };
    enter(repair, to, now);
    Ok(StageChange { from, to })
}

/// Manual move one stage back. Entry dates are kept.
///
/// # Errors
///
/// Rejects deleted records and `creation`, which has no earlier stage.
pub fn move_backward(repair: &mut Repair) -> Result<StageChange, TransitionRejected> {
    ensure_live(repair, Action::MoveBackward)?;
    let from = repair.stage;
    let Some(to) = from.previous() else {
        return Err(TransitionRejected::new(
            &repair.base.id,
            Action::MoveBackward,
            ErrorCode::InvalidStageTransition,
            "creation has no earlier stage",
        ));
    };
    repair.stage = to;
    Ok(StageChange { from, to })
}

/// What still blocks the repair in its current stage.
#[must_use]
pub fn missing(repair: &Repair) -> Vec<String> {
    match repair.stage {
        Stage::Creation | Stage::MoreWork => {
            let mut items: Vec<String> = checklist_unmet(repair)
                .into_iter()
                .map(str::to_string)
                .collect();
            for item in &repair.needed_items {
                if !items.contains(item) {
                    items.push(item.clone());
                }
            }
            items
        }
        Stage::Permitting => {
            if repair.ready_to_schedule {
                Vec::new()
            } else {
                vec![READY_TO_SCHEDULE.to_string()]
            }
        }
        Stage::Approved | Stage::Testing => {
            let mut items = Vec::new();
            if !repair.water_tightness_test {
                items.push(WATER_TIGHTNESS_TEST.to_string());
            }
            if !repair.follow_up_report {
                items.push(FOLLOW_UP_REPORT.to_string());
            }
            items
        }
        Stage::Completed => Vec::new(),
    }
}

/// Time spent in the current stage at `now`.
#[must_use]
pub fn time_in_stage(repair: &Repair, now: DateTime<Utc>) -> Option<TimeDelta> {
    repair.current_stage_entered_at().map(|entered| now - entered)
}

fn enter(repair: &mut Repair, stage: Stage, now: DateTime<Utc>) {
    repair.stage = stage;
    repair.stage_entry_dates.entry(stage).or_insert(now);
    match stage {
        Stage::Approved => {
            repair.approved_date.get_or_insert(now);
        }
        Stage::Completed => {
            repair.completion_date.get_or_insert(now);
        }
        _ => {}
    }
}

fn ensure_live(repair: &Repair, action: Action) -> Result<(), TransitionRejected> {
    if repair.base.is_deleted {
        return Err(TransitionRejected::new(
            &repair.base.id,
            action,
            ErrorCode::RecordDeleted,
            "record is in the recycle bin",
        ));
    }
    Ok(())
}
