use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use fieldops_core::model::repair::{AS_BUILT_CREATION, DRAIN_FIELD_REPAIR, INSPECTION_RME_ON_FILE};
use fieldops_core::model::{AsBuiltCondition, CallType, Locate, Repair, Stage, StressTest};
use fieldops_core::repair::RepairEdit;
use proptest::prelude::*;

/// Instants between 2020 and 2030, second resolution.
pub fn arb_instant() -> impl Strategy<Value = DateTime<Utc>> + Clone {
    (1_577_836_800i64..1_893_456_000).prop_map(|secs| Utc.timestamp_opt(secs, 0).unwrap())
}

pub fn arb_delta() -> impl Strategy<Value = TimeDelta> + Clone {
    (0i64..10 * 24 * 3600).prop_map(TimeDelta::seconds)
}

pub fn arb_call_type() -> impl Strategy<Value = CallType> + Clone {
    prop_oneof![Just(CallType::Standard), Just(CallType::Emergency)]
}

pub fn arb_locate(index: usize) -> impl Strategy<Value = Locate> {
    (
        any::<bool>(),
        proptest::option::of(arb_call_type()),
        proptest::option::of(arb_instant()),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(
            move |(called, call_type, called_at, timer_expired, deleted)| {
                let mut locate = Locate::new(format!("L-{index}"), format!("WO-{index}"));
                locate.locates_called = called;
                locate.call_type = call_type;
                locate.called_at = called_at;
                locate.timer_expired = timer_expired;
                locate.base.is_deleted = deleted;
                locate
            },
        )
}

pub fn arb_locates() -> impl Strategy<Value = Vec<Locate>> {
    (0usize..40).prop_flat_map(|len| (0..len).map(arb_locate).collect::<Vec<_>>())
}

pub fn arb_stage() -> impl Strategy<Value = Stage> + Clone {
    proptest::sample::select(Stage::ALL.to_vec())
}

pub fn arb_stress_test() -> impl Strategy<Value = Option<StressTest>> + Clone {
    proptest::option::of(prop_oneof![
        Just(StressTest::Passed),
        Just(StressTest::PassedWithRepairs),
        Just(StressTest::Failed),
    ])
}

pub fn arb_as_built() -> impl Strategy<Value = Option<AsBuiltCondition>> + Clone {
    proptest::option::of(prop_oneof![
        Just(AsBuiltCondition::MeetsCriteria),
        Just(AsBuiltCondition::Insufficient),
    ])
}

pub fn arb_needed_items() -> impl Strategy<Value = Vec<String>> + Clone {
    proptest::sample::subsequence(
        vec![DRAIN_FIELD_REPAIR, AS_BUILT_CREATION, INSPECTION_RME_ON_FILE],
        0..=3,
    )
    .prop_map(|items| items.into_iter().map(str::to_string).collect())
}

pub fn arb_repair() -> impl Strategy<Value = Repair> {
    (
        arb_stage(),
        arb_stress_test(),
        arb_as_built(),
        proptest::option::of(any::<bool>()),
        proptest::option::of(any::<bool>()),
        arb_needed_items(),
        (any::<bool>(), any::<bool>(), any::<bool>()),
        arb_instant(),
    )
        .prop_map(
            |(stage, stress, as_built, rme, filed, needed, flags, entered)| {
                let mut repair = Repair::new("R-1", "WO-1");
                repair.stage = stage;
                repair.stage_entry_dates.insert(stage, entered);
                repair.stress_test = stress;
                repair.as_built_condition = as_built;
                repair.rme_report = rme;
                repair.rme_inspection_filed = filed;
                repair.needed_items = needed;
                (
                    repair.ready_to_schedule,
                    repair.water_tightness_test,
                    repair.follow_up_report,
                ) = flags;
                repair
            },
        )
}

pub fn arb_edit() -> impl Strategy<Value = RepairEdit> {
    prop_oneof![
        arb_stress_test().prop_map(RepairEdit::StressTest),
        arb_as_built().prop_map(RepairEdit::AsBuiltCondition),
        proptest::option::of(any::<bool>()).prop_map(RepairEdit::RmeReport),
        proptest::option::of(any::<bool>()).prop_map(RepairEdit::RmeInspectionFiled),
        any::<bool>().prop_map(RepairEdit::ReadyToSchedule),
        any::<bool>().prop_map(RepairEdit::WaterTightnessTest),
        any::<bool>().prop_map(RepairEdit::FollowUpReport),
        proptest::option::of(arb_instant()).prop_map(RepairEdit::PermitSubmittedDate),
    ]
}

/// An operator step that is not a manual stage move.
#[derive(Debug, Clone)]
pub enum AutoStep {
    Edit(RepairEdit),
    CompleteItem(&'static str),
}

pub fn arb_auto_steps() -> impl Strategy<Value = Vec<AutoStep>> {
    prop::collection::vec(
        prop_oneof![
            3 => arb_edit().prop_map(AutoStep::Edit),
            1 => proptest::sample::select(vec![
                DRAIN_FIELD_REPAIR,
                AS_BUILT_CREATION,
                INSPECTION_RME_ON_FILE,
            ])
            .prop_map(AutoStep::CompleteItem),
        ],
        0..30,
    )
}
