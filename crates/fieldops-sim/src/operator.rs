//! Simulated dispatch operators.
//!
//! Each round an operator looks at what the views currently show and picks
//! one intent. Most intents target live records; a few deliberately target
//! binned ones so the rejection paths get exercised too.

use fieldops_core::model::repair::{AS_BUILT_CREATION, DRAIN_FIELD_REPAIR, INSPECTION_RME_ON_FILE};
use fieldops_core::model::{AsBuiltCondition, StressTest};
use fieldops_core::{CallType, RepairEdit};
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Locates,
    Repairs,
}

/// One operator action, as recorded in the trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Intent {
    MarkCalled { id: String, call_type: CallType },
    CompleteLocate { id: String },
    EditRepair { id: String, edit: RepairEdit },
    CompleteItem { id: String, item: String },
    MoveForward { id: String },
    MoveBackward { id: String },
    SoftDelete { resource: Resource, ids: Vec<String> },
    Restore { resource: Resource, ids: Vec<String> },
    Purge { resource: Resource, ids: Vec<String> },
    Refresh { resource: Resource },
}

/// Ids currently visible to the operator.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Inventory {
    pub live_locates: Vec<String>,
    pub binned_locates: Vec<String>,
    pub live_repairs: Vec<String>,
    pub binned_repairs: Vec<String>,
}

impl Inventory {
    fn ids(&self, resource: Resource, binned: bool) -> &[String] {
        match (resource, binned) {
            (Resource::Locates, false) => &self.live_locates,
            (Resource::Locates, true) => &self.binned_locates,
            (Resource::Repairs, false) => &self.live_repairs,
            (Resource::Repairs, true) => &self.binned_repairs,
        }
    }

    fn any_id(&self, rng: &mut DeterministicRng, resource: Resource) -> Option<String> {
        // Mostly live records, sometimes a binned one.
        let binned = rng.chance(10) && !self.ids(resource, true).is_empty();
        rng.pick(self.ids(resource, binned)).cloned()
    }
}

/// Percent weights for each family of intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorMix {
    pub locate_percent: u8,
    pub bin_percent: u8,
    pub purge_percent: u8,
    pub manual_move_percent: u8,
}

impl Default for OperatorMix {
    fn default() -> Self {
        Self {
            locate_percent: 45,
            bin_percent: 15,
            purge_percent: 15,
            manual_move_percent: 10,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Operator {
    rng: DeterministicRng,
    mix: OperatorMix,
}

impl Operator {
    #[must_use]
    pub const fn new(rng: DeterministicRng, mix: OperatorMix) -> Self {
        Self { rng, mix }
    }

    /// Pick the next intent. `None` when nothing is left to act on.
    pub fn choose(&mut self, inventory: &Inventory) -> Option<Intent> {
        let rng = &mut self.rng;
        if rng.chance(self.mix.bin_percent) {
            return Self::bin_intent(rng, self.mix, inventory);
        }

        if rng.chance(self.mix.locate_percent) {
            let id = inventory.any_id(rng, Resource::Locates)?;
            return Some(if rng.chance(70) {
                let call_type = if rng.chance(30) {
                    CallType::Emergency
                } else {
                    CallType::Standard
                };
                Intent::MarkCalled { id, call_type }
            } else {
                Intent::CompleteLocate { id }
            });
        }

        let id = inventory.any_id(rng, Resource::Repairs)?;
        if rng.chance(self.mix.manual_move_percent) {
            return Some(if rng.chance(60) {
                Intent::MoveForward { id }
            } else {
                Intent::MoveBackward { id }
            });
        }
        if rng.chance(20) {
            let item = rng
                .pick(&[DRAIN_FIELD_REPAIR, AS_BUILT_CREATION, INSPECTION_RME_ON_FILE])
                .map_or_else(String::new, |item| (*item).to_string());
            return Some(Intent::CompleteItem { id, item });
        }
        Some(Intent::EditRepair {
            id,
            edit: random_edit(rng),
        })
    }

    fn bin_intent(
        rng: &mut DeterministicRng,
        mix: OperatorMix,
        inventory: &Inventory,
    ) -> Option<Intent> {
        let resource = if rng.chance(50) {
            Resource::Locates
        } else {
            Resource::Repairs
        };
        let live = inventory.ids(resource, false);
        let binned = inventory.ids(resource, true);

        if rng.chance(10) {
            return Some(Intent::Refresh { resource });
        }
        if !binned.is_empty() && rng.chance(50) {
            let ids = rng.sample(binned, 3);
            return Some(if rng.chance(mix.purge_percent) {
                Intent::Purge { resource, ids }
            } else {
                Intent::Restore { resource, ids }
            });
        }
        if live.is_empty() {
            return Some(Intent::Refresh { resource });
        }
        Some(Intent::SoftDelete {
            resource,
            ids: rng.sample(live, 3),
        })
    }
}

fn random_edit(rng: &mut DeterministicRng) -> RepairEdit {
    match rng.below(7) {
        0 => RepairEdit::StressTest(
            rng.pick(&[
                None,
                Some(StressTest::Passed),
                Some(StressTest::PassedWithRepairs),
                Some(StressTest::Failed),
            ])
            .copied()
            .flatten(),
        ),
        1 => RepairEdit::AsBuiltCondition(
            rng.pick(&[
                None,
                Some(AsBuiltCondition::MeetsCriteria),
                Some(AsBuiltCondition::Insufficient),
            ])
            .copied()
            .flatten(),
        ),
        2 => RepairEdit::RmeReport(tri_state(rng)),
        3 => RepairEdit::RmeInspectionFiled(tri_state(rng)),
        4 => RepairEdit::ReadyToSchedule(rng.chance(80)),
        5 => RepairEdit::WaterTightnessTest(rng.chance(80)),
        _ => RepairEdit::FollowUpReport(rng.chance(80)),
    }
}

fn tri_state(rng: &mut DeterministicRng) -> Option<bool> {
    match rng.below(4) {
        0 => None,
        1 => Some(false),
        _ => Some(true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inventory() -> Inventory {
        Inventory {
            live_locates: vec!["L-1".into(), "L-2".into()],
            binned_locates: vec!["L-3".into()],
            live_repairs: vec!["R-1".into()],
            binned_repairs: Vec::new(),
        }
    }

    #[test]
    fn same_seed_same_choices() {
        let mut a = Operator::new(DeterministicRng::new(5), OperatorMix::default());
        let mut b = Operator::new(DeterministicRng::new(5), OperatorMix::default());
        for _ in 0..100 {
            assert_eq!(a.choose(&inventory()), b.choose(&inventory()));
        }
    }

    #[test]
    fn empty_inventory_yields_only_refreshes() {
        let mut operator = Operator::new(DeterministicRng::new(1), OperatorMix::default());
        for _ in 0..100 {
            if let Some(intent) = operator.choose(&Inventory::default()) {
                assert!(matches!(intent, Intent::Refresh { .. }), "{intent:?}");
            }
        }
    }

    #[test]
    fn intents_serialize_with_kind_tag() {
        let intent = Intent::EditRepair {
            id: "R-1".into(),
            edit: RepairEdit::ReadyToSchedule(true),
        };
        let json = serde_json::to_string(&intent).unwrap();
        assert!(json.contains("\"kind\":\"edit_repair\""));
        assert!(json.contains("\"field\":\"ready_to_schedule\""));
    }
}
