use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{fmt, str::FromStr};

use super::{ParseEnumError, Record, WorkOrder, normalize};
use crate::ingest::{self, IngestError, WireRepair};
use crate::time::OperatingZone;

/// Needed-item label for a failed stress test.
pub const DRAIN_FIELD_REPAIR: &str = "Drain Field Repair";
/// Needed-item label for an insufficient as-built drawing.
pub const AS_BUILT_CREATION: &str = "As-Built Creation";
/// Needed-item label for a missing or uninspected RME report.
pub const INSPECTION_RME_ON_FILE: &str = "Inspection RME On File";

/// The six repair stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Creation,
    MoreWork,
    Permitting,
    Approved,
    Testing,
    Completed,
}

impl Stage {
    pub const ALL: [Self; 6] = [
        Self::Creation,
        Self::MoreWork,
        Self::Permitting,
        Self::Approved,
        Self::Testing,
        Self::Completed,
    ];

    const fn as_str(self) -> &'static str {
        match self {
            Self::Creation => "creation",
            Self::MoreWork => "more_work",
            Self::Permitting => "permitting",
            Self::Approved => "approved",
            Self::Testing => "testing",
            Self::Completed => "completed",
        }
    }

    /// Position in the stage order, `creation = 0` through `completed = 5`.
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Creation => 0,
            Self::MoreWork => 1,
            Self::Permitting => 2,
            Self::Approved => 3,
            Self::Testing => 4,
            Self::Completed => 5,
        }
    }

    /// The stage one step forward, if any.
    #[must_use]
    pub const fn next(self) -> Option<Self> {
        match self {
            Self::Creation => Some(Self::MoreWork),
            Self::MoreWork => Some(Self::Permitting),
            Self::Permitting => Some(Self::Approved),
            Self::Approved => Some(Self::Testing),
            Self::Testing => Some(Self::Completed),
            Self::Completed => None,
        }
    }

    /// The stage one step back, if any.
    #[must_use]
    pub const fn previous(self) -> Option<Self> {
        match self {
            Self::Creation => None,
            Self::MoreWork => Some(Self::Creation),
            Self::Permitting => Some(Self::MoreWork),
            Self::Approved => Some(Self::Permitting),
            Self::Testing => Some(Self::Approved),
            Self::Completed => Some(Self::Testing),
        }
    }

    /// Whether the creation checklist governs this stage.
    #[must_use]
    pub const fn is_intake(self) -> bool {
        matches!(self, Self::Creation | Self::MoreWork)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Stage {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "creation" => Ok(Self::Creation),
            "morework" => Ok(Self::MoreWork),
            "permitting" => Ok(Self::Permitting),
            "approved" => Ok(Self::Approved),
            "testing" => Ok(Self::Testing),
            "completed" => Ok(Self::Completed),
            _ => Err(ParseEnumError {
                expected: "stage",
                got: s.to_string(),
            }),
        }
    }
}

/// Outcome of the tank stress test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StressTest {
    Passed,
    PassedWithRepairs,
    Failed,
}

impl StressTest {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::PassedWithRepairs => "passed_with_repairs",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_passing(self) -> bool {
        matches!(self, Self::Passed | Self::PassedWithRepairs)
    }
}

impl fmt::Display for StressTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StressTest {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "passed" | "pass" => Ok(Self::Passed),
            "passedwithrepairs" | "passwithrepairs" | "conditionalpass" => {
                Ok(Self::PassedWithRepairs)
            }
            "failed" | "fail" => Ok(Self::Failed),
            _ => Err(ParseEnumError {
                expected: "stress test result",
                got: s.to_string(),
            }),
        }
    }
}

/// Assessment of the site's as-built drawing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AsBuiltCondition {
    MeetsCriteria,
    Insufficient,
}

impl AsBuiltCondition {
    const fn as_str(self) -> &'static str {
        match self {
            Self::MeetsCriteria => "meets_criteria",
            Self::Insufficient => "insufficient",
        }
    }
}

impl fmt::Display for AsBuiltCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AsBuiltCondition {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match normalize(s).as_str() {
            "meetscriteria" | "meets" => Ok(Self::MeetsCriteria),
            "insufficient" => Ok(Self::Insufficient),
            _ => Err(ParseEnumError {
                expected: "as-built condition",
                got: s.to_string(),
            }),
        }
    }
}

/// A septic-tank repair job.
///
/// Checklist answers are tri-state: `None` means "not answered yet", which is
/// neither passing nor failing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Repair {
    #[serde(flatten)]
    pub base: WorkOrder,
    pub stage: Stage,
    /// First entry instant per stage. Entries are never overwritten.
    pub stage_entry_dates: BTreeMap<Stage, DateTime<Utc>>,
    pub stress_test: Option<StressTest>,
    pub as_built_condition: Option<AsBuiltCondition>,
    pub rme_report: Option<bool>,
    pub rme_inspection_filed: Option<bool>,
    pub needed_items: Vec<String>,
    pub ready_to_schedule: bool,
    pub water_tightness_test: bool,
    pub follow_up_report: bool,
    pub permit_submitted_date: Option<DateTime<Utc>>,
    pub approved_date: Option<DateTime<Utc>>,
    pub completion_date: Option<DateTime<Utc>>,
}

impl Default for Repair {
    fn default() -> Self {
        Self {
            base: WorkOrder::default(),
            stage: Stage::Creation,
            stage_entry_dates: BTreeMap::new(),
            stress_test: None,
            as_built_condition: None,
            rme_report: None,
            rme_inspection_filed: None,
            needed_items: Vec::new(),
            ready_to_schedule: false,
            water_tightness_test: false,
            follow_up_report: false,
            permit_submitted_date: None,
            approved_date: None,
            completion_date: None,
        }
    }
}

impl Repair {
    /// A repair in `creation` with only its identity set.
    #[must_use]
    pub fn new(id: impl Into<String>, work_order_number: impl Into<String>) -> Self {
        Self {
            base: WorkOrder::new(id, work_order_number),
            ..Self::default()
        }
    }

    /// When the record entered its current stage.
    ///
    /// `creation` falls back to the record's creation instant.
    #[must_use]
    pub fn current_stage_entered_at(&self) -> Option<DateTime<Utc>> {
        let entered = self.stage_entry_dates.get(&self.stage).copied();
        match self.stage {
            Stage::Creation => entered.or(self.base.created_at),
            _ => entered,
        }
    }
}

impl Record for Repair {
    const RESOURCE: &'static str = "repairs";

    type Wire = WireRepair;

    fn from_wire(wire: WireRepair, zone: &OperatingZone) -> Result<Self, IngestError> {
        ingest::resolve_repair(wire, zone)
    }

    fn base(&self) -> &WorkOrder {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WorkOrder {
        &mut self.base
    }
}

#[cfg(test)]
mod tests {
    use super::{AsBuiltCondition, Repair, Stage, StressTest};
    use chrono::{TimeZone, Utc};
    use std::str::FromStr;

    #[test]
    fn stage_order_is_total() {
        for window in Stage::ALL.windows(2) {
            assert!(window[0] < window[1]);
            assert_eq!(window[0].next(), Some(window[1]));
            assert_eq!(window[1].previous(), Some(window[0]));
            assert_eq!(window[0].index() + 1, window[1].index());
        }
        assert_eq!(Stage::Completed.next(), None);
        assert_eq!(Stage::Creation.previous(), None);
    }

    #[test]
    fn stage_text_accepts_both_spellings() {
        assert_eq!(Stage::from_str("moreWork").unwrap(), Stage::MoreWork);
        assert_eq!(Stage::from_str("more_work").unwrap(), Stage::MoreWork);
        assert_eq!(Stage::MoreWork.to_string(), "more_work");
        assert!(Stage::from_str("closed").is_err());
    }

    #[test]
    fn checklist_values_parse() {
        assert_eq!(StressTest::from_str("FAILED").unwrap(), StressTest::Failed);
        assert!(StressTest::from_str("passed_with_repairs").unwrap().is_passing());
        assert!(!StressTest::Failed.is_passing());
        assert_eq!(
            AsBuiltCondition::from_str("meets_criteria").unwrap(),
            AsBuiltCondition::MeetsCriteria
        );
        assert!(AsBuiltCondition::from_str("ok").is_err());
    }

    #[test]
    fn stage_entry_dates_serialize_as_object() {
        let mut repair = Repair::new("R-1", "WO-77");
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 16, 0, 0).unwrap();
        repair.stage = Stage::MoreWork;
        repair.stage_entry_dates.insert(Stage::MoreWork, at);

        let value = serde_json::to_value(&repair).unwrap();
        assert_eq!(value["stage"], "more_work");
        assert_eq!(value["stage_entry_dates"]["more_work"], "2024-03-01T16:00:00Z");

        let back: Repair = serde_json::from_value(value).unwrap();
        assert_eq!(back, repair);
    }

    #[test]
    fn creation_entry_falls_back_to_created_at() {
        let mut repair = Repair::new("R-2", "WO-78");
        assert_eq!(repair.current_stage_entered_at(), None);
        let created = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        repair.base.created_at = Some(created);
        assert_eq!(repair.current_stage_entered_at(), Some(created));

        repair.stage = Stage::Permitting;
        assert_eq!(repair.current_stage_entered_at(), None);
    }
}
