//! Derived, display-ready groupings of live records.
//!
//! Boards are snapshots of derivation at one instant; rebuild them on every
//! tick or refetch instead of keeping them around.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::locate::{self, Bucket};
use crate::model::{Locate, Repair, Stage};
use crate::repair;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocateCard {
    pub id: String,
    pub work_order_number: String,
    pub bucket: Bucket,
    pub deadline: Option<DateTime<Utc>>,
    /// Countdown text; `None` for pending locates, which have no timer.
    pub remaining: Option<String>,
}

/// Live locates grouped into pending, in-progress and completed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocateBoard {
    pub at: Option<DateTime<Utc>>,
    pub pending: Vec<LocateCard>,
    pub in_progress: Vec<LocateCard>,
    pub completed: Vec<LocateCard>,
}

impl LocateBoard {
    #[must_use]
    pub fn build(records: &[Locate], now: DateTime<Utc>) -> Self {
        let buckets = locate::partition(records, now);
        let cards = |group: Vec<&Locate>, bucket: Bucket| -> Vec<LocateCard> {
            group
                .into_iter()
                .map(|record| LocateCard {
                    id: record.base.id.clone(),
                    work_order_number: record.base.work_order_number.clone(),
                    bucket,
                    deadline: locate::deadline(record),
                    remaining: (bucket != Bucket::Pending)
                        .then(|| locate::countdown(record, now)),
                })
                .collect()
        };

        Self {
            at: Some(now),
            pending: cards(buckets.pending, Bucket::Pending),
            in_progress: cards(buckets.in_progress, Bucket::InProgress),
            completed: cards(buckets.completed, Bucket::Completed),
        }
    }

    #[must_use]
    pub fn bucket(&self, bucket: Bucket) -> &[LocateCard] {
        match bucket {
            Bucket::Pending => &self.pending,
            Bucket::InProgress => &self.in_progress,
            Bucket::Completed => &self.completed,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len() + self.in_progress.len() + self.completed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepairCard {
    pub id: String,
    pub work_order_number: String,
    pub stage: Stage,
    /// Whole seconds in the current stage, if the entry instant is known.
    pub seconds_in_stage: Option<i64>,
    pub days_in_stage: Option<i64>,
    pub missing: Vec<String>,
}

/// Live repairs grouped by stage, in stage order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairBoard {
    pub at: Option<DateTime<Utc>>,
    pub stages: BTreeMap<Stage, Vec<RepairCard>>,
}

impl RepairBoard {
    #[must_use]
    pub fn build(records: &[Repair], now: DateTime<Utc>) -> Self {
        let mut stages: BTreeMap<Stage, Vec<RepairCard>> =
            Stage::ALL.iter().map(|stage| (*stage, Vec::new())).collect();

        for record in records.iter().filter(|r| !r.base.is_deleted) {
            let in_stage = repair::time_in_stage(record, now);
            let card = RepairCard {
                id: record.base.id.clone(),
                work_order_number: record.base.work_order_number.clone(),
                stage: record.stage,
                seconds_in_stage: in_stage.map(|d| d.num_seconds()),
                days_in_stage: in_stage.map(|d: TimeDelta| d.num_days()),
                missing: repair::missing(record),
            };
            stages.entry(record.stage).or_default().push(card);
        }

        Self {
            at: Some(now),
            stages,
        }
    }

    #[must_use]
    pub fn stage(&self, stage: Stage) -> &[RepairCard] {
        self.stages.get(&stage).map(Vec::as_slice).unwrap_or_default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
