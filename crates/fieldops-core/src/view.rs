//! A mounted list of one record kind.
//!
//! The view owns the last fetched snapshot, its [`SelectionSet`] and its
//! subscribers. Every mutation is decided locally by the engine, sent to the
//! store as a [`Patch`], and mirrored into the snapshot once the store
//! accepts it. Classification is never cached: boards are derived from the
//! snapshot at the instant they are asked for.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use crossbeam::channel::{self, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::board::{LocateBoard, RepairBoard};
use crate::clock::Clock;
use crate::config::EngineConfig;
use crate::error::{EngineError, StoreError, TransitionRejected};
use crate::locate::{self, RemarkPolicy};
use crate::model::{CallType, Locate, Record, Repair};
use crate::patch::Patch;
use crate::recycle::{self, BulkOutcome, RecycleBin};
use crate::repair::{self, RepairEdit, StageChange};
use crate::repo::Repository;
use crate::selection::SelectionSet;
use crate::ticker::Ticker;

/// Change notifications for view subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    /// A fresh snapshot was loaded.
    Refreshed { count: usize, at: DateTime<Utc> },
    /// One record changed.
    Mutated { id: String },
    /// One record left the collection for good.
    Removed { id: String },
    /// Timer displays should be re-rendered.
    Tick { at: DateTime<Utc> },
}

/// Timing knobs for a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewConfig {
    pub stale_after: TimeDelta,
    pub refetch_after: TimeDelta,
    pub tick_interval: Duration,
    pub remark: RemarkPolicy,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ViewConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            stale_after: config.stale_after(),
            refetch_after: config.refetch_after(),
            tick_interval: config.tick_interval(),
            remark: config.locate.remark,
        }
    }
}

/// Fan-out of view events to any number of subscribers.
#[derive(Debug, Clone, Default)]
struct Broadcaster {
    subscribers: Arc<Mutex<Vec<Sender<ViewEvent>>>>,
}

impl Broadcaster {
    fn subscribe(&self) -> Receiver<ViewEvent> {
        let (tx, rx) = channel::unbounded();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    fn send(&self, event: &ViewEvent) {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Dropped receivers unsubscribe.
        subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

pub struct ListView<R, S> {
    store: S,
    clock: Arc<dyn Clock>,
    config: ViewConfig,
    records: Vec<R>,
    fetched_at: Option<DateTime<Utc>>,
    selection: SelectionSet,
    events: Broadcaster,
}

impl<R: Record, S: Repository<R>> ListView<R, S> {
    pub fn new(store: S, clock: Arc<dyn Clock>, config: ViewConfig) -> Self {
        Self {
            store,
            clock,
            config,
            records: Vec::new(),
            fetched_at: None,
            selection: SelectionSet::new(),
            events: Broadcaster::default(),
        }
    }

    /// Refetch the whole collection.
    ///
    /// The selection is left alone. On failure the previous snapshot stays.
    ///
    /// # Errors
    ///
    /// Returns the store's listing failure.
    pub fn refresh(&mut self) -> Result<usize, StoreError> {
        let records = self.store.list()?;
        let at = self.clock.now();
        let count = records.len();
        self.records = records;
        self.fetched_at = Some(at);
        debug!(resource = R::RESOURCE, count, "refreshed");
        self.events.send(&ViewEvent::Refreshed { count, at });
        Ok(count)
    }

    /// Refetch only when the forced-refetch interval has elapsed.
    ///
    /// # Errors
    ///
    /// Returns the store's listing failure.
    pub fn refresh_if_due(&mut self) -> Result<bool, StoreError> {
        if self.needs_refetch(self.clock.now()) {
            self.refresh()?;
            return Ok(true);
        }
        Ok(false)
    }

    /// The snapshot is older than the staleness tolerance.
    #[must_use]
    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.age_exceeds(now, self.config.stale_after)
    }

    /// The snapshot is old enough that it must be refetched.
    #[must_use]
    pub fn needs_refetch(&self, now: DateTime<Utc>) -> bool {
        self.age_exceeds(now, self.config.refetch_after)
    }

    fn age_exceeds(&self, now: DateTime<Utc>, limit: TimeDelta) -> bool {
        self.fetched_at.is_none_or(|at| now - at >= limit)
    }

    #[must_use]
    pub const fn fetched_at(&self) -> Option<DateTime<Utc>> {
        self.fetched_at
    }

    /// Every record in the snapshot, deleted ones included.
    #[must_use]
    pub fn records(&self) -> &[R] {
        &self.records
    }

    /// Records outside the recycle bin.
    pub fn active(&self) -> impl Iterator<Item = &R> {
        recycle::live(&self.records)
    }

    /// Records in the recycle bin.
    pub fn binned(&self) -> impl Iterator<Item = &R> {
        recycle::binned(&self.records)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&R> {
        self.records.iter().find(|r| r.id() == id)
    }

    #[must_use]
    pub const fn selection(&self) -> &SelectionSet {
        &self.selection
    }

    pub const fn selection_mut(&mut self) -> &mut SelectionSet {
        &mut self.selection
    }

    #[must_use]
    pub fn subscribe(&self) -> Receiver<ViewEvent> {
        self.events.subscribe()
    }

    /// Start the display tick for this view.
    ///
    /// Subscribers receive [`ViewEvent::Tick`] every tick interval until the
    /// returned handle is cancelled or dropped.
    #[must_use]
    pub fn start_ticker(&self) -> Ticker {
        let events = self.events.clone();
        let clock = Arc::clone(&self.clock);
        Ticker::spawn(self.config.tick_interval, move || {
            events.send(&ViewEvent::Tick { at: clock.now() });
        })
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Run an engine decision on a copy of one record and persist the diff.
    fn mutate<T>(
        &mut self,
        id: &str,
        decide: impl FnOnce(&mut R, DateTime<Utc>) -> Result<T, TransitionRejected>,
    ) -> Result<T, EngineError> {
        let index = self
            .records
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| EngineError::UnknownRecord {
                resource: R::RESOURCE,
                id: id.to_string(),
            })?;

        let now = self.clock.now();
        let mut next = self.records[index].clone();
        let result = decide(&mut next, now)?;

        let patch =
            Patch::diff(&self.records[index], &next).map_err(|err| EngineError::Patch {
                resource: R::RESOURCE,
                id: id.to_string(),
                message: err.to_string(),
            })?;
        if patch.is_empty() {
            return Ok(result);
        }

        self.store.patch(id, &patch)?;
        info!(resource = R::RESOURCE, id, fields = patch.len(), "record updated");
        self.records[index] = next;
        self.events.send(&ViewEvent::Mutated { id: id.to_string() });
        Ok(result)
    }

    /// Soft-delete `ids`, then drop the succeeded ones from the selection.
    ///
    /// Ids already in the bin, or not in the snapshot, fail without a
    /// request and stay selected.
    pub fn soft_delete(&mut self, ids: &[String], actor: &str) -> BulkOutcome {
        let now = self.clock.now();
        let outcome =
            RecycleBin::<R, S>::new(&self.store).soft_delete_many(&self.records, ids, actor, now);
        for id in &outcome.succeeded {
            if let Some(record) = self.records.iter_mut().find(|r| r.id() == id) {
                recycle::mark_deleted(record, actor, now);
            }
        }
        self.settle(&outcome, false);
        outcome
    }

    /// Restore `ids` from the bin. Live ids fail without a request.
    pub fn restore(&mut self, ids: &[String]) -> BulkOutcome {
        let outcome = RecycleBin::<R, S>::new(&self.store).restore_many(&self.records, ids);
        for id in &outcome.succeeded {
            if let Some(record) = self.records.iter_mut().find(|r| r.id() == id) {
                recycle::mark_restored(record);
            }
        }
        self.settle(&outcome, false);
        outcome
    }

    /// Permanently delete `ids`.
    pub fn purge(&mut self, ids: &[String]) -> BulkOutcome {
        let outcome = RecycleBin::<R, S>::new(&self.store).purge_many(ids);
        self.records
            .retain(|r| !outcome.succeeded.iter().any(|id| id == r.id()));
        self.settle(&outcome, true);
        outcome
    }

    pub fn soft_delete_selected(&mut self, actor: &str) -> BulkOutcome {
        let ids = self.selection.to_vec();
        self.soft_delete(&ids, actor)
    }

    pub fn restore_selected(&mut self) -> BulkOutcome {
        let ids = self.selection.to_vec();
        self.restore(&ids)
    }

    pub fn purge_selected(&mut self) -> BulkOutcome {
        let ids = self.selection.to_vec();
        self.purge(&ids)
    }

    fn settle(&mut self, outcome: &BulkOutcome, removed: bool) {
        self.selection.apply_outcome(outcome);
        for id in &outcome.succeeded {
            let event = if removed {
                ViewEvent::Removed { id: id.clone() }
            } else {
                ViewEvent::Mutated { id: id.clone() }
            };
            self.events.send(&event);
        }
        if outcome.is_partial() {
            warn!(
                resource = R::RESOURCE,
                failed = ?outcome.failed_ids().collect::<Vec<_>>(),
                "bulk action partially failed"
            );
        }
    }
}

impl<S: Repository<Locate>> ListView<Locate, S> {
    /// Mark a pending locate as called by `actor`.
    ///
    /// Returns whether anything changed.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Rejected`] for invalid transitions and
    /// [`EngineError::Store`] when the update fails.
    pub fn mark_called(
        &mut self,
        id: &str,
        call_type: CallType,
        actor: &str,
    ) -> Result<bool, EngineError> {
        let policy = self.config.remark;
        self.mutate(id, |record, now| {
            locate::mark_called(record, call_type, actor, now, policy)
        })
    }

    /// Force a locate into the completed bucket.
    ///
    /// # Errors
    ///
    /// Same as [`ListView::mark_called`].
    pub fn complete(&mut self, id: &str) -> Result<bool, EngineError> {
        self.mutate(id, |record, _| locate::complete(record))
    }

    #[must_use]
    pub fn board(&self) -> LocateBoard {
        LocateBoard::build(&self.records, self.clock.now())
    }
}

impl<S: Repository<Repair>> ListView<Repair, S> {
    /// Apply a checklist or flag edit, with any automatic transition.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Rejected`] for deleted records and
    /// [`EngineError::Store`] when the update fails.
    pub fn edit(&mut self, id: &str, edit: RepairEdit) -> Result<Option<StageChange>, EngineError> {
        self.mutate(id, |record, now| repair::apply_edit(record, edit, now))
    }

    /// Tick off a needed item.
    ///
    /// # Errors
    ///
    /// Same as [`ListView::edit`].
    pub fn complete_item(
        &mut self,
        id: &str,
        item: &str,
    ) -> Result<Option<StageChange>, EngineError> {
        self.mutate(id, |record, now| {
            repair::complete_needed_item(record, item, now)
        })
    }

    /// Manual forward move.
    ///
    /// # Errors
    ///
    /// Same as [`ListView::edit`], plus rejection at `completed`.
    pub fn move_forward(&mut self, id: &str) -> Result<StageChange, EngineError> {
        self.mutate(id, repair::move_forward)
    }

    /// Manual backward move.
    ///
    /// # Errors
    ///
    /// Same as [`ListView::edit`], plus rejection at `creation`.
    pub fn move_backward(&mut self, id: &str) -> Result<StageChange, EngineError> {
        self.mutate(id, |record, _| repair::move_backward(record))
    }

    #[must_use]
    pub fn board(&self) -> RepairBoard {
        RepairBoard::build(&self.records, self.clock.now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::error::ErrorCode;
    use crate::model::Stage;
    use crate::repo::MemoryStore;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 15, 0, 0).unwrap()
    }

    fn locate_view(
        records: Vec<Locate>,
    ) -> (
        ListView<Locate, Arc<MemoryStore<Locate>>>,
        Arc<MemoryStore<Locate>>,
        Arc<ManualClock>,
    ) {
        let store = Arc::new(MemoryStore::new(records));
        let clock = Arc::new(ManualClock::new(t0()));
        let mut view = ListView::new(
            Arc::clone(&store),
            Arc::clone(&clock) as Arc<dyn Clock>,
            ViewConfig::default(),
        );
        view.refresh().unwrap();
        (view, store, clock)
    }

    #[test]
    fn staleness_follows_polling_intervals() {
        let (view, _, clock) = locate_view(vec![]);
        assert!(!view.is_stale(clock.now()));
        clock.advance(TimeDelta::seconds(30));
        assert!(view.is_stale(clock.now()));
        assert!(!view.needs_refetch(clock.now()));
        clock.advance(TimeDelta::seconds(30));
        assert!(view.needs_refetch(clock.now()));
    }

    #[test]
    fn unfetched_view_is_stale() {
        let store = MemoryStore::<Locate>::default();
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(t0()));
        let view = ListView::new(store, clock, ViewConfig::default());
        assert!(view.is_stale(t0()));
        assert!(view.needs_refetch(t0()));
    }

    #[test]
    fn mark_called_persists_and_notifies() {
        let (mut view, store, _) = locate_view(vec![Locate::new("L-1", "WO-1")]);
        let events = view.subscribe();

        assert!(view.mark_called("L-1", CallType::Emergency, "tech").unwrap());
        let stored = store.get("L-1").unwrap();
        assert!(stored.locates_called);
        assert_eq!(stored.called_at, Some(t0()));
        assert_eq!(view.get("L-1").unwrap(), &stored);
        assert_eq!(
            events.try_recv().unwrap(),
            ViewEvent::Mutated {
                id: "L-1".to_string()
            }
        );
    }

    #[test]
    fn rejected_intent_sends_nothing() {
        let (mut view, store, _) = locate_view(vec![Locate::new("L-1", "WO-1")]);
        view.mark_called("L-1", CallType::Standard, "tech").unwrap();
        let before = store.get("L-1").unwrap();

        let err = view
            .mark_called("L-1", CallType::Emergency, "tech")
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::AlreadyCalled);
        assert_eq!(store.get("L-1").unwrap(), before);
    }

    #[test]
    fn unknown_id_is_reported() {
        let (mut view, _, _) = locate_view(vec![]);
        let err = view.complete("L-404").unwrap_err();
        assert_eq!(err.code(), ErrorCode::RecordNotFound);
    }

    #[test]
    fn store_failure_leaves_snapshot_unchanged() {
        let (mut view, store, _) = locate_view(vec![Locate::new("L-1", "WO-1")]);
        store.fail_on("L-1");
        let err = view.complete("L-1").unwrap_err();
        assert!(matches!(err, EngineError::Store(_)));
        assert!(!view.get("L-1").unwrap().timer_expired);
    }

    #[test]
    fn refresh_keeps_selection() {
        let (mut view, _, _) = locate_view(vec![Locate::new("L-1", "WO-1")]);
        view.selection_mut().toggle("L-1");
        view.refresh().unwrap();
        assert!(view.selection().contains("L-1"));
    }

    #[test]
    fn purge_removes_from_snapshot() {
        let (mut view, store, _) = locate_view(vec![Locate::new("L-1", "WO-1")]);
        let events = view.subscribe();
        let outcome = view.purge(&["L-1".to_string()]);
        assert!(outcome.is_success());
        assert!(view.records().is_empty());
        assert!(store.is_empty());
        assert_eq!(
            events.try_recv().unwrap(),
            ViewEvent::Removed {
                id: "L-1".to_string()
            }
        );
    }

    #[test]
    fn repair_moves_go_through_the_store() {
        let store = Arc::new(MemoryStore::new(vec![Repair::new("R-1", "WO-1")]));
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(t0()));
        let mut view = ListView::new(Arc::clone(&store), clock, ViewConfig::default());
        view.refresh().unwrap();

        let change = view.move_forward("R-1").unwrap();
        assert_eq!(change.to, Stage::MoreWork);
        let stored = store.get("R-1").unwrap();
        assert_eq!(stored.stage, Stage::MoreWork);
        assert_eq!(stored.stage_entry_dates.get(&Stage::MoreWork), Some(&t0()));

        view.move_backward("R-1").unwrap();
        assert_eq!(store.get("R-1").unwrap().stage, Stage::Creation);
    }

    #[test]
    fn ticker_broadcasts_ticks() {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(t0()));
        let config = ViewConfig {
            tick_interval: Duration::from_millis(5),
            ..ViewConfig::default()
        };
        let view = ListView::new(MemoryStore::<Locate>::default(), clock, config);
        let events = view.subscribe();

        let ticker = view.start_ticker();
        let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
        ticker.cancel();
        assert_eq!(event, ViewEvent::Tick { at: t0() });
    }
}
