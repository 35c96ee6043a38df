//! Recycle bin: soft delete, restore and permanent delete.
//!
//! Semantics are identical for locates and repairs. Soft delete stamps the
//! deletion provenance and leaves every other field alone, so a repair keeps
//! its stage and a locate keeps its call state. Restore clears only the
//! deletion fields: a locate that was in progress when deleted comes back in
//! progress, not pending.
//!
//! Soft delete only applies to live records and restore only to binned ones.
//! Both are checked against the caller's snapshot before anything is sent,
//! so a second delete cannot overwrite the original deletion provenance.
//! Permanent delete applies to either.
//!
//! Bulk forms issue one request per id on a bounded worker pool and wait for
//! all of them. There is no rollback: each id succeeds or fails on its own,
//! and the [`BulkOutcome`] says which.

use std::marker::PhantomData;
use std::thread;

use chrono::{DateTime, Utc};
use crossbeam::channel;
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::error::{Action, EngineError, ErrorCode, StoreError, TransitionRejected};
use crate::model::Record;
use crate::patch::Patch;
use crate::repo::Repository;

/// Most requests a bulk action keeps in flight at once.
pub const MAX_BULK_WORKERS: usize = 8;

/// One id a bulk action failed on: rejected locally or failed in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkFailure {
    pub id: String,
    pub error: EngineError,
}

/// Per-id result of a bulk action, in request order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkOutcome {
    pub succeeded: Vec<String>,
    pub failed: Vec<BulkFailure>,
}

impl BulkOutcome {
    /// Every id succeeded (vacuously true for an empty request).
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Some ids succeeded and some failed.
    #[must_use]
    pub fn is_partial(&self) -> bool {
        !self.succeeded.is_empty() && !self.failed.is_empty()
    }

    /// Nothing succeeded and at least one id failed.
    #[must_use]
    pub fn is_total_failure(&self) -> bool {
        self.succeeded.is_empty() && !self.failed.is_empty()
    }

    pub fn failed_ids(&self) -> impl Iterator<Item = &str> {
        self.failed.iter().map(|failure| failure.id.as_str())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Fields written by a soft delete.
#[must_use]
pub fn soft_delete_patch(actor: &str, now: DateTime<Utc>) -> Patch {
    Patch::new()
        .with("is_deleted", json!(true))
        .with("deleted_by", json!(actor))
        .with("deleted_at", json!(now))
}

/// Fields written by a restore.
///
/// Only the deletion fields are reset. A restored locate keeps its call
/// state, so one that was called before binning comes back mid-timer or
/// completed.
#[must_use]
pub fn restore_patch() -> Patch {
    Patch::new()
        .with("is_deleted", json!(false))
        .with("deleted_by", Value::Null)
        .with("deleted_at", Value::Null)
}

/// Soft-delete a record in place.
pub fn mark_deleted<R: Record>(record: &mut R, actor: &str, now: DateTime<Utc>) {
    let base = record.base_mut();
    base.is_deleted = true;
    base.deleted_by = Some(actor.to_string());
    base.deleted_at = Some(now);
}

/// Restore a record in place.
pub fn mark_restored<R: Record>(record: &mut R) {
    let base = record.base_mut();
    base.is_deleted = false;
    base.deleted_by = None;
    base.deleted_at = None;
}

/// Records currently in the bin.
pub fn binned<'a, R: Record>(records: &'a [R]) -> impl Iterator<Item = &'a R> + 'a {
    records.iter().filter(|r| r.is_deleted())
}

/// Records not in the bin.
pub fn live<'a, R: Record>(records: &'a [R]) -> impl Iterator<Item = &'a R> + 'a {
    records.iter().filter(|r| !r.is_deleted())
}

/// A record may be soft-deleted only while it is live.
///
/// # Errors
///
/// Rejects records already in the bin.
pub fn ensure_deletable<R: Record>(record: &R) -> Result<(), TransitionRejected> {
    if record.is_deleted() {
        return Err(TransitionRejected::new(
            record.id(),
            Action::SoftDelete,
            ErrorCode::RecordDeleted,
            "record is already in the recycle bin",
        ));
    }
    Ok(())
}

/// A record may be restored only from the bin.
///
/// # Errors
///
/// Rejects live records.
pub fn ensure_restorable<R: Record>(record: &R) -> Result<(), TransitionRejected> {
    if !record.is_deleted() {
        return Err(TransitionRejected::new(
            record.id(),
            Action::Restore,
            ErrorCode::NotDeleted,
            "record is not in the recycle bin",
        ));
    }
    Ok(())
}

fn lookup<'a, R: Record>(snapshot: &'a [R], id: &str) -> Result<&'a R, EngineError> {
    snapshot
        .iter()
        .find(|r| r.id() == id)
        .ok_or_else(|| EngineError::UnknownRecord {
            resource: R::RESOURCE,
            id: id.to_string(),
        })
}

/// Recycle-bin operations for one resource over a repository.
pub struct RecycleBin<'s, R, S> {
    store: &'s S,
    _record: PhantomData<fn() -> R>,
}

impl<'s, R: Record, S: Repository<R>> RecycleBin<'s, R, S> {
    #[must_use]
    pub const fn new(store: &'s S) -> Self {
        Self {
            store,
            _record: PhantomData,
        }
    }

    /// Move one live record to the bin.
    ///
    /// # Errors
    ///
    /// Rejects a record already in the bin without calling the store;
    /// otherwise returns the store failure.
    pub fn soft_delete(
        &self,
        record: &R,
        actor: &str,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        ensure_deletable(record)?;
        let id = record.id();
        self.store.patch(id, &soft_delete_patch(actor, now))?;
        info!(resource = R::RESOURCE, id, actor, "soft-deleted");
        Ok(())
    }

    /// Return one binned record to its collection.
    ///
    /// # Errors
    ///
    /// Rejects a live record without calling the store; otherwise returns
    /// the store failure.
    pub fn restore(&self, record: &R) -> Result<(), EngineError> {
        ensure_restorable(record)?;
        let id = record.id();
        self.store.patch(id, &restore_patch())?;
        info!(resource = R::RESOURCE, id, "restored");
        Ok(())
    }

    /// Remove one record for good.
    ///
    /// # Errors
    ///
    /// Returns the store failure for `id`.
    pub fn purge(&self, id: &str) -> Result<(), StoreError> {
        self.store.delete(id)?;
        info!(resource = R::RESOURCE, id, "permanently deleted");
        Ok(())
    }

    /// Soft-delete `ids`, checked against `snapshot`.
    ///
    /// Ids missing from the snapshot or already binned fail without a
    /// request.
    pub fn soft_delete_many<I: AsRef<str> + Sync>(
        &self,
        snapshot: &[R],
        ids: &[I],
        actor: &str,
        now: DateTime<Utc>,
    ) -> BulkOutcome {
        let patch = soft_delete_patch(actor, now);
        let outcome = run_bulk(ids, |id| {
            ensure_deletable(lookup(snapshot, id)?)?;
            self.store.patch(id, &patch).map_err(EngineError::from)
        });
        log_outcome(R::RESOURCE, "soft-delete", &outcome);
        outcome
    }

    /// Restore `ids`, checked against `snapshot`.
    pub fn restore_many<I: AsRef<str> + Sync>(&self, snapshot: &[R], ids: &[I]) -> BulkOutcome {
        let patch = restore_patch();
        let outcome = run_bulk(ids, |id| {
            ensure_restorable(lookup(snapshot, id)?)?;
            self.store.patch(id, &patch).map_err(EngineError::from)
        });
        log_outcome(R::RESOURCE, "restore", &outcome);
        outcome
    }

    pub fn purge_many<I: AsRef<str> + Sync>(&self, ids: &[I]) -> BulkOutcome {
        let outcome = run_bulk(ids, |id| self.store.delete(id).map_err(EngineError::from));
        log_outcome(R::RESOURCE, "permanent-delete", &outcome);
        outcome
    }
}

/// Run `op` for every id on at most [`MAX_BULK_WORKERS`] threads and collect
/// per-id results.
///
/// Results come back in the order of `ids` regardless of completion order.
pub fn run_bulk<I, F>(ids: &[I], op: F) -> BulkOutcome
where
    I: AsRef<str> + Sync,
    F: Fn(&str) -> Result<(), EngineError> + Sync,
{
    let (job_tx, job_rx) = channel::unbounded();
    for job in ids.iter().enumerate() {
        let _ = job_tx.send(job);
    }
    drop(job_tx);

    let (tx, rx) = channel::unbounded();
    thread::scope(|scope| {
        for _ in 0..ids.len().min(MAX_BULK_WORKERS) {
            let job_rx = job_rx.clone();
            let tx = tx.clone();
            let op = &op;
            scope.spawn(move || {
                for (index, id) in job_rx {
                    let id = id.as_ref();
                    let _ = tx.send((index, id.to_string(), op(id)));
                }
            });
        }
    });
    drop(tx);

    let mut results: Vec<_> = rx.iter().collect();
    results.sort_by_key(|(index, _, _)| *index);

    let mut outcome = BulkOutcome::default();
    for (_, id, result) in results {
        match result {
            Ok(()) => outcome.succeeded.push(id),
            Err(error) => outcome.failed.push(BulkFailure { id, error }),
        }
    }
    outcome
}

fn log_outcome(resource: &'static str, action: &'static str, outcome: &BulkOutcome) {
    for failure in &outcome.failed {
        warn!(resource, action, id = %failure.id, error = %failure.error, "bulk item failed");
    }
    info!(
        resource,
        action,
        succeeded = outcome.succeeded.len(),
        failed = outcome.failed.len(),
        "bulk action settled"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Locate, Repair, Stage};
    use crate::repo::MemoryStore;
    use chrono::{TimeDelta, TimeZone};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 6, 20, 0, 0).unwrap()
    }

    #[test]
    fn soft_delete_then_restore_clears_provenance() {
        let store = MemoryStore::new(vec![Locate::new("L-1", "WO-1")]);
        let bin = RecycleBin::<Locate, _>::new(&store);

        bin.soft_delete(&store.get("L-1").unwrap(), "ops@example.com", now())
            .unwrap();
        let deleted = store.get("L-1").unwrap();
        assert!(deleted.base.is_deleted);
        assert_eq!(deleted.base.deleted_by.as_deref(), Some("ops@example.com"));
        assert_eq!(deleted.base.deleted_at, Some(now()));

        bin.restore(&deleted).unwrap();
        let restored = store.get("L-1").unwrap();
        assert_eq!(restored, Locate::new("L-1", "WO-1"));
    }

    #[test]
    fn soft_delete_freezes_repair_stage() {
        let mut repair = Repair::new("R-1", "WO-1");
        repair.stage = Stage::Approved;
        let store = MemoryStore::new(vec![repair.clone()]);
        RecycleBin::<Repair, _>::new(&store)
            .soft_delete(&repair, "ops", now())
            .unwrap();
        assert_eq!(store.get("R-1").unwrap().stage, Stage::Approved);
    }

    #[test]
    fn binned_record_keeps_first_deletion() {
        let store = MemoryStore::new(vec![Locate::new("L-1", "WO-1")]);
        let bin = RecycleBin::<Locate, _>::new(&store);
        bin.soft_delete(&store.get("L-1").unwrap(), "alice", now())
            .unwrap();

        let binned = store.get("L-1").unwrap();
        let err = bin
            .soft_delete(&binned, "bob", now() + TimeDelta::days(3))
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::RecordDeleted);

        let snapshot = store.snapshot();
        let outcome = bin.soft_delete_many(&snapshot, &["L-1"], "bob", now());
        assert!(outcome.is_total_failure());
        assert_eq!(outcome.failed[0].error.code(), ErrorCode::RecordDeleted);
        assert_eq!(store.get("L-1").unwrap(), binned);
    }

    #[test]
    fn live_record_cannot_be_restored() {
        let store = MemoryStore::new(vec![Locate::new("L-1", "WO-1")]);
        let bin = RecycleBin::<Locate, _>::new(&store);
        let live = store.get("L-1").unwrap();

        let err = bin.restore(&live).unwrap_err();
        assert_eq!(err.code(), ErrorCode::NotDeleted);

        let outcome = bin.restore_many(&store.snapshot(), &["L-1", "L-9"]);
        let codes: Vec<ErrorCode> = outcome.failed.iter().map(|f| f.error.code()).collect();
        assert_eq!(codes, vec![ErrorCode::NotDeleted, ErrorCode::RecordNotFound]);
        assert_eq!(store.get("L-1").unwrap(), live);
    }

    #[test]
    fn bulk_reports_each_failed_id() {
        let store = MemoryStore::new(vec![
            Locate::new("L-1", "WO-1"),
            Locate::new("L-2", "WO-2"),
            Locate::new("L-3", "WO-3"),
        ]);
        store.fail_on("L-2");
        let bin = RecycleBin::<Locate, _>::new(&store);

        let snapshot = store.snapshot();
        let outcome = bin.soft_delete_many(&snapshot, &["L-1", "L-2", "L-3"], "ops", now());
        assert!(outcome.is_partial());
        assert_eq!(outcome.succeeded, vec!["L-1".to_string(), "L-3".to_string()]);
        assert_eq!(outcome.failed_ids().collect::<Vec<_>>(), vec!["L-2"]);
        assert!(matches!(outcome.failed[0].error, EngineError::Store(_)));
        assert!(!store.get("L-2").unwrap().base.is_deleted);
    }

    #[test]
    fn purge_many_removes_records() {
        let store = MemoryStore::new(vec![Locate::new("L-1", "WO-1"), Locate::new("L-2", "WO-2")]);
        let outcome = RecycleBin::<Locate, _>::new(&store).purge_many(&["L-1", "L-9"]);
        assert_eq!(outcome.succeeded, vec!["L-1".to_string()]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn outcome_predicates() {
        let empty = BulkOutcome::default();
        assert!(empty.is_success());
        assert!(!empty.is_partial());
        assert!(!empty.is_total_failure());

        let total = run_bulk(&["a", "b"], |id| {
            Err(EngineError::Store(StoreError::NotFound {
                resource: "locates",
                id: id.to_string(),
            }))
        });
        assert!(total.is_total_failure());
        assert_eq!(total.failed_ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn large_bulk_stays_within_worker_cap() {
        let ids: Vec<String> = (0..200).map(|i| format!("L-{i}")).collect();
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let outcome = run_bulk(&ids, |_| {
            let current = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(current, Ordering::SeqCst);
            thread::sleep(Duration::from_millis(1));
            in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        });

        assert_eq!(outcome.succeeded, ids);
        assert!(peak.load(Ordering::SeqCst) <= MAX_BULK_WORKERS);
    }

    #[test]
    fn in_place_helpers_match_patches() {
        let mut locate = Locate::new("L-1", "WO-1");
        mark_deleted(&mut locate, "ops", now());
        let via_patch = soft_delete_patch("ops", now())
            .apply_to(&Locate::new("L-1", "WO-1"))
            .unwrap();
        assert_eq!(locate, via_patch);

        mark_restored(&mut locate);
        assert_eq!(locate, restore_patch().apply_to(&via_patch).unwrap());

        let records = vec![locate.clone(), via_patch];
        assert_eq!(binned(&records).count(), 1);
        assert_eq!(live(&records).count(), 1);
    }
}
