use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::StoreError;
use crate::model::Record;
use crate::patch::Patch;
use crate::repo::Repository;

/// In-memory store for tests and simulation.
///
/// Ids registered with [`MemoryStore::fail_on`] fail every mutation with
/// [`StoreError::Unavailable`] until healed.
#[derive(Debug)]
pub struct MemoryStore<R> {
    inner: Mutex<Inner<R>>,
}

#[derive(Debug)]
struct Inner<R> {
    records: Vec<R>,
    failing: HashSet<String>,
    fail_listing: bool,
}

impl<R: Record> Default for MemoryStore<R> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<R: Record> MemoryStore<R> {
    #[must_use]
    pub fn new(records: Vec<R>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                records,
                failing: HashSet::new(),
                fail_listing: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<R>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn insert(&self, record: R) {
        let mut inner = self.lock();
        inner.records.retain(|existing| existing.id() != record.id());
        inner.records.push(record);
    }

    /// Make every mutation of `id` fail.
    pub fn fail_on(&self, id: &str) {
        self.lock().failing.insert(id.to_string());
    }

    pub fn heal(&self, id: &str) {
        self.lock().failing.remove(id);
    }

    /// Make `list` fail until [`MemoryStore::set_listing_fails`] is reset.
    pub fn set_listing_fails(&self, fails: bool) {
        self.lock().fail_listing = fails;
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<R> {
        self.lock().records.iter().find(|r| r.id() == id).cloned()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<R> {
        self.lock().records.clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    fn check_failure(inner: &Inner<R>, id: &str) -> Result<(), StoreError> {
        if inner.failing.contains(id) {
            return Err(StoreError::Unavailable {
                resource: R::RESOURCE,
                id: Some(id.to_string()),
                message: "injected failure".to_string(),
            });
        }
        Ok(())
    }
}

impl<R: Record> Repository<R> for MemoryStore<R> {
    fn list(&self) -> Result<Vec<R>, StoreError> {
        let inner = self.lock();
        if inner.fail_listing {
            return Err(StoreError::Unavailable {
                resource: R::RESOURCE,
                id: None,
                message: "injected failure".to_string(),
            });
        }
        Ok(inner.records.clone())
    }

    fn patch(&self, id: &str, patch: &Patch) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check_failure(&inner, id)?;
        let record = inner
            .records
            .iter_mut()
            .find(|r| r.id() == id)
            .ok_or_else(|| StoreError::NotFound {
                resource: R::RESOURCE,
                id: id.to_string(),
            })?;
        *record = patch.apply_to(record).map_err(|err| StoreError::Rejected {
            resource: R::RESOURCE,
            id: Some(id.to_string()),
            status: 422,
            message: err.to_string(),
        })?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        Self::check_failure(&inner, id)?;
        let before = inner.records.len();
        inner.records.retain(|r| r.id() != id);
        if inner.records.len() == before {
            return Err(StoreError::NotFound {
                resource: R::RESOURCE,
                id: id.to_string(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::MemoryStore;
    use crate::error::{ErrorCode, StoreError};
    use crate::model::Locate;
    use crate::patch::Patch;
    use crate::repo::Repository;
    use serde_json::json;

    fn store() -> MemoryStore<Locate> {
        MemoryStore::new(vec![Locate::new("L-1", "WO-1"), Locate::new("L-2", "WO-2")])
    }

    #[test]
    fn patch_updates_only_named_fields() {
        let store = store();
        store
            .patch("L-1", &Patch::new().with("timer_expired", json!(true)))
            .unwrap();
        let updated = store.get("L-1").unwrap();
        assert!(updated.timer_expired);
        assert_eq!(updated.base.work_order_number, "WO-1");
        assert!(!store.get("L-2").unwrap().timer_expired);
    }

    #[test]
    fn unknown_ids_are_not_found() {
        let store = store();
        let err = store.delete("L-9").unwrap_err();
        assert_eq!(err.code(), ErrorCode::RecordNotFound);
        assert!(store.patch("L-9", &Patch::new()).is_err());
    }

    #[test]
    fn ill_typed_patch_is_rejected_without_change() {
        let store = store();
        let err = store
            .patch("L-1", &Patch::new().with("call_type", json!("urgent")))
            .unwrap_err();
        assert!(matches!(err, StoreError::Rejected { status: 422, .. }));
        assert_eq!(store.get("L-1").unwrap().call_type, None);
    }

    #[test]
    fn injected_failures_until_healed() {
        let store = store();
        store.fail_on("L-2");
        let err = store.delete("L-2").unwrap_err();
        assert_eq!(err.id(), Some("L-2"));
        assert_eq!(store.len(), 2);

        store.heal("L-2");
        store.delete("L-2").unwrap();
        assert_eq!(store.len(), 1);

        store.set_listing_fails(true);
        assert!(store.list().is_err());
        store.set_listing_fails(false);
        assert_eq!(store.list().unwrap().len(), 1);
    }
}
