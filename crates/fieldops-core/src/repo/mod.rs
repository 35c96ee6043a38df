//! Persistence seam.
//!
//! The engine talks to storage only through [`Repository`]: full-collection
//! list, keyed partial update, keyed permanent delete. There are no version
//! checks; concurrent writers are last-write-wins at the store.

pub mod memory;
pub mod rest;

use std::sync::Arc;

use crate::error::StoreError;
use crate::model::Record;
use crate::patch::Patch;

pub use memory::MemoryStore;
pub use rest::RestStore;

pub trait Repository<R: Record>: Send + Sync {
    /// Fetch the whole collection, deleted records included.
    fn list(&self) -> Result<Vec<R>, StoreError>;

    /// Apply a partial update to one record.
    fn patch(&self, id: &str, patch: &Patch) -> Result<(), StoreError>;

    /// Remove one record irrecoverably.
    fn delete(&self, id: &str) -> Result<(), StoreError>;
}

impl<R: Record, T: Repository<R> + ?Sized> Repository<R> for Arc<T> {
    fn list(&self) -> Result<Vec<R>, StoreError> {
        (**self).list()
    }

    fn patch(&self, id: &str, patch: &Patch) -> Result<(), StoreError> {
        (**self).patch(id, patch)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        (**self).delete(id)
    }
}
