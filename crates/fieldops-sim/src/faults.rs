use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use fieldops_core::StoreError;
use fieldops_core::model::Record;
use fieldops_core::patch::Patch;
use fieldops_core::repo::{MemoryStore, Repository};
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::rng::DeterministicRng;

/// Store failure rates, in percent per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    pub patch_failure_percent: u8,
    pub delete_failure_percent: u8,
    pub list_failure_percent: u8,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            patch_failure_percent: 10,
            delete_failure_percent: 10,
            list_failure_percent: 5,
        }
    }
}

impl FaultConfig {
    #[must_use]
    pub const fn none() -> Self {
        Self {
            patch_failure_percent: 0,
            delete_failure_percent: 0,
            list_failure_percent: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Op {
    List,
    Patch,
    Delete,
}

/// A [`MemoryStore`] that fails calls at configured rates.
///
/// Bulk actions hit the store from several threads, so a failure is decided
/// from the seed, the step and the call itself rather than from a shared
/// stream. The same step replays the same failures in any thread order.
#[derive(Debug)]
pub struct FlakyStore<R> {
    inner: MemoryStore<R>,
    faults: FaultConfig,
    seed: u64,
    armed: AtomicBool,
    step: AtomicU64,
    injected: AtomicUsize,
}

impl<R: Record> FlakyStore<R> {
    #[must_use]
    pub fn new(records: Vec<R>, faults: FaultConfig, seed: u64) -> Self {
        Self {
            inner: MemoryStore::new(records),
            faults,
            seed,
            armed: AtomicBool::new(true),
            step: AtomicU64::new(0),
            injected: AtomicUsize::new(0),
        }
    }

    /// Disarmed stores never fail.
    pub fn set_armed(&self, armed: bool) {
        self.armed.store(armed, Ordering::SeqCst);
    }

    pub fn begin_step(&self, step: u64) {
        self.step.store(step, Ordering::SeqCst);
    }

    /// Calls failed on purpose so far.
    #[must_use]
    pub fn injected(&self) -> usize {
        self.injected.load(Ordering::SeqCst)
    }

    /// Ground truth, bypassing fault injection.
    #[must_use]
    pub fn snapshot(&self) -> Vec<R> {
        self.inner.snapshot()
    }

    fn roll(&self, op: Op, id: &str) -> bool {
        if !self.armed.load(Ordering::SeqCst) {
            return false;
        }
        let percent = match op {
            Op::List => self.faults.list_failure_percent,
            Op::Patch => self.faults.patch_failure_percent,
            Op::Delete => self.faults.delete_failure_percent,
        };
        let mut key = self.seed ^ self.step.load(Ordering::SeqCst).rotate_left(17);
        key ^= (op as u64).rotate_left(41);
        key ^= fnv1a(id);
        let hit = DeterministicRng::new(key).chance(percent);
        if hit {
            self.injected.fetch_add(1, Ordering::SeqCst);
            trace!(resource = R::RESOURCE, id, ?op, "injected store failure");
        }
        hit
    }

    fn injected_error(id: &str) -> StoreError {
        StoreError::Unavailable {
            resource: R::RESOURCE,
            id: (!id.is_empty()).then(|| id.to_string()),
            message: "simulated network failure".to_string(),
        }
    }
}

impl<R: Record> Repository<R> for FlakyStore<R> {
    fn list(&self) -> Result<Vec<R>, StoreError> {
        if self.roll(Op::List, "") {
            return Err(Self::injected_error(""));
        }
        self.inner.list()
    }

    fn patch(&self, id: &str, patch: &Patch) -> Result<(), StoreError> {
        if self.roll(Op::Patch, id) {
            return Err(Self::injected_error(id));
        }
        self.inner.patch(id, patch)
    }

    fn delete(&self, id: &str) -> Result<(), StoreError> {
        if self.roll(Op::Delete, id) {
            return Err(Self::injected_error(id));
        }
        self.inner.delete(id)
    }
}

fn fnv1a(text: &str) -> u64 {
    text.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, byte| {
        (hash ^ u64::from(byte)).wrapping_mul(0x0100_0000_01b3)
    })
}
