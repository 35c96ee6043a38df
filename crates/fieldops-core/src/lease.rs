//! Timeout-bounded lease for long-running actions such as a locate scrape.
//!
//! Only one holder at a time. A lease older than the slot's timeout is
//! treated as abandoned and can be taken over, so a crashed holder blocks
//! others for at most one timeout. Dropping the [`LeaseGuard`] releases it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, TimeDelta, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::error::ErrorCode;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LeaseError {
    #[error("lease held by {owner} since {since}")]
    Held { owner: String, since: DateTime<Utc> },
}

impl LeaseError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Held { .. } => ErrorCode::LeaseHeld,
        }
    }

    #[must_use]
    pub const fn hint(&self) -> Option<&'static str> {
        self.code().hint()
    }
}

#[derive(Debug)]
struct Holder {
    owner: String,
    acquired_at: DateTime<Utc>,
    token: u64,
}

#[derive(Debug, Default)]
struct SlotState {
    holder: Option<Holder>,
    next_token: u64,
}

/// A single lease slot shared by everyone who might start the action.
#[derive(Debug, Clone)]
pub struct LeaseSlot {
    state: Arc<Mutex<SlotState>>,
    timeout: TimeDelta,
}

impl LeaseSlot {
    #[must_use]
    pub fn new(timeout: TimeDelta) -> Self {
        Self {
            state: Arc::new(Mutex::new(SlotState::default())),
            timeout,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Take the lease at `now`.
    ///
    /// # Errors
    ///
    /// Returns [`LeaseError::Held`] if someone holds an unexpired lease.
    pub fn try_acquire(&self, owner: &str, now: DateTime<Utc>) -> Result<LeaseGuard, LeaseError> {
        let mut state = self.lock();
        if let Some(holder) = &state.holder {
            if now - holder.acquired_at < self.timeout {
                return Err(LeaseError::Held {
                    owner: holder.owner.clone(),
                    since: holder.acquired_at,
                });
            }
            warn!(
                previous = %holder.owner,
                since = %holder.acquired_at,
                owner,
                "taking over abandoned lease"
            );
        }

        state.next_token += 1;
        let token = state.next_token;
        state.holder = Some(Holder {
            owner: owner.to_string(),
            acquired_at: now,
            token,
        });
        info!(owner, "lease acquired");
        Ok(LeaseGuard {
            state: Arc::clone(&self.state),
            token,
        })
    }

    /// Current unexpired holder and acquisition instant.
    #[must_use]
    pub fn holder(&self, now: DateTime<Utc>) -> Option<(String, DateTime<Utc>)> {
        self.lock()
            .holder
            .as_ref()
            .filter(|holder| now - holder.acquired_at < self.timeout)
            .map(|holder| (holder.owner.clone(), holder.acquired_at))
    }

    #[must_use]
    pub fn is_held(&self, now: DateTime<Utc>) -> bool {
        self.holder(now).is_some()
    }
}

/// Proof of holding the lease. Releases on drop.
#[derive(Debug)]
pub struct LeaseGuard {
    state: Arc<Mutex<SlotState>>,
    token: u64,
}

impl LeaseGuard {
    /// Release explicitly.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        // A guard whose lease was taken over must not evict the new holder.
        if state
            .holder
            .as_ref()
            .is_some_and(|holder| holder.token == self.token)
        {
            state.holder = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 8, 1, 12, 0, 0).unwrap()
    }

    fn slot() -> LeaseSlot {
        LeaseSlot::new(TimeDelta::minutes(5))
    }

    #[test]
    fn second_acquire_fails_while_held() {
        let slot = slot();
        let _guard = slot.try_acquire("dispatcher-a", t0()).unwrap();
        let err = slot
            .try_acquire("dispatcher-b", t0() + TimeDelta::minutes(1))
            .unwrap_err();
        assert_eq!(
            err,
            LeaseError::Held {
                owner: "dispatcher-a".to_string(),
                since: t0()
            }
        );
        assert_eq!(err.code(), ErrorCode::LeaseHeld);
    }

    #[test]
    fn drop_releases() {
        let slot = slot();
        let guard = slot.try_acquire("a", t0()).unwrap();
        assert!(slot.is_held(t0()));
        guard.release();
        assert!(!slot.is_held(t0()));
        assert!(slot.try_acquire("b", t0()).is_ok());
    }

    #[test]
    fn abandoned_lease_can_be_taken_over() {
        let slot = slot();
        let stale = slot.try_acquire("a", t0()).unwrap();
        let later = t0() + TimeDelta::minutes(5);
        assert!(!slot.is_held(later));

        let fresh = slot.try_acquire("b", later).unwrap();
        drop(stale);
        assert_eq!(slot.holder(later), Some(("b".to_string(), later)));
        drop(fresh);
        assert_eq!(slot.holder(later), None);
    }
}
