//! Locate lifecycle: bucket classification and the call/complete intents.
//!
//! The bucket is always derived from `locates_called`, `timer_expired` and a
//! fresh comparison of `now` against the call deadline. It is never stored.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Action, ErrorCode, TransitionRejected};
use crate::model::{CallType, Locate};
use crate::time::{expiration_instant, is_expired, label_for, remaining};

/// Lifecycle bucket of a locate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Pending,
    InProgress,
    Completed,
}

impl Bucket {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What `mark_called` does with a locate that is already called.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemarkPolicy {
    /// Reject with [`ErrorCode::AlreadyCalled`].
    #[default]
    Reject,
    /// Leave the record untouched and report no change.
    Ignore,
}

/// Classify one locate at `now`.
#[must_use]
pub fn classify(locate: &Locate, now: DateTime<Utc>) -> Bucket {
    if !locate.locates_called {
        Bucket::Pending
    } else if locate.timer_expired || is_expired(locate.called_at, locate.call_type, now) {
        Bucket::Completed
    } else {
        Bucket::InProgress
    }
}

/// Live locates split by bucket, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buckets<'a> {
    pub pending: Vec<&'a Locate>,
    pub in_progress: Vec<&'a Locate>,
    pub completed: Vec<&'a Locate>,
}

impl Buckets<'_> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len() + self.in_progress.len() + self.completed.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition the non-deleted locates into their buckets.
pub fn partition<'a, I>(locates: I, now: DateTime<Utc>) -> Buckets<'a>
where
    I: IntoIterator<Item = &'a Locate>,
{
    let mut buckets = Buckets::default();
    for locate in locates.into_iter().filter(|l| !l.base.is_deleted) {
        match classify(locate, now) {
            Bucket::Pending => buckets.pending.push(locate),
            Bucket::InProgress => buckets.in_progress.push(locate),
            Bucket::Completed => buckets.completed.push(locate),
        }
    }
    buckets
}

/// Call deadline of a locate, if it can be timed.
#[must_use]
pub fn deadline(locate: &Locate) -> Option<DateTime<Utc>> {
    expiration_instant(locate.called_at, locate.call_type)
}

/// Time left on the call window.
#[must_use]
pub fn time_remaining(locate: &Locate, now: DateTime<Utc>) -> Option<TimeDelta> {
    remaining(locate.called_at, locate.call_type, now)
}

/// Countdown label for the timer column.
#[must_use]
pub fn countdown(locate: &Locate, now: DateTime<Utc>) -> String {
    label_for(locate.called_at, locate.call_type, now)
}

/// Record that the locate call was placed.
///
/// `now` is the current instant; the stored `called_at` is UTC. Returns
/// whether the record changed.
///
/// # Errors
///
/// Rejects deleted records, and already-called records under
/// [`RemarkPolicy::Reject`].
pub fn mark_called(
    locate: &mut Locate,
    call_type: CallType,
    actor: &str,
    now: DateTime<Utc>,
    policy: RemarkPolicy,
) -> Result<bool, TransitionRejected> {
    ensure_live(locate, Action::MarkCalled)?;

    if locate.locates_called {
        return match policy {
            RemarkPolicy::Reject => Err(TransitionRejected::new(
                &locate.base.id,
                Action::MarkCalled,
                ErrorCode::AlreadyCalled,
                "locate has already been called",
            )),
            RemarkPolicy::Ignore => {
                debug!(id = %locate.base.id, "re-mark ignored");
                Ok(false)
            }
        };
    }

    locate.locates_called = true;
    locate.call_type = Some(call_type);
    locate.called_at = Some(now);
    locate.called_by = Some(actor.to_string());
    locate.timer_expired = false;
    Ok(true)
}

/// Force the locate into the completed bucket.
///
/// Idempotent: returns `false` when the record was already complete.
///
/// # Errors
///
/// Rejects deleted records.
pub fn complete(locate: &mut Locate) -> Result<bool, TransitionRejected> {
    ensure_live(locate, Action::Complete)?;
    if locate.timer_expired {
        return Ok(false);
    }
    locate.timer_expired = true;
    Ok(true)
}

fn ensure_live(locate: &Locate, action: Action) -> Result<(), TransitionRejected> {
    if locate.base.is_deleted {
        return Err(TransitionRejected::new(
            &locate.base.id,
            action,
            ErrorCode::RecordDeleted,
            "record is in the recycle bin",
        ));
    }
    Ok(())
}
