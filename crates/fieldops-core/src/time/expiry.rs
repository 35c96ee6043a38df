//! Locate call deadlines.
//!
//! A called locate must be worked within its call-type window: four hours for
//! emergency calls, two days for standard calls. Anything that cannot be timed
//! (no call instant, no recognizable call type) counts as already expired so
//! that it lands in front of an operator instead of sitting silently pending.

use chrono::{DateTime, TimeDelta, Utc};

use crate::model::locate::CallType;

const MILLIS_PER_SECOND: i64 = 1_000;
const MILLIS_PER_MINUTE: i64 = 60 * MILLIS_PER_SECOND;
const MILLIS_PER_HOUR: i64 = 60 * MILLIS_PER_MINUTE;
const MILLIS_PER_DAY: i64 = 24 * MILLIS_PER_HOUR;

/// Label rendered once a deadline has passed.
pub const EXPIRED_LABEL: &str = "EXPIRED";

impl CallType {
    /// Length of the call window.
    #[must_use]
    pub fn window(self) -> TimeDelta {
        match self {
            Self::Standard => TimeDelta::days(2),
            Self::Emergency => TimeDelta::hours(4),
        }
    }
}

/// Deadline for a call placed at `called_at`.
#[must_use]
pub fn expiration_instant(
    called_at: Option<DateTime<Utc>>,
    call_type: Option<CallType>,
) -> Option<DateTime<Utc>> {
    let (called_at, call_type) = (called_at?, call_type?);
    called_at.checked_add_signed(call_type.window())
}

/// Same as [`expiration_instant`], matching the call type text case-insensitively.
#[must_use]
pub fn expiration_instant_str(
    called_at: Option<DateTime<Utc>>,
    call_type: Option<&str>,
) -> Option<DateTime<Utc>> {
    expiration_instant(called_at, call_type.and_then(CallType::parse_lenient))
}

/// Whether the call window has closed at `now`.
///
/// Untimeable calls are reported as expired.
#[must_use]
pub fn is_expired(
    called_at: Option<DateTime<Utc>>,
    call_type: Option<CallType>,
    now: DateTime<Utc>,
) -> bool {
    expiration_instant(called_at, call_type).is_none_or(|deadline| now >= deadline)
}

/// Time left until the deadline; negative once it has passed.
#[must_use]
pub fn remaining(
    called_at: Option<DateTime<Utc>>,
    call_type: Option<CallType>,
    now: DateTime<Utc>,
) -> Option<TimeDelta> {
    expiration_instant(called_at, call_type).map(|deadline| deadline - now)
}

/// Time since the call was placed.
#[must_use]
pub fn elapsed(called_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Option<TimeDelta> {
    called_at.map(|called_at| now - called_at)
}

/// Countdown label for a timer display.
///
/// More than a day left renders as `Nd Mh` after rounding to the nearest
/// hour. Otherwise the coarsest non-zero unit pair is used: `Hh Mm`, `Mm Ss`
/// or `Ss`.
#[must_use]
pub fn remaining_label(remaining_ms: i64) -> String {
    if remaining_ms <= 0 {
        return EXPIRED_LABEL.to_string();
    }

    if remaining_ms > MILLIS_PER_DAY {
        let hours = (remaining_ms + MILLIS_PER_HOUR / 2) / MILLIS_PER_HOUR;
        return format!("{}d {}h", hours / 24, hours % 24);
    }

    let hours = remaining_ms / MILLIS_PER_HOUR;
    let minutes = (remaining_ms % MILLIS_PER_HOUR) / MILLIS_PER_MINUTE;
    let seconds = (remaining_ms % MILLIS_PER_MINUTE) / MILLIS_PER_SECOND;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// [`remaining_label`] for a call, `EXPIRED` when untimeable.
#[must_use]
pub fn label_for(
    called_at: Option<DateTime<Utc>>,
    call_type: Option<CallType>,
    now: DateTime<Utc>,
) -> String {
    remaining(called_at, call_type, now).map_or_else(
        || EXPIRED_LABEL.to_string(),
        |left| remaining_label(left.num_milliseconds()),
    )
}
