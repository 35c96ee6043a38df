//! Operating time zone.
//!
//! Work orders are dispatched on Pacific wall-clock time but persisted as UTC.
//! One [`OperatingZone`] is chosen per process (see [`crate::config`]) and every
//! conversion in the engine goes through it.
//!
//! The canonical policy is [`ZonePolicy::UsPacific`]: UTC-8, switching to UTC-7
//! between the second Sunday of March and the first Sunday of November, both
//! transitions at 02:00 local time. [`ZonePolicy::Fixed`] applies a single
//! offset all year.

use chrono::{
    DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Offset, TimeDelta, Utc, Weekday,
};

const PACIFIC_STANDARD_SECS: i32 = -8 * 3600;
const PACIFIC_DAYLIGHT_SECS: i32 = -7 * 3600;

/// How local operating time relates to UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZonePolicy {
    /// US Pacific with daylight saving time.
    UsPacific,
    /// A constant offset from UTC.
    Fixed(FixedOffset),
}

/// Daylight saving window for one year, as UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DstWindow {
    /// First instant of daylight time.
    pub starts: DateTime<Utc>,
    /// First instant back on standard time.
    pub ends: DateTime<Utc>,
}

impl DstWindow {
    /// Whether `at` falls inside the daylight window.
    #[must_use]
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.starts <= at && at < self.ends
    }
}

/// Compute the US daylight saving window for `year`.
///
/// Returns `None` only for years chrono cannot represent.
#[must_use]
pub fn us_dst_window(year: i32) -> Option<DstWindow> {
    let (start_local, end_local) = local_transitions(year)?;
    // 02:00 standard time in March, 02:00 daylight time in November.
    let starts = start_local.checked_sub_signed(TimeDelta::seconds(PACIFIC_STANDARD_SECS.into()))?;
    let ends = end_local.checked_sub_signed(TimeDelta::seconds(PACIFIC_DAYLIGHT_SECS.into()))?;
    Some(DstWindow {
        starts: starts.and_utc(),
        ends: ends.and_utc(),
    })
}

fn local_transitions(year: i32) -> Option<(NaiveDateTime, NaiveDateTime)> {
    let start = NaiveDate::from_weekday_of_month_opt(year, 3, Weekday::Sun, 2)?.and_hms_opt(2, 0, 0)?;
    let end = NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Sun, 1)?.and_hms_opt(2, 0, 0)?;
    Some((start, end))
}

fn offset_from_secs(secs: i32) -> FixedOffset {
    FixedOffset::east_opt(secs).unwrap_or_else(|| Utc.fix())
}

/// The process-wide operating time zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatingZone {
    policy: ZonePolicy,
}

impl Default for OperatingZone {
    fn default() -> Self {
        Self::us_pacific()
    }
}

impl OperatingZone {
    /// DST-aware US Pacific time.
    #[must_use]
    pub const fn us_pacific() -> Self {
        Self {
            policy: ZonePolicy::UsPacific,
        }
    }

    /// A constant offset of `hours` from UTC, or `None` when out of range.
    #[must_use]
    pub fn fixed_hours(hours: i32) -> Option<Self> {
        let offset = FixedOffset::east_opt(hours.checked_mul(3600)?)?;
        Some(Self {
            policy: ZonePolicy::Fixed(offset),
        })
    }

    #[must_use]
    pub const fn policy(&self) -> ZonePolicy {
        self.policy
    }

    /// Whether daylight time is in effect at the UTC instant `at`.
    #[must_use]
    pub fn is_daylight_at(&self, at: DateTime<Utc>) -> bool {
        match self.policy {
            ZonePolicy::Fixed(_) => false,
            ZonePolicy::UsPacific => {
                let standard_local = at.naive_utc() + TimeDelta::seconds(PACIFIC_STANDARD_SECS.into());
                us_dst_window(standard_local.year()).is_some_and(|window| window.contains(at))
            }
        }
    }

    /// Offset in effect at the UTC instant `at`.
    #[must_use]
    pub fn offset_at(&self, at: DateTime<Utc>) -> FixedOffset {
        match self.policy {
            ZonePolicy::Fixed(offset) => offset,
            ZonePolicy::UsPacific if self.is_daylight_at(at) => offset_from_secs(PACIFIC_DAYLIGHT_SECS),
            ZonePolicy::UsPacific => offset_from_secs(PACIFIC_STANDARD_SECS),
        }
    }

    /// Offset to apply to an offset-less local wall-clock time.
    ///
    /// The repeated hour at the end of daylight time resolves to daylight
    /// time (its first occurrence). Wall times skipped at the start of
    /// daylight time resolve to daylight time as well.
    #[must_use]
    pub fn offset_for_local(&self, local: NaiveDateTime) -> FixedOffset {
        match self.policy {
            ZonePolicy::Fixed(offset) => offset,
            ZonePolicy::UsPacific => {
                let daylight = local_transitions(local.year())
                    .is_some_and(|(start, end)| start <= local && local < end);
                if daylight {
                    offset_from_secs(PACIFIC_DAYLIGHT_SECS)
                } else {
                    offset_from_secs(PACIFIC_STANDARD_SECS)
                }
            }
        }
    }

    /// Convert a UTC instant to operating time.
    #[must_use]
    pub fn to_operating(&self, at: DateTime<Utc>) -> DateTime<FixedOffset> {
        at.with_timezone(&self.offset_at(at))
    }

    /// Convert an operating-time wall clock reading to UTC.
    #[must_use]
    pub fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        let offset = self.offset_for_local(local);
        let shift = TimeDelta::seconds(offset.local_minus_utc().into());
        local
            .checked_sub_signed(shift)
            .unwrap_or(local)
            .and_utc()
    }

    /// Calendar date in operating time for the UTC instant `at`.
    #[must_use]
    pub fn operating_date(&self, at: DateTime<Utc>) -> NaiveDate {
        self.to_operating(at).date_naive()
    }
}
