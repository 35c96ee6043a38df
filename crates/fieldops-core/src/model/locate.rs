use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use super::{ParseEnumError, Record, WorkOrder};
use crate::ingest::{self, IngestError, WireLocate};
use crate::time::OperatingZone;

/// Priority class of a placed locate call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallType {
    Standard,
    Emergency,
}

impl CallType {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Emergency => "emergency",
        }
    }

    /// Parse call type text in any casing; unknown text yields `None`.
    #[must_use]
    pub fn parse_lenient(input: &str) -> Option<Self> {
        input.parse().ok()
    }
}

impl fmt::Display for CallType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CallType {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        [Self::Standard, Self::Emergency]
            .into_iter()
            .find(|call_type| trimmed.eq_ignore_ascii_case(call_type.as_str()))
            .ok_or_else(|| ParseEnumError {
                expected: "call type",
                got: s.to_string(),
            })
    }
}

/// Target work date, or the `ASAP` sentinel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ScheduledDate {
    #[default]
    Asap,
    On(NaiveDate),
}

impl ScheduledDate {
    pub const ASAP: &'static str = "ASAP";
}

impl fmt::Display for ScheduledDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Asap => f.write_str(Self::ASAP),
            Self::On(date) => write!(f, "{}", date.format("%Y-%m-%d")),
        }
    }
}

impl FromStr for ScheduledDate {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(Self::ASAP) {
            return Ok(Self::Asap);
        }
        // Accept a bare date or the date part of a timestamp.
        let date_part = trimmed.get(..10).unwrap_or(trimmed);
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d")
            .map(Self::On)
            .map_err(|_| ParseEnumError {
                expected: "scheduled date",
                got: s.to_string(),
            })
    }
}

impl TryFrom<String> for ScheduledDate {
    type Error = ParseEnumError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ScheduledDate> for String {
    fn from(value: ScheduledDate) -> Self {
        value.to_string()
    }
}

/// A utility locate request.
///
/// Which lifecycle bucket a locate is in is never stored; see
/// [`crate::locate::classify`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Locate {
    #[serde(flatten)]
    pub base: WorkOrder,
    pub locates_called: bool,
    pub call_type: Option<CallType>,
    pub called_at: Option<DateTime<Utc>>,
    pub called_by: Option<String>,
    /// Authoritative "done" flag, set by timer expiry or manual completion.
    pub timer_expired: bool,
    pub scheduled_date: ScheduledDate,
    pub scraped_at: Option<DateTime<Utc>>,
}

impl Locate {
    /// A pending locate with only its identity set.
    #[must_use]
    pub fn new(id: impl Into<String>, work_order_number: impl Into<String>) -> Self {
        Self {
            base: WorkOrder::new(id, work_order_number),
            ..Self::default()
        }
    }
}

impl Record for Locate {
    const RESOURCE: &'static str = "locates";

    type Wire = WireLocate;

    fn from_wire(wire: WireLocate, zone: &OperatingZone) -> Result<Self, IngestError> {
        ingest::resolve_locate(wire, zone)
    }

    fn base(&self) -> &WorkOrder {
        &self.base
    }

    fn base_mut(&mut self) -> &mut WorkOrder {
        &mut self.base
    }
}

#[cfg(test)]
mod tests {
    use super::{CallType, Locate, ScheduledDate};
    use crate::error::ErrorCode;
    use chrono::NaiveDate;
    use std::str::FromStr;

    #[test]
    fn call_type_json_and_text() {
        assert_eq!(
            serde_json::to_string(&CallType::Emergency).unwrap(),
            "\"emergency\""
        );
        assert_eq!(CallType::from_str("Standard").unwrap(), CallType::Standard);
        assert_eq!(CallType::parse_lenient("EMERGENCY"), Some(CallType::Emergency));
        assert_eq!(CallType::parse_lenient("urgent"), None);
    }

    #[test]
    fn call_type_matches_whole_words_only() {
        assert_eq!(CallType::parse_lenient(" eMeRgEnCy "), Some(CallType::Emergency));
        for text in ["emer-gency", "stand ard", "stand_ard", "emergencyy", ""] {
            let err = CallType::from_str(text).unwrap_err();
            assert_eq!(err.code(), ErrorCode::InvalidEnumValue, "{text:?}");
        }
    }

    #[test]
    fn scheduled_date_parses_sentinel_and_dates() {
        assert_eq!(ScheduledDate::from_str("asap").unwrap(), ScheduledDate::Asap);
        assert_eq!(ScheduledDate::from_str("").unwrap(), ScheduledDate::Asap);
        let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
        assert_eq!(
            ScheduledDate::from_str("2024-06-03").unwrap(),
            ScheduledDate::On(date)
        );
        assert_eq!(
            ScheduledDate::from_str("2024-06-03T00:00:00Z").unwrap(),
            ScheduledDate::On(date)
        );
        assert!(ScheduledDate::from_str("next tuesday").is_err());
        assert_eq!(ScheduledDate::On(date).to_string(), "2024-06-03");
    }

    #[test]
    fn locate_serializes_with_wire_names() {
        let mut locate = Locate::new("L-9", "WO-9");
        locate.call_type = Some(CallType::Standard);
        let value = serde_json::to_value(&locate).unwrap();
        assert_eq!(value["id"], "L-9");
        assert_eq!(value["work_order_number"], "WO-9");
        assert_eq!(value["locates_called"], false);
        assert_eq!(value["call_type"], "standard");
        assert_eq!(value["scheduled_date"], "ASAP");
        assert_eq!(value["is_deleted"], false);

        let back: Locate = serde_json::from_value(value).unwrap();
        assert_eq!(back, locate);
    }
}
