//! Resolution of raw persistence-API records into typed ones.
//!
//! The API has accumulated several spellings for the same field over time.
//! Each field has exactly one precedence order, applied here once, so no
//! other module ever guesses at alternative names:
//!
//! | field              | precedence                                         |
//! |--------------------|----------------------------------------------------|
//! | work-order number  | `work_order_number`, `wo_number`, `ticket_number`  |
//! | customer           | `customer_name`, `customer`                        |
//! | address            | `address`, `site_address`                          |
//! | called-at          | `called_at`, `locates_called_at`                   |
//! | actors             | `*_by_email`, `*_by`                               |
//! | deleted flag       | `is_deleted`, `deleted`, then `false`              |
//! | scheduled date     | `scheduled_date`, `work_date`, then `ASAP`         |
//! | repair stage       | `stage`, `status`, then `creation`                 |
//!
//! Timestamps are RFC 3339 (any offset) or offset-less local date-times read
//! in the operating zone. Unparsable timestamps and unknown enum text resolve
//! to `None` with a warning; an untimed locate then classifies as expired.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

use crate::error::ErrorCode;
use crate::model::{
    Address, AsBuiltCondition, CallType, Locate, ParseEnumError, Record, Repair, ScheduledDate,
    Stage, StressTest, WorkOrder,
};
use crate::time::OperatingZone;

/// A record that cannot be resolved at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("{resource}: record has no id")]
    MissingId { resource: &'static str },
}

impl IngestError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::MissingId { .. } => ErrorCode::MalformedRecord,
        }
    }
}

/// Text or numeric scalar; the API emits ids and numbers either way.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum WireScalar {
    Text(String),
    Number(i64),
}

impl fmt::Display for WireScalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Number(n) => write!(f, "{n}"),
        }
    }
}

/// Raw shared fields, every alternative optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireWorkOrder {
    pub id: Option<WireScalar>,
    pub work_order_number: Option<WireScalar>,
    pub wo_number: Option<WireScalar>,
    pub ticket_number: Option<WireScalar>,
    pub customer_name: Option<String>,
    pub customer: Option<String>,
    pub address: Option<String>,
    pub site_address: Option<String>,
    pub created_at: Option<String>,
    pub is_deleted: Option<bool>,
    pub deleted: Option<bool>,
    pub deleted_by_email: Option<String>,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireLocate {
    #[serde(flatten)]
    pub base: WireWorkOrder,
    pub locates_called: Option<bool>,
    pub call_type: Option<String>,
    pub called_at: Option<String>,
    pub locates_called_at: Option<String>,
    pub called_by_email: Option<String>,
    pub called_by: Option<String>,
    pub timer_expired: Option<bool>,
    pub scheduled_date: Option<String>,
    pub work_date: Option<String>,
    pub scraped_at: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct WireRepair {
    #[serde(flatten)]
    pub base: WireWorkOrder,
    pub stage: Option<String>,
    pub status: Option<String>,
    pub stage_entry_dates: Option<BTreeMap<String, Option<String>>>,
    pub stress_test: Option<String>,
    pub as_built_condition: Option<String>,
    pub rme_report: Option<bool>,
    pub rme_inspection_filed: Option<bool>,
    pub needed_items: Option<Vec<String>>,
    pub ready_to_schedule: Option<bool>,
    pub water_tightness_test: Option<bool>,
    pub follow_up_report: Option<bool>,
    pub permit_submitted_date: Option<String>,
    pub approved_date: Option<String>,
    pub completion_date: Option<String>,
}

/// Parse a persisted timestamp into UTC.
///
/// Offset-less values are local to `zone`. A bare date means local midnight.
#[must_use]
pub fn parse_timestamp(raw: &str, zone: &OperatingZone) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    for format in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M",
    ] {
        if let Ok(local) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(zone.to_utc(local));
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .map(|date| zone.to_utc(date.and_time(NaiveTime::MIN)))
}

/// Resolve a raw locate.
///
/// # Errors
///
/// Returns [`IngestError::MissingId`] when no id is present.
pub fn resolve_locate(wire: WireLocate, zone: &OperatingZone) -> Result<Locate, IngestError> {
    let base = resolve_base(wire.base, Locate::RESOURCE, zone)?;
    let id = base.id.clone();
    let field = FieldCtx {
        resource: Locate::RESOURCE,
        id: &id,
        zone,
    };

    let call_type = wire
        .call_type
        .as_deref()
        .and_then(|raw| field.parse_enum::<CallType>("call_type", raw));
    let called_at = first_text(wire.called_at, wire.locates_called_at)
        .and_then(|raw| field.timestamp("called_at", &raw));
    let scheduled_date = first_text(wire.scheduled_date, wire.work_date)
        .and_then(|raw| field.parse_enum::<ScheduledDate>("scheduled_date", &raw))
        .unwrap_or_default();

    Ok(Locate {
        base,
        locates_called: wire.locates_called.unwrap_or(false),
        call_type,
        called_at,
        called_by: first_text(wire.called_by_email, wire.called_by),
        timer_expired: wire.timer_expired.unwrap_or(false),
        scheduled_date,
        scraped_at: wire
            .scraped_at
            .and_then(|raw| field.timestamp("scraped_at", &raw)),
    })
}

/// Resolve a raw repair.
///
/// # Errors
///
/// Returns [`IngestError::MissingId`] when no id is present.
pub fn resolve_repair(wire: WireRepair, zone: &OperatingZone) -> Result<Repair, IngestError> {
    let base = resolve_base(wire.base, Repair::RESOURCE, zone)?;
    let id = base.id.clone();
    let field = FieldCtx {
        resource: Repair::RESOURCE,
        id: &id,
        zone,
    };

    let stage = first_text(wire.stage, wire.status)
        .and_then(|raw| field.parse_enum::<Stage>("stage", &raw))
        .unwrap_or(Stage::Creation);

    let mut stage_entry_dates = BTreeMap::new();
    for (name, raw) in wire.stage_entry_dates.unwrap_or_default() {
        let Some(entry_stage) = field.parse_enum::<Stage>("stage_entry_dates", &name) else {
            continue;
        };
        if let Some(at) = raw.and_then(|raw| field.timestamp("stage_entry_dates", &raw)) {
            stage_entry_dates.insert(entry_stage, at);
        }
    }

    let mut needed_items: Vec<String> = Vec::new();
    for item in wire.needed_items.unwrap_or_default() {
        let item = item.trim().to_string();
        if !item.is_empty() && !needed_items.contains(&item) {
            needed_items.push(item);
        }
    }

    Ok(Repair {
        base,
        stage,
        stage_entry_dates,
        stress_test: wire
            .stress_test
            .as_deref()
            .and_then(|raw| field.parse_enum::<StressTest>("stress_test", raw)),
        as_built_condition: wire
            .as_built_condition
            .as_deref()
            .and_then(|raw| field.parse_enum::<AsBuiltCondition>("as_built_condition", raw)),
        rme_report: wire.rme_report,
        rme_inspection_filed: wire.rme_inspection_filed,
        needed_items,
        ready_to_schedule: wire.ready_to_schedule.unwrap_or(false),
        water_tightness_test: wire.water_tightness_test.unwrap_or(false),
        follow_up_report: wire.follow_up_report.unwrap_or(false),
        permit_submitted_date: wire
            .permit_submitted_date
            .and_then(|raw| field.timestamp("permit_submitted_date", &raw)),
        approved_date: wire
            .approved_date
            .and_then(|raw| field.timestamp("approved_date", &raw)),
        completion_date: wire
            .completion_date
            .and_then(|raw| field.timestamp("completion_date", &raw)),
    })
}

fn resolve_base(
    wire: WireWorkOrder,
    resource: &'static str,
    zone: &OperatingZone,
) -> Result<WorkOrder, IngestError> {
    let id = wire
        .id
        .map(|id| id.to_string().trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or(IngestError::MissingId { resource })?;

    let field = FieldCtx {
        resource,
        id: &id,
        zone,
    };

    let work_order_number = wire
        .work_order_number
        .or(wire.wo_number)
        .or(wire.ticket_number)
        .map(|n| n.to_string())
        .unwrap_or_default();
    let address = first_text(wire.address, wire.site_address)
        .map(|raw| Address::parse(&raw))
        .unwrap_or_default();
    let is_deleted = wire.is_deleted.or(wire.deleted).unwrap_or(false);

    let (deleted_by, deleted_at) = if is_deleted {
        (
            first_text(wire.deleted_by_email, wire.deleted_by),
            wire.deleted_at
                .and_then(|raw| field.timestamp("deleted_at", &raw)),
        )
    } else {
        (None, None)
    };

    Ok(WorkOrder {
        work_order_number,
        customer_name: first_text(wire.customer_name, wire.customer).unwrap_or_default(),
        address,
        created_at: wire
            .created_at
            .and_then(|raw| field.timestamp("created_at", &raw)),
        is_deleted,
        deleted_by,
        deleted_at,
        updated_at: wire
            .updated_at
            .and_then(|raw| field.timestamp("updated_at", &raw)),
        id,
    })
}

/// First non-blank text of a precedence pair.
fn first_text(primary: Option<String>, fallback: Option<String>) -> Option<String> {
    primary
        .filter(|s| !s.trim().is_empty())
        .or_else(|| fallback.filter(|s| !s.trim().is_empty()))
}

struct FieldCtx<'a> {
    resource: &'static str,
    id: &'a str,
    zone: &'a OperatingZone,
}

impl FieldCtx<'_> {
    fn timestamp(&self, field: &'static str, raw: &str) -> Option<DateTime<Utc>> {
        let parsed = parse_timestamp(raw, self.zone);
        if parsed.is_none() && !raw.trim().is_empty() {
            warn!(
                resource = self.resource,
                id = self.id,
                field,
                value = raw,
                "unparsable timestamp; treating as absent"
            );
        }
        parsed
    }

    fn parse_enum<T: FromStr<Err = ParseEnumError>>(
        &self,
        field: &'static str,
        raw: &str,
    ) -> Option<T> {
        raw.parse::<T>()
            .inspect_err(|err| {
                warn!(
                    resource = self.resource,
                    id = self.id,
                    field,
                    value = raw,
                    code = %err.code(),
                    "unrecognized value; treating as absent"
                );
            })
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn zone() -> OperatingZone {
        OperatingZone::us_pacific()
    }

    fn locate(value: serde_json::Value) -> Locate {
        let wire: WireLocate = serde_json::from_value(value).unwrap();
        resolve_locate(wire, &zone()).unwrap()
    }

    fn repair(value: serde_json::Value) -> Repair {
        let wire: WireRepair = serde_json::from_value(value).unwrap();
        resolve_repair(wire, &zone()).unwrap()
    }

    #[test]
    fn rfc3339_timestamps_convert_to_utc() {
        let at = parse_timestamp("2024-07-01T09:30:00-07:00", &zone()).unwrap();
        assert_eq!(at, Utc.with_ymd_and_hms(2024, 7, 1, 16, 30, 0).unwrap());
        let z = parse_timestamp("2024-07-01T16:30:00Z", &zone()).unwrap();
        assert_eq!(z, at);
    }

    #[test]
    fn naive_timestamps_are_operating_local() {
        // January is standard time, UTC-8.
        let winter = parse_timestamp("2024-01-15 08:00:00", &zone()).unwrap();
        assert_eq!(winter, Utc.with_ymd_and_hms(2024, 1, 15, 16, 0, 0).unwrap());
        // July is daylight time, UTC-7.
        let summer = parse_timestamp("2024-07-15T08:00", &zone()).unwrap();
        assert_eq!(summer, Utc.with_ymd_and_hms(2024, 7, 15, 15, 0, 0).unwrap());
        let date_only = parse_timestamp("2024-01-15", &zone()).unwrap();
        assert_eq!(date_only, Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap());
    }

    #[test]
    fn garbage_timestamps_are_absent() {
        assert_eq!(parse_timestamp("", &zone()), None);
        assert_eq!(parse_timestamp("yesterday", &zone()), None);
        assert_eq!(parse_timestamp("2024-13-45", &zone()), None);
    }

    #[test]
    fn locate_fields_follow_precedence() {
        let resolved = locate(json!({
            "id": 42,
            "wo_number": "WO-1",
            "ticket_number": "T-9",
            "customer": "Fern Ridge HOA",
            "site_address": "77 Birch Ln - Corvallis, OR 97330",
            "locates_called": true,
            "call_type": "EMERGENCY",
            "called_at": "",
            "locates_called_at": "2024-05-01T12:00:00Z",
            "called_by": "tech",
            "called_by_email": "tech@example.com",
            "work_date": "2024-05-03"
        }));

        assert_eq!(resolved.base.id, "42");
        assert_eq!(resolved.base.work_order_number, "WO-1");
        assert_eq!(resolved.base.customer_name, "Fern Ridge HOA");
        assert_eq!(resolved.base.address.city, "Corvallis");
        assert_eq!(resolved.call_type, Some(CallType::Emergency));
        assert_eq!(
            resolved.called_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap())
        );
        assert_eq!(resolved.called_by.as_deref(), Some("tech@example.com"));
        assert_eq!(
            resolved.scheduled_date,
            ScheduledDate::On(NaiveDate::from_ymd_opt(2024, 5, 3).unwrap())
        );
    }

    #[test]
    fn unknown_call_type_resolves_to_none() {
        let resolved = locate(json!({
            "id": "L-1",
            "locates_called": true,
            "call_type": "urgent",
            "called_at": "not a time"
        }));
        assert_eq!(resolved.call_type, None);
        assert_eq!(resolved.called_at, None);
        assert_eq!(resolved.scheduled_date, ScheduledDate::Asap);
    }

    #[test]
    fn deletion_provenance_only_kept_for_deleted_records() {
        let live = locate(json!({
            "id": "L-2",
            "deleted": false,
            "deleted_by": "someone",
            "deleted_at": "2024-01-01T00:00:00Z"
        }));
        assert!(!live.base.is_deleted);
        assert!(live.base.provenance_consistent());

        let gone = locate(json!({
            "id": "L-3",
            "is_deleted": true,
            "deleted": false,
            "deleted_by": "ops",
            "deleted_at": "2024-01-01T00:00:00Z"
        }));
        assert!(gone.base.is_deleted);
        assert_eq!(gone.base.deleted_by.as_deref(), Some("ops"));
        assert!(gone.base.provenance_consistent());
    }

    #[test]
    fn missing_id_is_an_error() {
        let wire: WireLocate = serde_json::from_value(json!({"wo_number": "WO-5"})).unwrap();
        let err = resolve_locate(wire, &zone()).unwrap_err();
        assert_eq!(err, IngestError::MissingId { resource: "locates" });
        assert_eq!(err.code(), ErrorCode::MalformedRecord);
    }

    #[test]
    fn repair_stage_and_checklist_resolve() {
        let resolved = repair(json!({
            "id": "R-1",
            "work_order_number": 7001,
            "status": "moreWork",
            "stage_entry_dates": {
                "creation": "2024-02-01T00:00:00Z",
                "moreWork": "2024-02-02T00:00:00Z",
                "bogus": "2024-02-03T00:00:00Z",
                "permitting": null
            },
            "stress_test": "failed",
            "as_built_condition": "meets criteria",
            "needed_items": ["Drain Field Repair", " Drain Field Repair ", ""]
        }));

        assert_eq!(resolved.base.work_order_number, "7001");
        assert_eq!(resolved.stage, Stage::MoreWork);
        assert_eq!(resolved.stage_entry_dates.len(), 2);
        assert!(resolved.stage_entry_dates.contains_key(&Stage::MoreWork));
        assert_eq!(resolved.stress_test, Some(StressTest::Failed));
        assert_eq!(
            resolved.as_built_condition,
            Some(AsBuiltCondition::MeetsCriteria)
        );
        assert_eq!(resolved.rme_report, None);
        assert_eq!(resolved.needed_items, vec!["Drain Field Repair".to_string()]);
    }

    #[test]
    fn repair_defaults_to_creation() {
        let resolved = repair(json!({"id": "R-2", "stage": "archived"}));
        assert_eq!(resolved.stage, Stage::Creation);
        assert!(resolved.needed_items.is_empty());
    }
}
