use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Address;

/// Fields shared by every work-order kind.
///
/// The deletion provenance (`deleted_by`, `deleted_at`) is only populated
/// while `is_deleted` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkOrder {
    pub id: String,
    pub work_order_number: String,
    pub customer_name: String,
    pub address: Address,
    pub created_at: Option<DateTime<Utc>>,
    pub is_deleted: bool,
    pub deleted_by: Option<String>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl WorkOrder {
    /// A live work order with only its id and number set.
    #[must_use]
    pub fn new(id: impl Into<String>, work_order_number: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            work_order_number: work_order_number.into(),
            ..Self::default()
        }
    }

    /// Whether the deletion fields are consistent with the flag.
    #[must_use]
    pub fn provenance_consistent(&self) -> bool {
        if self.is_deleted {
            self.deleted_at.is_some()
        } else {
            self.deleted_by.is_none() && self.deleted_at.is_none()
        }
    }
}
