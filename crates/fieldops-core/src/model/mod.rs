//! Typed work-order records.
//!
//! Serialized field names are the persistence API's snake_case vocabulary, so
//! `serde` is the whole wire mapping for records that are already resolved.
//! Raw records with alternative spellings go through [`crate::ingest`] first.

pub mod address;
pub mod locate;
pub mod repair;
pub mod work_order;

use std::fmt;

use serde::Serialize;
use serde::de::DeserializeOwned;

pub use address::Address;
pub use locate::{CallType, Locate, ScheduledDate};
pub use repair::{AsBuiltCondition, Repair, Stage, StressTest};
pub use work_order::WorkOrder;

use crate::error::ErrorCode;
use crate::ingest::IngestError;
use crate::time::OperatingZone;

/// A persisted work-order record kind.
pub trait Record: Clone + fmt::Debug + Send + Sync + Serialize + DeserializeOwned + 'static {
    /// Collection name on the persistence API.
    const RESOURCE: &'static str;

    /// Raw wire shape accepted by [`Record::from_wire`].
    type Wire: DeserializeOwned;

    /// Resolve a raw wire record into a typed one.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError`] when the record has no usable id.
    fn from_wire(wire: Self::Wire, zone: &OperatingZone) -> Result<Self, IngestError>;

    fn base(&self) -> &WorkOrder;

    fn base_mut(&mut self) -> &mut WorkOrder;

    fn id(&self) -> &str {
        &self.base().id
    }

    fn is_deleted(&self) -> bool {
        self.base().is_deleted
    }
}

/// Error returned when parsing an enum value from text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEnumError {
    pub expected: &'static str,
    pub got: String,
}

impl ParseEnumError {
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        ErrorCode::InvalidEnumValue
    }
}

impl fmt::Display for ParseEnumError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: '{}'", self.expected, self.got)
    }
}

impl std::error::Error for ParseEnumError {}

/// Lowercase and drop word separators so `moreWork`, `more_work` and
/// `More Work` all compare equal.
pub(crate) fn normalize(input: &str) -> String {
    input
        .trim()
        .chars()
        .filter(|c| !matches!(c, '_' | '-' | ' '))
        .flat_map(char::to_lowercase)
        .collect()
}
