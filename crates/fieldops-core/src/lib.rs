//! fieldops-core library.
//!
//! Lifecycle engine for field-service work orders: utility locates with call
//! deadlines, and septic repairs moving through six stages. Records come in
//! through [`ingest`], are classified by [`locate`] and [`repair`], and are
//! mutated through a [`view::ListView`] over a [`repo::Repository`].
//!
//! # Conventions
//!
//! - **Errors**: typed errors from [`error`] in library APIs; `anyhow::Result`
//!   for configuration loading.
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `debug!`) with
//!   `resource` and `id` fields.
//! - **Time**: every instant is UTC. Local operating time exists only inside
//!   [`time::OperatingZone`] conversions.

pub mod board;
pub mod clock;
pub mod config;
pub mod error;
pub mod ingest;
pub mod lease;
pub mod locate;
pub mod model;
pub mod patch;
pub mod recycle;
pub mod repair;
pub mod repo;
pub mod selection;
pub mod ticker;
pub mod time;
pub mod view;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{EngineError, ErrorCode, StoreError, TransitionRejected};
pub use locate::{Bucket, RemarkPolicy};
pub use model::{CallType, Locate, Record, Repair, Stage};
pub use recycle::{BulkFailure, BulkOutcome};
pub use repair::{RepairEdit, StageChange};
pub use view::{ListView, ViewConfig, ViewEvent};
