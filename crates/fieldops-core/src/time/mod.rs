//! Time zone normalization and call-deadline arithmetic.
//!
//! Both submodules are pure: no shared state, safe to call from any thread.

pub mod expiry;
pub mod zone;

pub use expiry::{
    EXPIRED_LABEL, elapsed, expiration_instant, expiration_instant_str, is_expired, label_for,
    remaining, remaining_label,
};
pub use zone::{DstWindow, OperatingZone, ZonePolicy, us_dst_window};
