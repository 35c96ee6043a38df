#![no_main]

use libfuzzer_sys::fuzz_target;

use fieldops_core::ingest::{WireLocate, WireRepair, resolve_locate, resolve_repair};
use fieldops_core::time::OperatingZone;

fuzz_target!(|data: &[u8]| {
    let zone = OperatingZone::us_pacific();
    if let Ok(wire) = serde_json::from_slice::<WireLocate>(data) {
        let _ = resolve_locate(wire, &zone);
    }
    if let Ok(wire) = serde_json::from_slice::<WireRepair>(data) {
        let _ = resolve_repair(wire, &zone);
    }
});
