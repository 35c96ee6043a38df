#![no_main]

use libfuzzer_sys::fuzz_target;

use fieldops_core::ingest::parse_timestamp;
use fieldops_core::time::OperatingZone;

fuzz_target!(|data: &[u8]| {
    if let Ok(raw) = std::str::from_utf8(data) {
        let _ = parse_timestamp(raw, &OperatingZone::us_pacific());
        if let Some(zone) = OperatingZone::fixed_hours(-8) {
            let _ = parse_timestamp(raw, &zone);
        }
    }
});
