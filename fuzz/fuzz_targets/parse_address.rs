#![no_main]

use libfuzzer_sys::fuzz_target;

use fieldops_core::model::Address;

fuzz_target!(|data: &[u8]| {
    if let Ok(raw) = std::str::from_utf8(data) {
        let address = Address::parse(raw);
        assert_eq!(address.original, raw);
        assert!(address.street.len() <= raw.len());
    }
});
