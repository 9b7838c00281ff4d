#![no_main]

use dc_parser::{extract_array_payload, recover_array};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };

    if let Ok(extracted) = extract_array_payload(input) {
        let again = extract_array_payload(&extracted.payload);
        assert!(again.is_ok(), "extracted payload must re-extract");
        let _ = recover_array(&extracted.payload);
    }
});
