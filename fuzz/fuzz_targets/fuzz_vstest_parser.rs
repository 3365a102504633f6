#![no_main]

use faultline_adapters_vstest::parse_vstest;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        // Malformed reports must surface as errors, never as panics
        let _ = parse_vstest(text);
    }
});
