#![no_main]

use autoperf::annotation::{CScanner, SourceParser};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes either parse or fail with ParseFailed, never panic
    if let Ok(functions) = CScanner.parse(data) {
        for f in &functions {
            assert!(f.body.start < f.body.end && f.body.end <= data.len());
        }
    }
});
