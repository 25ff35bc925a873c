//! Fuzz target for key segment validation.

#![no_main]

use correlation_engine::key::KeySegment;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let result = KeySegment::new(data);
    assert_eq!(result.is_ok(), KeySegment::is_valid(data));

    if let Ok(segment) = result {
        assert_eq!(segment.as_str(), data);
        assert!(!data.contains('/'));
    }
});
