//! Fuzz target for Value::decode
//!
//! Malformed payload bytes through the strict codec:
//! - Truncated heads and bodies
//! - Huge claimed lengths (must not allocate up front)
//! - Deep nesting (must hit the depth limit, not the stack limit)
//! - Forms outside the subset (indefinite, tags, floats, 8-byte args)
//!
//! The fuzzer should NEVER panic. A decoded value must re-encode and
//! decode to itself.

#![no_main]

use libfuzzer_sys::fuzz_target;
use provlink_proto::Value;

fuzz_target!(|data: &[u8]| {
    if let Ok(value) = Value::decode(data) {
        // Anything we accept must round-trip through our own encoder.
        let encoded = value.encode().expect("decoded value must be encodable");
        let again = Value::decode(&encoded).expect("re-encoded value must decode");
        assert_eq!(value, again);
    }
});
