//! Fuzz target for Frame::decode
//!
//! Arbitrary byte sequences through the frame parser to find:
//! - Parser crashes or panics
//! - Integer overflows in length handling
//! - Buffer over-reads
//! - Malformed headers that bypass validation
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use provlink_proto::Frame;

fuzz_target!(|data: &[u8]| {
    // This should never panic, only return Err for invalid data
    let _ = Frame::decode(data);
});
