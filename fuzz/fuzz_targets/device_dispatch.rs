//! Fuzz target for the device dispatch pipeline
//!
//! Arbitrary datagrams through parse → reassemble → dedup → dispatch with
//! a live store behind the handlers. The dispatcher must never panic,
//! whatever arrives on the wire.

#![no_main]

use libfuzzer_sys::fuzz_target;
use provlink_core::peer::PeerAddr;
use provlink_device::{DeviceEndpoint, MemoryStore};

fuzz_target!(|datagrams: Vec<Vec<u8>>| {
    let mut device: DeviceEndpoint<MemoryStore, std::time::Instant> =
        DeviceEndpoint::new(MemoryStore::new(), "fuzz-token");
    let peer = PeerAddr::new([1, 2, 3, 4, 5, 6]);

    for datagram in &datagrams {
        let _ = device.handle_datagram(std::time::Instant::now(), peer, datagram);
    }
});
