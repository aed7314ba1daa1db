//! Wire protocol for the provisioning link.
//!
//! A message on the link is one or more datagram frames: a fixed 13-byte
//! little-endian header followed by at most 200 bytes of payload, protected
//! end to end by CRC-16/CCITT-FALSE. Payloads carry a small self-describing
//! binary value model (a strict CBOR subset) defined in [`value`].
//!
//! This crate is pure data: no I/O, no timers. Reassembly, deduplication,
//! and the endpoint state machines live in the `provlink-core`,
//! `provlink-device`, and `provlink-bridge` crates.

pub mod crc;
pub mod errors;
pub mod fragment;
pub mod frame;
pub mod header;
pub mod value;

pub use errors::{ProtocolError, Result};
pub use fragment::split_message;
pub use frame::Frame;
pub use header::{FrameFlags, FrameHeader, MsgType};
pub use value::{Value, ValueError};
