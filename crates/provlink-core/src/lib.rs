//! Shared endpoint machinery for the provisioning link.
//!
//! Both ends of the link reuse this crate: the six-octet peer address, the
//! single-slot fragment reassembly buffer, the idempotent-replay dedup
//! cache, the datagram link abstraction (with a UDP rendition), and the
//! environment trait that keeps the state machines off the system clock.

pub mod dedup;
pub mod env;
pub mod link;
pub mod message;
pub mod peer;
pub mod reassembly;

pub use dedup::DedupCache;
pub use env::{Environment, SystemEnv};
pub use link::{Link, LinkError, UdpLink};
pub use message::MessageKey;
pub use peer::{PeerAddr, PeerAddrParseError};
pub use reassembly::ReassemblyBuffer;
