//! Device endpoint of the provisioning link.
//!
//! The [`dispatcher::DeviceEndpoint`] is a pure state machine: datagram in,
//! actions out. The driver (the binary here, or a test harness) executes
//! the actions: sending reply frames, re-reading configuration into the
//! running collaborators, or restarting the system. Persistent
//! configuration lives behind the [`storage::ConfigStore`] trait with redb
//! and in-memory renditions.

pub mod dispatcher;
pub mod error;
pub mod storage;

pub use dispatcher::{DeviceAction, DeviceEndpoint};
pub use error::DeviceError;
pub use storage::{ConfigSlot, ConfigStore, MemoryStore, RedbStore, StorageError};
