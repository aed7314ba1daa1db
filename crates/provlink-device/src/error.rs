//! Device-side error type.

use provlink_core::link::LinkError;
use thiserror::Error;

use crate::storage::StorageError;

/// Errors surfaced by the device driver.
///
/// Protocol-level failures (malformed frames, bad payloads, token
/// mismatches) never appear here; they are answered or dropped on the wire
/// per the error taxonomy. This type covers the faults the driver itself
/// must handle.
#[derive(Debug, Error)]
pub enum DeviceError {
    /// Persistent store failure.
    #[error("storage: {0}")]
    Storage(#[from] StorageError),

    /// Datagram link failure.
    #[error("link: {0}")]
    Link(#[from] LinkError),

    /// Invalid driver configuration (bad peer table entry, etc.).
    #[error("configuration: {0}")]
    Config(String),
}
