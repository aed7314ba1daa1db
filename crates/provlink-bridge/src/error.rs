//! Bridge-side error type.

use provlink_core::link::LinkError;
use thiserror::Error;

/// Errors surfaced by the bridge driver.
///
/// Per-job failures (timeouts, nacks, transport send faults) are not
/// errors at this level; they become structured `err:{code,msg}` objects
/// on the operator channel. This type covers faults of the bridge process
/// itself.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Datagram link failure.
    #[error("link: {0}")]
    Link(#[from] LinkError),

    /// Operator channel I/O failure.
    #[error("operator channel: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid driver configuration (bad peer table entry, etc.).
    #[error("configuration: {0}")]
    Config(String),
}
