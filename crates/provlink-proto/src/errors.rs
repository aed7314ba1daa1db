//! Protocol error types.
//!
//! Parse failures are distinguishable here for logging and tests, but every
//! receive path treats them identically: the frame is dropped with no
//! response.

use thiserror::Error;

use crate::value::ValueError;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced by the frame codec and fragmentation helpers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Input shorter than the fixed header.
    #[error("frame too short: need {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Minimum byte count required.
        expected: usize,
        /// Bytes actually available.
        actual: usize,
    },

    /// Magic field did not match the protocol identifier.
    #[error("invalid magic")]
    InvalidMagic,

    /// Version byte is not one this implementation speaks.
    #[error("unsupported version {0:#04x}")]
    UnsupportedVersion(u8),

    /// Header-claimed payload length differs from the residual frame length.
    #[error("payload length {claimed} does not match residual frame length {actual}")]
    PayloadLengthMismatch {
        /// Length claimed by the header.
        claimed: usize,
        /// Bytes actually following the header.
        actual: usize,
    },

    /// Per-frame payload exceeds the 200-byte fragment limit.
    #[error("payload length {len} exceeds per-frame limit {max}")]
    PayloadTooLarge {
        /// Offending length.
        len: usize,
        /// Limit that was exceeded.
        max: usize,
    },

    /// Total message payload exceeds the 240-byte reassembled limit.
    #[error("message length {len} exceeds reassembled limit {max}")]
    MessageTooLarge {
        /// Offending length.
        len: usize,
        /// Limit that was exceeded.
        max: usize,
    },

    /// Fragment counters violate `frag_idx < frag_cnt`, `frag_cnt >= 1`.
    #[error("invalid fragment counters: idx {idx}, cnt {cnt}")]
    InvalidFragment {
        /// Fragment index from the header.
        idx: u8,
        /// Fragment count from the header.
        cnt: u8,
    },

    /// Stored CRC does not match the checksum over header and payload.
    #[error("crc mismatch: computed {computed:#06x}, stored {stored:#06x}")]
    CrcMismatch {
        /// Checksum recomputed by the parser.
        computed: u16,
        /// Checksum carried in the header.
        stored: u16,
    },

    /// Payload value encode/decode failure.
    #[error("payload value: {0}")]
    Value(#[from] ValueError),
}
