//! Message identity shared by reassembly and dedup.

use provlink_proto::FrameHeader;

use crate::peer::PeerAddr;

/// The `(peer, sequence, msg_type)` triple identifying one request.
///
/// Keys both the in-flight reassembly slot and the dedup cache. The message
/// type is kept raw so unrecognized types still reassemble and dedup; they
/// are rejected later at dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageKey {
    /// Source address of the initiator.
    pub peer: PeerAddr,
    /// Initiator's request sequence.
    pub sequence: u16,
    /// Raw message type byte.
    pub msg_type: u8,
}

impl MessageKey {
    /// Key for a frame received from `peer`.
    #[must_use]
    pub fn from_header(peer: PeerAddr, header: &FrameHeader) -> Self {
        Self { peer, sequence: header.sequence(), msg_type: header.msg_type_raw() }
    }
}
