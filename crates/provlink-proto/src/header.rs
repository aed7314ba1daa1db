//! Fixed 13-byte frame header with zero-copy parsing.
//!
//! All multi-byte fields are little-endian. Fields are stored as raw byte
//! arrays so the struct has no alignment requirements and any 13-byte
//! pattern is a structurally valid cast target; semantic validation happens
//! in [`FrameHeader::from_bytes`].

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::errors::{ProtocolError, Result};

/// Message kinds carried in the `msg_type` header field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MsgType {
    /// Liveness probe, empty payload.
    Ping = 0x01,
    /// Reply to [`MsgType::Ping`].
    PingAck = 0x02,
    /// Configuration write request, `{token, cfg}` payload.
    WriteConfig = 0x10,
    /// Reply to [`MsgType::WriteConfig`], empty payload.
    WriteConfigAck = 0x11,
    /// Configuration read request, `{token, fields}` payload.
    ReadConfig = 0x12,
    /// Reply to [`MsgType::ReadConfig`], `{data}` payload.
    ReadConfigAck = 0x13,
    /// Re-read persistent config into the running collaborators.
    Apply = 0x14,
    /// Reply to [`MsgType::Apply`], empty payload.
    ApplyAck = 0x15,
    /// Restart the device.
    Reboot = 0x16,
    /// Reply to [`MsgType::Reboot`], sent before the restart.
    RebootAck = 0x17,
    /// Negative acknowledgment, `{code, msg}` payload.
    Nack = 0x7E,
    /// Reserved.
    Error = 0x7F,
}

impl MsgType {
    /// Decode a raw `msg_type` byte. `None` if unrecognized.
    #[must_use]
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0x01 => Some(Self::Ping),
            0x02 => Some(Self::PingAck),
            0x10 => Some(Self::WriteConfig),
            0x11 => Some(Self::WriteConfigAck),
            0x12 => Some(Self::ReadConfig),
            0x13 => Some(Self::ReadConfigAck),
            0x14 => Some(Self::Apply),
            0x15 => Some(Self::ApplyAck),
            0x16 => Some(Self::Reboot),
            0x17 => Some(Self::RebootAck),
            0x7E => Some(Self::Nack),
            0x7F => Some(Self::Error),
            _ => None,
        }
    }

    /// Raw wire byte for this message kind.
    #[must_use]
    pub fn to_u8(self) -> u8 {
        self as u8
    }

    /// Positive acknowledgment type expected for this request type.
    ///
    /// `None` for types that are themselves replies (or reserved).
    #[must_use]
    pub fn ack_type(self) -> Option<Self> {
        match self {
            Self::Ping => Some(Self::PingAck),
            Self::WriteConfig => Some(Self::WriteConfigAck),
            Self::ReadConfig => Some(Self::ReadConfigAck),
            Self::Apply => Some(Self::ApplyAck),
            Self::Reboot => Some(Self::RebootAck),
            _ => None,
        }
    }
}

/// Frame flag bitfield (header byte 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags(u8);

impl FrameFlags {
    /// Bit 0: sender expects an acknowledgment.
    pub const ACK_REQUESTED: Self = Self(0b0000_0001);
    /// Bit 1: this frame is one fragment of a larger message.
    pub const IS_FRAGMENT: Self = Self(0b0000_0010);
    /// Bit 2: this frame is the final fragment.
    pub const LAST_FRAGMENT: Self = Self(0b0000_0100);

    /// No flags set.
    #[must_use]
    pub fn empty() -> Self {
        Self(0)
    }

    /// Reconstruct from a raw header byte. Unknown bits are preserved.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        Self(byte)
    }

    /// Raw header byte.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        self.0
    }

    /// Union of two flag sets.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Whether all bits of `other` are set in `self`.
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Bit 0 accessor.
    #[must_use]
    pub fn ack_requested(self) -> bool {
        self.contains(Self::ACK_REQUESTED)
    }

    /// Bit 1 accessor.
    #[must_use]
    pub fn is_fragment(self) -> bool {
        self.contains(Self::IS_FRAGMENT)
    }

    /// Bit 2 accessor.
    #[must_use]
    pub fn last_fragment(self) -> bool {
        self.contains(Self::LAST_FRAGMENT)
    }
}

/// Fixed 13-byte frame header (little-endian multibyte fields).
///
/// # Invariants
///
/// Enforced by [`FrameHeader::from_bytes`]:
/// - `magic == 0x4250`, `version == 0x01`
/// - `frag_cnt >= 1` and `frag_idx < frag_cnt`
/// - `payload_len <= MAX_FRAGMENT_PAYLOAD`
///
/// The CRC is NOT checked here; it covers header plus payload and is
/// verified by [`crate::Frame::decode`].
#[repr(C, packed)]
#[derive(Clone, Copy, FromBytes, IntoBytes, KnownLayout, Immutable)]
pub struct FrameHeader {
    magic: [u8; 2],
    version: u8,
    msg_type: u8,
    flags: u8,
    sequence: [u8; 2],
    frag_idx: u8,
    frag_cnt: u8,
    pub(crate) payload_len: [u8; 2],
    pub(crate) crc16: [u8; 2],
}

impl FrameHeader {
    /// Size of the serialized header.
    pub const SIZE: usize = 13;

    /// Protocol magic, "PB" on the wire.
    pub const MAGIC: u16 = 0x4250;

    /// Current protocol version.
    pub const VERSION: u8 = 0x01;

    /// Maximum payload bytes in a single frame.
    pub const MAX_FRAGMENT_PAYLOAD: usize = 200;

    /// Maximum total payload bytes of a reassembled message.
    pub const MAX_MESSAGE_PAYLOAD: usize = 240;

    /// Create a header for `msg_type` with zero sequence, no flags, and
    /// single-fragment counters.
    #[must_use]
    pub fn new(msg_type: MsgType) -> Self {
        Self {
            magic: Self::MAGIC.to_le_bytes(),
            version: Self::VERSION,
            msg_type: msg_type.to_u8(),
            flags: 0,
            sequence: [0; 2],
            frag_idx: 0,
            frag_cnt: 1,
            payload_len: [0; 2],
            crc16: [0; 2],
        }
    }

    /// Parse and validate a header from the front of `bytes` (zero-copy).
    ///
    /// # Errors
    ///
    /// - [`ProtocolError::FrameTooShort`] if fewer than 13 bytes
    /// - [`ProtocolError::InvalidMagic`] / [`ProtocolError::UnsupportedVersion`]
    /// - [`ProtocolError::InvalidFragment`] if `frag_cnt == 0` or
    ///   `frag_idx >= frag_cnt`
    /// - [`ProtocolError::PayloadTooLarge`] if the claimed payload length
    ///   exceeds [`Self::MAX_FRAGMENT_PAYLOAD`]
    pub fn from_bytes(bytes: &[u8]) -> Result<&Self> {
        let header = Self::ref_from_prefix(bytes)
            .map_err(|_| ProtocolError::FrameTooShort {
                expected: Self::SIZE,
                actual: bytes.len(),
            })?
            .0;

        if u16::from_le_bytes(header.magic) != Self::MAGIC {
            return Err(ProtocolError::InvalidMagic);
        }

        if header.version != Self::VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        if header.frag_cnt == 0 || header.frag_idx >= header.frag_cnt {
            return Err(ProtocolError::InvalidFragment {
                idx: header.frag_idx,
                cnt: header.frag_cnt,
            });
        }

        let payload_len = usize::from(u16::from_le_bytes(header.payload_len));
        if payload_len > Self::MAX_FRAGMENT_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge {
                len: payload_len,
                max: Self::MAX_FRAGMENT_PAYLOAD,
            });
        }

        Ok(header)
    }

    /// Serialize to the 13-byte wire form.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let bytes = IntoBytes::as_bytes(self);
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(bytes);
        arr
    }

    /// Message kind as raw byte.
    #[must_use]
    pub fn msg_type_raw(&self) -> u8 {
        self.msg_type
    }

    /// Message kind as enum. `None` if unrecognized.
    #[must_use]
    pub fn msg_type(&self) -> Option<MsgType> {
        MsgType::from_u8(self.msg_type)
    }

    /// Frame flag bits.
    #[must_use]
    pub fn flags(&self) -> FrameFlags {
        FrameFlags::from_byte(self.flags)
    }

    /// Per-initiator request sequence, wraps modulo 2^16.
    #[must_use]
    pub fn sequence(&self) -> u16 {
        u16::from_le_bytes(self.sequence)
    }

    /// Zero-based fragment index.
    #[must_use]
    pub fn frag_idx(&self) -> u8 {
        self.frag_idx
    }

    /// Total fragment count, at least 1.
    #[must_use]
    pub fn frag_cnt(&self) -> u8 {
        self.frag_cnt
    }

    /// Payload length of this frame (not the total message).
    #[must_use]
    pub fn payload_len(&self) -> u16 {
        u16::from_le_bytes(self.payload_len)
    }

    /// Stored CRC-16/CCITT-FALSE value.
    #[must_use]
    pub fn crc16(&self) -> u16 {
        u16::from_le_bytes(self.crc16)
    }

    /// Update the flag bits.
    pub fn set_flags(&mut self, flags: FrameFlags) {
        self.flags = flags.to_byte();
    }

    /// Update the request sequence.
    pub fn set_sequence(&mut self, sequence: u16) {
        self.sequence = sequence.to_le_bytes();
    }

    /// Update the fragment counters.
    ///
    /// Callers must keep `idx < cnt` and `cnt >= 1`; [`Self::from_bytes`]
    /// rejects anything else on the receive side.
    pub fn set_fragment(&mut self, idx: u8, cnt: u8) {
        debug_assert!(cnt >= 1 && idx < cnt, "fragment counters {idx}/{cnt}");
        self.frag_idx = idx;
        self.frag_cnt = cnt;
    }

    pub(crate) fn set_payload_len(&mut self, len: u16) {
        self.payload_len = len.to_le_bytes();
    }

    pub(crate) fn set_crc16(&mut self, crc: u16) {
        self.crc16 = crc.to_le_bytes();
    }
}

// Manual Debug implementation to decode the raw byte-array fields.
impl std::fmt::Debug for FrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameHeader")
            .field("magic", &format!("{:#06x}", u16::from_le_bytes(self.magic)))
            .field("version", &self.version)
            .field("msg_type", &format!("{:#04x}", self.msg_type))
            .field("flags", &self.flags())
            .field("sequence", &self.sequence())
            .field("frag_idx", &self.frag_idx)
            .field("frag_cnt", &self.frag_cnt)
            .field("payload_len", &self.payload_len())
            .field("crc16", &format!("{:#06x}", self.crc16()))
            .finish()
    }
}

impl PartialEq for FrameHeader {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}

impl Eq for FrameHeader {}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use proptest::prelude::*;

    use super::*;

    pub(crate) fn arbitrary_msg_type() -> impl Strategy<Value = MsgType> {
        prop_oneof![
            Just(MsgType::Ping),
            Just(MsgType::PingAck),
            Just(MsgType::WriteConfig),
            Just(MsgType::WriteConfigAck),
            Just(MsgType::ReadConfig),
            Just(MsgType::ReadConfigAck),
            Just(MsgType::Apply),
            Just(MsgType::ApplyAck),
            Just(MsgType::Reboot),
            Just(MsgType::RebootAck),
            Just(MsgType::Nack),
            Just(MsgType::Error),
        ]
    }

    impl Arbitrary for FrameHeader {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
            (
                arbitrary_msg_type(),
                0u8..8,      // flags
                any::<u16>(), // sequence
                1u8..=8,     // frag_cnt
                0u16..=FrameHeader::MAX_FRAGMENT_PAYLOAD as u16,
            )
                .prop_flat_map(|(msg_type, flags, sequence, frag_cnt, payload_len)| {
                    (0..frag_cnt).prop_map(move |frag_idx| {
                        let mut header = FrameHeader::new(msg_type);
                        header.set_flags(FrameFlags::from_byte(flags));
                        header.set_sequence(sequence);
                        header.set_fragment(frag_idx, frag_cnt);
                        header.set_payload_len(payload_len);
                        header
                    })
                })
                .boxed()
        }
    }

    #[test]
    fn header_size() {
        assert_eq!(std::mem::size_of::<FrameHeader>(), FrameHeader::SIZE);
        assert_eq!(FrameHeader::SIZE, 13);
    }

    #[test]
    fn wire_layout_is_little_endian() {
        let mut header = FrameHeader::new(MsgType::WriteConfig);
        header.set_sequence(0x1234);
        header.set_payload_len(0x00C8);
        let bytes = header.to_bytes();
        // "PB" magic, low byte first
        assert_eq!(&bytes[0..2], &[0x50, 0x42]);
        assert_eq!(bytes[2], 0x01);
        assert_eq!(bytes[3], 0x10);
        assert_eq!(&bytes[5..7], &[0x34, 0x12]);
        assert_eq!(&bytes[9..11], &[0xC8, 0x00]);
    }

    proptest! {
        #[test]
        fn header_round_trip(header in any::<FrameHeader>()) {
            let bytes = header.to_bytes();
            let parsed = FrameHeader::from_bytes(&bytes).expect("should parse");
            prop_assert_eq!(&header, parsed);
        }
    }

    #[test]
    fn reject_short_buffer() {
        let short = [0u8; 12];
        assert_eq!(
            FrameHeader::from_bytes(&short),
            Err(ProtocolError::FrameTooShort { expected: 13, actual: 12 })
        );
    }

    #[test]
    fn reject_invalid_magic() {
        let mut bytes = FrameHeader::new(MsgType::Ping).to_bytes();
        bytes[0] = 0xFF;
        assert_eq!(FrameHeader::from_bytes(&bytes), Err(ProtocolError::InvalidMagic));
    }

    #[test]
    fn reject_invalid_version() {
        let mut bytes = FrameHeader::new(MsgType::Ping).to_bytes();
        bytes[2] = 0x02;
        assert_eq!(
            FrameHeader::from_bytes(&bytes),
            Err(ProtocolError::UnsupportedVersion(0x02))
        );
    }

    #[test]
    fn reject_zero_fragment_count() {
        let mut bytes = FrameHeader::new(MsgType::Ping).to_bytes();
        bytes[8] = 0; // frag_cnt
        assert_eq!(
            FrameHeader::from_bytes(&bytes),
            Err(ProtocolError::InvalidFragment { idx: 0, cnt: 0 })
        );
    }

    #[test]
    fn reject_fragment_index_out_of_range() {
        let mut bytes = FrameHeader::new(MsgType::Ping).to_bytes();
        bytes[7] = 2; // frag_idx
        bytes[8] = 2; // frag_cnt
        assert_eq!(
            FrameHeader::from_bytes(&bytes),
            Err(ProtocolError::InvalidFragment { idx: 2, cnt: 2 })
        );
    }

    #[test]
    fn reject_oversize_payload_claim() {
        let mut header = FrameHeader::new(MsgType::Ping);
        header.set_payload_len(201);
        let bytes = header.to_bytes();
        assert_eq!(
            FrameHeader::from_bytes(&bytes),
            Err(ProtocolError::PayloadTooLarge { len: 201, max: 200 })
        );
    }

    #[test]
    fn ack_type_pairs() {
        assert_eq!(MsgType::Ping.ack_type(), Some(MsgType::PingAck));
        assert_eq!(MsgType::WriteConfig.ack_type(), Some(MsgType::WriteConfigAck));
        assert_eq!(MsgType::ReadConfig.ack_type(), Some(MsgType::ReadConfigAck));
        assert_eq!(MsgType::Apply.ack_type(), Some(MsgType::ApplyAck));
        assert_eq!(MsgType::Reboot.ack_type(), Some(MsgType::RebootAck));
        assert_eq!(MsgType::PingAck.ack_type(), None);
        assert_eq!(MsgType::Nack.ack_type(), None);
    }
}
