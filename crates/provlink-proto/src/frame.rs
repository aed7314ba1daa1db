//! Frame codec: header + payload + CRC.
//!
//! Wire layout: `[FrameHeader: 13 bytes] + [payload: 0..=200 bytes]`. The
//! CRC field covers the header with `crc16 = 0` followed by the payload, so
//! a frame is validated end to end by a single checksum.

use bytes::Bytes;

use crate::{
    crc::Crc16,
    errors::{ProtocolError, Result},
    header::FrameHeader,
};

/// One datagram on the wire.
///
/// Holds raw payload bytes; payload decoding into [`crate::Value`] happens
/// at the dispatch layer. The header's `payload_len` always matches
/// `payload.len()` (enforced by [`Frame::new`], verified by
/// [`Frame::decode`]).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Validated frame header.
    pub header: FrameHeader,
    /// Raw payload bytes.
    pub payload: Bytes,
}

impl Frame {
    /// Create a frame, setting the header's `payload_len` from the payload.
    ///
    /// # Errors
    ///
    /// [`ProtocolError::PayloadTooLarge`] if the payload exceeds
    /// [`FrameHeader::MAX_FRAGMENT_PAYLOAD`].
    pub fn new(mut header: FrameHeader, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > FrameHeader::MAX_FRAGMENT_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge {
                len: payload.len(),
                max: FrameHeader::MAX_FRAGMENT_PAYLOAD,
            });
        }
        header.set_payload_len(payload.len() as u16);
        Ok(Self { header, payload })
    }

    /// Serialize to wire bytes with the CRC computed and patched in.
    #[must_use]
    pub fn encode(&self) -> Bytes {
        let mut header = self.header;
        header.set_crc16(0);

        let mut crc = Crc16::new();
        crc.update(&header.to_bytes());
        crc.update(&self.payload);
        header.set_crc16(crc.finish());

        let mut wire = Vec::with_capacity(FrameHeader::SIZE + self.payload.len());
        wire.extend_from_slice(&header.to_bytes());
        wire.extend_from_slice(&self.payload);
        Bytes::from(wire)
    }

    /// Parse one datagram.
    ///
    /// The residual length after the header must equal the header's
    /// `payload_len` exactly: datagram transports deliver whole frames, so
    /// both truncation and trailing garbage are malformed.
    ///
    /// # Errors
    ///
    /// Any header validation error from [`FrameHeader::from_bytes`],
    /// [`ProtocolError::PayloadLengthMismatch`], or
    /// [`ProtocolError::CrcMismatch`]. Receive paths drop all of these
    /// silently.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let header = *FrameHeader::from_bytes(bytes)?;

        let claimed = usize::from(header.payload_len());
        let actual = bytes.len() - FrameHeader::SIZE;
        if claimed != actual {
            return Err(ProtocolError::PayloadLengthMismatch { claimed, actual });
        }

        let payload = &bytes[FrameHeader::SIZE..];

        let mut zeroed = header;
        zeroed.set_crc16(0);
        let mut crc = Crc16::new();
        crc.update(&zeroed.to_bytes());
        crc.update(payload);
        let computed = crc.finish();

        if computed != header.crc16() {
            return Err(ProtocolError::CrcMismatch { computed, stored: header.crc16() });
        }

        Ok(Self { header, payload: Bytes::copy_from_slice(payload) })
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use proptest::prelude::*;

    use super::*;
    use crate::header::MsgType;

    impl Arbitrary for Frame {
        type Parameters = ();
        type Strategy = BoxedStrategy<Self>;

        fn arbitrary_with((): Self::Parameters) -> Self::Strategy {
            (
                any::<FrameHeader>(),
                prop::collection::vec(any::<u8>(), 0..=FrameHeader::MAX_FRAGMENT_PAYLOAD),
            )
                .prop_map(|(header, payload)| {
                    Frame::new(header, payload).expect("payload within limit")
                })
                .boxed()
        }
    }

    proptest! {
        #[test]
        fn frame_round_trip(frame in any::<Frame>()) {
            let wire = frame.encode();
            let parsed = Frame::decode(&wire).expect("should decode");
            prop_assert_eq!(&frame.payload, &parsed.payload);
            // Header equality modulo the CRC patched in by encode.
            prop_assert_eq!(frame.header.sequence(), parsed.header.sequence());
            prop_assert_eq!(frame.header.msg_type_raw(), parsed.header.msg_type_raw());
            prop_assert_eq!(frame.header.flags(), parsed.header.flags());
            prop_assert_eq!(frame.header.frag_idx(), parsed.header.frag_idx());
            prop_assert_eq!(frame.header.frag_cnt(), parsed.header.frag_cnt());
        }

        #[test]
        fn single_bit_flip_is_rejected(
            frame in any::<Frame>(),
            flip_bit in any::<prop::sample::Index>(),
        ) {
            let wire = frame.encode();
            let bit = flip_bit.index(wire.len() * 8);
            let mut corrupted = wire.to_vec();
            corrupted[bit / 8] ^= 1 << (bit % 8);
            prop_assert!(Frame::decode(&corrupted).is_err());
        }
    }

    #[test]
    fn reject_oversize_payload() {
        let header = FrameHeader::new(MsgType::WriteConfig);
        let err = Frame::new(header, vec![0u8; 201]).unwrap_err();
        assert_eq!(err, ProtocolError::PayloadTooLarge { len: 201, max: 200 });
    }

    #[test]
    fn reject_truncated_payload() {
        let header = FrameHeader::new(MsgType::WriteConfig);
        let frame = Frame::new(header, vec![1u8, 2, 3, 4]).unwrap();
        let wire = frame.encode();
        assert!(matches!(
            Frame::decode(&wire[..wire.len() - 1]),
            Err(ProtocolError::PayloadLengthMismatch { claimed: 4, actual: 3 })
        ));
    }

    #[test]
    fn reject_trailing_garbage() {
        let header = FrameHeader::new(MsgType::Ping);
        let frame = Frame::new(header, Bytes::new()).unwrap();
        let mut wire = frame.encode().to_vec();
        wire.push(0xAA);
        assert!(matches!(
            Frame::decode(&wire),
            Err(ProtocolError::PayloadLengthMismatch { claimed: 0, actual: 1 })
        ));
    }

    #[test]
    fn crc_covers_payload() {
        let header = FrameHeader::new(MsgType::WriteConfig);
        let frame = Frame::new(header, vec![1u8, 2, 3, 4]).unwrap();
        let mut wire = frame.encode().to_vec();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        assert!(matches!(Frame::decode(&wire), Err(ProtocolError::CrcMismatch { .. })));
    }

    #[test]
    fn empty_payload_round_trip() {
        let mut header = FrameHeader::new(MsgType::Ping);
        header.set_sequence(7);
        let frame = Frame::new(header, Bytes::new()).unwrap();
        let wire = frame.encode();
        assert_eq!(wire.len(), FrameHeader::SIZE);
        let parsed = Frame::decode(&wire).unwrap();
        assert_eq!(parsed.header.sequence(), 7);
        assert!(parsed.payload.is_empty());
    }
}
