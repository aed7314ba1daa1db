//! Property tests for the wire codec as a whole: split, encode, decode.

#![allow(clippy::unwrap_used)]

use provlink_proto::{Frame, FrameFlags, FrameHeader, MsgType, split_message};
use proptest::prelude::*;

fn arbitrary_request_type() -> impl Strategy<Value = MsgType> {
    prop_oneof![
        Just(MsgType::Ping),
        Just(MsgType::WriteConfig),
        Just(MsgType::ReadConfig),
        Just(MsgType::Apply),
        Just(MsgType::Reboot),
    ]
}

proptest! {
    /// Any message payload within the 240-byte limit survives
    /// split → wire → parse → concatenate.
    #[test]
    fn split_frames_survive_the_wire(
        msg_type in arbitrary_request_type(),
        sequence in any::<u16>(),
        payload in prop::collection::vec(any::<u8>(), 0..=FrameHeader::MAX_MESSAGE_PAYLOAD),
    ) {
        let frames =
            split_message(msg_type, sequence, FrameFlags::ACK_REQUESTED, &payload).unwrap();

        prop_assert!(!frames.is_empty());
        prop_assert!(frames.len() <= 2);

        let mut rebuilt = Vec::new();
        for (idx, frame) in frames.iter().enumerate() {
            let parsed = Frame::decode(&frame.encode()).unwrap();
            prop_assert_eq!(parsed.header.msg_type(), Some(msg_type));
            prop_assert_eq!(parsed.header.sequence(), sequence);
            prop_assert_eq!(usize::from(parsed.header.frag_idx()), idx);
            prop_assert_eq!(usize::from(parsed.header.frag_cnt()), frames.len());
            prop_assert!(parsed.header.flags().ack_requested());
            prop_assert_eq!(
                parsed.header.flags().is_fragment(),
                frames.len() > 1
            );
            prop_assert_eq!(
                parsed.header.flags().last_fragment(),
                frames.len() > 1 && idx == frames.len() - 1
            );
            rebuilt.extend_from_slice(&parsed.payload);
        }
        prop_assert_eq!(rebuilt, payload);
    }

    /// Frames under 13 bytes, or with any prefix of a valid frame, never
    /// parse.
    #[test]
    fn prefixes_never_parse(
        payload in prop::collection::vec(any::<u8>(), 1..=64),
        cut in any::<prop::sample::Index>(),
    ) {
        let header = FrameHeader::new(MsgType::WriteConfig);
        let frame = Frame::new(header, payload).unwrap();
        let wire = frame.encode();
        let cut = cut.index(wire.len() - 1);
        prop_assert!(Frame::decode(&wire[..cut]).is_err());
    }
}
