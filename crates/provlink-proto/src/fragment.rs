//! Message fragmentation.
//!
//! A message payload larger than one frame is split at 200-byte boundaries.
//! Every fragment of a multi-frame message carries `IS_FRAGMENT`; the final
//! one additionally carries `LAST_FRAGMENT`. A payload that fits in one
//! frame is sent unflagged with `frag_idx = 0`, `frag_cnt = 1`.

use crate::{
    errors::{ProtocolError, Result},
    frame::Frame,
    header::{FrameFlags, FrameHeader, MsgType},
};

/// Split `payload` into send-ready frames for one message.
///
/// `base_flags` is OR-ed into every frame (fragment bits are managed here).
///
/// # Errors
///
/// [`ProtocolError::MessageTooLarge`] if the payload exceeds
/// [`FrameHeader::MAX_MESSAGE_PAYLOAD`].
pub fn split_message(
    msg_type: MsgType,
    sequence: u16,
    base_flags: FrameFlags,
    payload: &[u8],
) -> Result<Vec<Frame>> {
    if payload.len() > FrameHeader::MAX_MESSAGE_PAYLOAD {
        return Err(ProtocolError::MessageTooLarge {
            len: payload.len(),
            max: FrameHeader::MAX_MESSAGE_PAYLOAD,
        });
    }

    let frag_cnt = payload.len().div_ceil(FrameHeader::MAX_FRAGMENT_PAYLOAD).max(1);

    let mut frames = Vec::with_capacity(frag_cnt);
    for idx in 0..frag_cnt {
        let offset = idx * FrameHeader::MAX_FRAGMENT_PAYLOAD;
        let end = (offset + FrameHeader::MAX_FRAGMENT_PAYLOAD).min(payload.len());

        let mut flags = base_flags;
        if frag_cnt > 1 {
            flags = flags.union(FrameFlags::IS_FRAGMENT);
            if idx == frag_cnt - 1 {
                flags = flags.union(FrameFlags::LAST_FRAGMENT);
            }
        }

        let mut header = FrameHeader::new(msg_type);
        header.set_sequence(sequence);
        header.set_flags(flags);
        header.set_fragment(idx as u8, frag_cnt as u8);

        frames.push(Frame::new(header, payload[offset..end].to_vec())?);
    }

    Ok(frames)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn empty_payload_is_one_unflagged_frame() {
        let frames = split_message(MsgType::Ping, 3, FrameFlags::empty(), &[]).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].header.frag_idx(), 0);
        assert_eq!(frames[0].header.frag_cnt(), 1);
        assert!(!frames[0].header.flags().is_fragment());
        assert!(frames[0].payload.is_empty());
    }

    #[test]
    fn boundary_payload_stays_single_frame() {
        let payload = vec![0xABu8; 200];
        let frames =
            split_message(MsgType::WriteConfig, 9, FrameFlags::ACK_REQUESTED, &payload).unwrap();
        assert_eq!(frames.len(), 1);
        assert!(!frames[0].header.flags().is_fragment());
        assert!(frames[0].header.flags().ack_requested());
    }

    #[test]
    fn split_sets_fragment_flags() {
        let payload: Vec<u8> = (0..=239u8).collect();
        let frames =
            split_message(MsgType::ReadConfig, 17, FrameFlags::empty(), &payload).unwrap();
        assert_eq!(frames.len(), 2);

        assert_eq!(frames[0].header.frag_idx(), 0);
        assert_eq!(frames[0].header.frag_cnt(), 2);
        assert!(frames[0].header.flags().is_fragment());
        assert!(!frames[0].header.flags().last_fragment());
        assert_eq!(frames[0].payload.len(), 200);

        assert_eq!(frames[1].header.frag_idx(), 1);
        assert!(frames[1].header.flags().is_fragment());
        assert!(frames[1].header.flags().last_fragment());
        assert_eq!(frames[1].payload.len(), 40);

        let rebuilt: Vec<u8> = frames.iter().flat_map(|f| f.payload.to_vec()).collect();
        assert_eq!(rebuilt, payload);

        for frame in &frames {
            assert_eq!(frame.header.sequence(), 17);
        }
    }

    #[test]
    fn reject_over_total_limit() {
        let payload = vec![0u8; 241];
        let err = split_message(MsgType::WriteConfig, 0, FrameFlags::empty(), &payload)
            .unwrap_err();
        assert_eq!(err, ProtocolError::MessageTooLarge { len: 241, max: 240 });
    }
}
