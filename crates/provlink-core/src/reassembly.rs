//! Single-slot fragment reassembly.
//!
//! Each endpoint holds at most one in-flight reassembly. A fragment whose
//! `(peer, sequence, msg_type)` tuple differs from the slot's displaces any
//! incomplete prior message; interleaved fragmentation from two peers is
//! deliberately unsupported. A slot idle longer than
//! [`DEFAULT_REASSEMBLY_TIMEOUT`] is discarded.

use std::{ops::Sub, time::Duration};

use bytes::Bytes;
use provlink_proto::FrameHeader;

use crate::message::MessageKey;

/// Inactivity window after which an incomplete slot is discarded.
pub const DEFAULT_REASSEMBLY_TIMEOUT: Duration = Duration::from_millis(1200);

struct Slot<I> {
    key: MessageKey,
    parts: Vec<Option<Bytes>>,
    last_activity: I,
}

/// One-slot reassembly buffer, generic over the instant type so tests can
/// drive it with a virtual clock.
pub struct ReassemblyBuffer<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    slot: Option<Slot<I>>,
    timeout: Duration,
}

impl<I> ReassemblyBuffer<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    /// Buffer with the standard 1200 ms inactivity window.
    #[must_use]
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_REASSEMBLY_TIMEOUT)
    }

    /// Buffer with a custom inactivity window.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self { slot: None, timeout }
    }

    /// Accept one fragment; returns the full payload once every index has
    /// arrived.
    ///
    /// A fragment for a new tuple reinitializes the slot, dropping any
    /// incomplete message. A reassembled total over
    /// [`FrameHeader::MAX_MESSAGE_PAYLOAD`] is discarded wholesale.
    pub fn accept(
        &mut self,
        now: I,
        key: MessageKey,
        frag_idx: u8,
        frag_cnt: u8,
        payload: Bytes,
    ) -> Option<Bytes> {
        self.expire(now);

        let reinit = match &self.slot {
            Some(slot) => slot.key != key || slot.parts.len() != usize::from(frag_cnt),
            None => true,
        };
        if reinit {
            self.slot = Some(Slot {
                key,
                parts: vec![None; usize::from(frag_cnt)],
                last_activity: now,
            });
        }

        let Some(slot) = self.slot.as_mut() else {
            return None;
        };

        let Some(part) = slot.parts.get_mut(usize::from(frag_idx)) else {
            return None;
        };
        *part = Some(payload);
        slot.last_activity = now;

        if slot.parts.iter().any(Option::is_none) {
            return None;
        }

        let total: usize = slot.parts.iter().flatten().map(Bytes::len).sum();
        let parts = self
            .slot
            .take()
            .map(|slot| slot.parts)
            .unwrap_or_default();

        if total > FrameHeader::MAX_MESSAGE_PAYLOAD {
            return None;
        }

        let mut full = Vec::with_capacity(total);
        for part in parts.into_iter().flatten() {
            full.extend_from_slice(&part);
        }
        Some(Bytes::from(full))
    }

    /// Discard the slot if it has been idle past the timeout. Returns
    /// whether a slot was discarded.
    pub fn expire(&mut self, now: I) -> bool {
        let stale = self
            .slot
            .as_ref()
            .is_some_and(|slot| now > slot.last_activity && now - slot.last_activity > self.timeout);
        if stale {
            self.slot = None;
        }
        stale
    }

    /// Whether a reassembly is currently in flight.
    #[must_use]
    pub fn is_collecting(&self) -> bool {
        self.slot.is_some()
    }
}

impl<I> Default for ReassemblyBuffer<I>
where
    I: Copy + Ord + Send + Sync + Sub<Output = Duration>,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use proptest::prelude::*;

    use super::*;
    use crate::peer::PeerAddr;

    /// Virtual clock: milliseconds since an arbitrary origin.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    struct Tick(u64);

    impl Sub for Tick {
        type Output = Duration;

        fn sub(self, rhs: Self) -> Duration {
            Duration::from_millis(self.0 - rhs.0)
        }
    }

    fn key(seq: u16) -> MessageKey {
        MessageKey {
            peer: PeerAddr::new([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0x01]),
            sequence: seq,
            msg_type: 0x10,
        }
    }

    #[test]
    fn two_fragments_in_order() {
        let mut buf = ReassemblyBuffer::new();
        assert_eq!(buf.accept(Tick(0), key(1), 0, 2, Bytes::from_static(b"ab")), None);
        let full = buf.accept(Tick(10), key(1), 1, 2, Bytes::from_static(b"cd")).unwrap();
        assert_eq!(&full[..], b"abcd");
        assert!(!buf.is_collecting());
    }

    #[test]
    fn out_of_order_fragments_deliver_in_index_order() {
        let mut buf = ReassemblyBuffer::new();
        assert_eq!(buf.accept(Tick(0), key(1), 2, 3, Bytes::from_static(b"3")), None);
        assert_eq!(buf.accept(Tick(1), key(1), 0, 3, Bytes::from_static(b"1")), None);
        let full = buf.accept(Tick(2), key(1), 1, 3, Bytes::from_static(b"2")).unwrap();
        assert_eq!(&full[..], b"123");
    }

    #[test]
    fn duplicate_fragment_overwrites_in_place() {
        let mut buf = ReassemblyBuffer::new();
        assert_eq!(buf.accept(Tick(0), key(1), 0, 2, Bytes::from_static(b"ab")), None);
        assert_eq!(buf.accept(Tick(1), key(1), 0, 2, Bytes::from_static(b"ab")), None);
        let full = buf.accept(Tick(2), key(1), 1, 2, Bytes::from_static(b"cd")).unwrap();
        assert_eq!(&full[..], b"abcd");
    }

    #[test]
    fn new_tuple_displaces_incomplete_slot() {
        let mut buf = ReassemblyBuffer::new();
        assert_eq!(buf.accept(Tick(0), key(1), 0, 2, Bytes::from_static(b"xx")), None);
        // Same peer, new sequence: prior half-built message is gone.
        assert_eq!(buf.accept(Tick(1), key(2), 0, 2, Bytes::from_static(b"ab")), None);
        let full = buf.accept(Tick(2), key(2), 1, 2, Bytes::from_static(b"cd")).unwrap();
        assert_eq!(&full[..], b"abcd");
        // The displaced message can no longer complete.
        assert_eq!(buf.accept(Tick(3), key(1), 1, 2, Bytes::from_static(b"yy")), None);
    }

    #[test]
    fn idle_slot_ages_out() {
        let mut buf = ReassemblyBuffer::new();
        assert_eq!(buf.accept(Tick(0), key(1), 0, 2, Bytes::from_static(b"ab")), None);

        assert!(!buf.expire(Tick(1200)));
        assert!(buf.is_collecting());

        assert!(buf.expire(Tick(1201)));
        assert!(!buf.is_collecting());

        // The late second fragment starts a fresh (incomplete) slot.
        assert_eq!(buf.accept(Tick(1300), key(1), 1, 2, Bytes::from_static(b"cd")), None);
    }

    #[test]
    fn aging_applies_on_accept_too() {
        let mut buf = ReassemblyBuffer::new();
        assert_eq!(buf.accept(Tick(0), key(1), 0, 2, Bytes::from_static(b"ab")), None);
        // Arrives after the window: the stale half must not complete.
        assert_eq!(buf.accept(Tick(2000), key(1), 1, 2, Bytes::from_static(b"cd")), None);
    }

    #[test]
    fn oversize_total_is_discarded() {
        let mut buf = ReassemblyBuffer::new();
        let chunk = Bytes::from(vec![0u8; 200]);
        assert_eq!(buf.accept(Tick(0), key(1), 0, 2, chunk.clone()), None);
        // 200 + 41 > 240
        assert_eq!(buf.accept(Tick(1), key(1), 1, 2, Bytes::from(vec![0u8; 41])), None);
        assert!(!buf.is_collecting());
    }

    proptest! {
        /// Fragments of one message arriving in any permutation within the
        /// window reassemble to the payload in index order.
        #[test]
        fn any_permutation_reassembles(
            parts in prop::collection::vec(prop::collection::vec(any::<u8>(), 1..80), 1..4),
            order in any::<prop::sample::Index>(),
        ) {
            let cnt = parts.len() as u8;
            let mut indices: Vec<u8> = (0..cnt).collect();
            // Rotate by an arbitrary offset for a cheap permutation.
            indices.rotate_left(order.index(parts.len()));

            let mut buf = ReassemblyBuffer::new();
            let mut delivered = None;
            for (step, &idx) in indices.iter().enumerate() {
                let out = buf.accept(
                    Tick(step as u64 * 100),
                    key(9),
                    idx,
                    cnt,
                    Bytes::from(parts[usize::from(idx)].clone()),
                );
                if out.is_some() {
                    delivered = out;
                }
            }

            let expected: Vec<u8> = parts.iter().flatten().copied().collect();
            prop_assert_eq!(delivered.unwrap().to_vec(), expected);
        }
    }
}
