//! Send/wait/retry executor.
//!
//! One step = one framed request to one peer: fragment, send with pacing,
//! then wait for a frame matching `(peer, sequence, expected ack type)`
//! within the step timeout. No match retries the whole send with the same
//! sequence, up to the attempt budget; the device's dedup cache makes the
//! retries harmless. A matching negative acknowledgment ends the step
//! immediately.

use std::time::Duration;

use bytes::Bytes;
use provlink_core::{
    env::Environment, link::Link, message::MessageKey, peer::PeerAddr,
    reassembly::ReassemblyBuffer,
};
use provlink_proto::{Frame, FrameFlags, MsgType, ProtocolError, Value, split_message};
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Pause between fragments of one message.
pub const INTER_FRAGMENT_PACING: Duration = Duration::from_millis(5);

/// One request/ack exchange to drive.
#[derive(Debug, Clone)]
pub struct Step {
    /// Request message type.
    pub request: MsgType,
    /// Acknowledgment type that completes the step.
    pub expect: MsgType,
    /// Encoded request payload (may be empty).
    pub payload: Vec<u8>,
    /// Per-attempt wait budget.
    pub timeout: Duration,
    /// Total attempts, at least 1.
    pub attempts: u32,
}

/// Step failure, mapped to an operator error code by the dispatcher.
#[derive(Debug, Error)]
pub enum StepError {
    /// No matching acknowledgment within the retry budget.
    #[error("no matching acknowledgment within the retry budget")]
    NoAck,

    /// The peer answered with a negative acknowledgment.
    #[error("peer rejected the request: {code}")]
    Nack {
        /// Remote error code (logged, not forwarded to the operator).
        code: String,
        /// Remote message.
        msg: String,
    },

    /// The transport send primitive failed on every attempt.
    #[error("transport send failed: {0}")]
    Tx(String),

    /// The request could not be framed.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

enum WaitOutcome {
    Ack(Bytes),
    Nack { code: String, msg: String },
    LinkFailed(String),
}

/// Drives steps over a link; owns the bridge-side reassembly slot for
/// fragmented acknowledgments.
pub struct Executor<E: Environment> {
    env: E,
    reassembly: ReassemblyBuffer<E::Instant>,
}

impl<E: Environment> Executor<E> {
    /// Executor over `env`'s clock.
    pub fn new(env: E) -> Self {
        Self { env, reassembly: ReassemblyBuffer::new() }
    }

    /// Run one step against `peer` with `sequence`, returning the matching
    /// acknowledgment's reassembled payload.
    pub async fn send_and_wait<L: Link>(
        &mut self,
        link: &mut L,
        peer: PeerAddr,
        sequence: u16,
        step: &Step,
    ) -> Result<Bytes, StepError> {
        let frames =
            split_message(step.request, sequence, FrameFlags::ACK_REQUESTED, &step.payload)?;

        let mut last_err = StepError::NoAck;
        for attempt in 1..=step.attempts.max(1) {
            if let Err(err) = self.send_fragments(link, peer, &frames).await {
                warn!(%peer, attempt, %err, "send failed");
                last_err = StepError::Tx(err.to_string());
                continue;
            }

            let env = self.env.clone();
            let outcome = tokio::select! {
                outcome = self.wait_for_match(link, peer, sequence, step.expect) => outcome,
                () = env.sleep(step.timeout) => {
                    debug!(%peer, sequence, attempt, "ack timeout");
                    last_err = StepError::NoAck;
                    continue;
                },
            };

            match outcome {
                WaitOutcome::Ack(payload) => return Ok(payload),
                WaitOutcome::Nack { code, msg } => return Err(StepError::Nack { code, msg }),
                WaitOutcome::LinkFailed(msg) => {
                    warn!(%peer, attempt, %msg, "link failed while waiting");
                    last_err = StepError::Tx(msg);
                },
            }
        }
        Err(last_err)
    }

    async fn send_fragments<L: Link>(
        &self,
        link: &mut L,
        peer: PeerAddr,
        frames: &[Frame],
    ) -> Result<(), provlink_core::link::LinkError> {
        for (idx, frame) in frames.iter().enumerate() {
            if idx > 0 {
                self.env.sleep(INTER_FRAGMENT_PACING).await;
            }
            link.send(peer, frame.encode()).await?;
        }
        Ok(())
    }

    /// Wait for a complete message from `peer` with `sequence` that is
    /// either the expected ack or a nack. Everything else is dropped.
    async fn wait_for_match<L: Link>(
        &mut self,
        link: &mut L,
        peer: PeerAddr,
        sequence: u16,
        expect: MsgType,
    ) -> WaitOutcome {
        loop {
            self.reassembly.expire(self.env.now());

            let (from, datagram) = match link.recv().await {
                Ok(received) => received,
                Err(err) => return WaitOutcome::LinkFailed(err.to_string()),
            };

            let Ok(frame) = Frame::decode(&datagram) else {
                trace!(%from, "dropping malformed frame");
                continue;
            };
            let header = frame.header;

            let payload = if header.flags().is_fragment() {
                let key = MessageKey::from_header(from, &header);
                match self.reassembly.accept(
                    self.env.now(),
                    key,
                    header.frag_idx(),
                    header.frag_cnt(),
                    frame.payload,
                ) {
                    Some(full) => full,
                    None => continue,
                }
            } else {
                frame.payload
            };

            if from != peer || header.sequence() != sequence {
                trace!(%from, sequence = header.sequence(), "ignoring unrelated frame");
                continue;
            }

            match header.msg_type() {
                Some(msg_type) if msg_type == expect => return WaitOutcome::Ack(payload),
                Some(MsgType::Nack) => {
                    let (code, msg) = parse_nack(&payload);
                    return WaitOutcome::Nack { code, msg };
                },
                _ => trace!(msg_type = header.msg_type_raw(), "ignoring unexpected type"),
            }
        }
    }
}

/// Best-effort `{code, msg}` extraction from a nack payload.
fn parse_nack(payload: &[u8]) -> (String, String) {
    let Ok(body) = Value::decode(payload) else {
        return (String::new(), String::new());
    };
    let field = |key: &str| {
        body.get(key)
            .and_then(Value::as_text)
            .unwrap_or_default()
            .to_owned()
    };
    (field("code"), field("msg"))
}
