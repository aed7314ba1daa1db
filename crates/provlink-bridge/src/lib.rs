//! Host-side bridge of the provisioning link.
//!
//! The bridge is driven by a line-delimited JSON operator channel: each
//! request line becomes one job — a conversation of framed messages with a
//! single peer device — and each job produces exactly one response line.
//! One job runs at a time; the [`job::JobState`] record rejects operator
//! requests that arrive while a job is in flight.

pub mod channel;
pub mod convert;
pub mod error;
pub mod executor;
pub mod job;
pub mod ops;
pub mod request;

pub use channel::{ChannelOutcome, OperatorChannel};
pub use error::BridgeError;
pub use job::{JobState, JobStatus};
pub use ops::{BridgeDispatcher, BridgeIdentity};
pub use request::{ErrorCode, OperatorRequest};
