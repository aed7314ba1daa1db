//! Bridge job record.
//!
//! Exactly one operator request may be in flight; a second request while
//! `status == Busy` is rejected with `BUSY`. The record also owns the
//! bridge's monotonic sequence counter, so every job gets a fresh sequence
//! and composite ops can reuse one sequence across their chained steps.

use provlink_core::peer::PeerAddr;
use thiserror::Error;

/// Rejection when a job is already in flight.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("bridge busy")]
pub struct Busy;

/// Whether a job is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// No job in flight.
    Idle,
    /// One job in flight.
    Busy,
}

/// The bridge's single-job record.
#[derive(Debug)]
pub struct JobState {
    status: JobStatus,
    current_id: Option<String>,
    current_peer: Option<PeerAddr>,
    seq_counter: u16,
}

impl JobState {
    /// Idle record, sequences starting at 1.
    #[must_use]
    pub fn new() -> Self {
        Self { status: JobStatus::Idle, current_id: None, current_peer: None, seq_counter: 1 }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Operator id of the in-flight job, if any.
    #[must_use]
    pub fn current_id(&self) -> Option<&str> {
        self.current_id.as_deref()
    }

    /// Peer of the in-flight job, if any.
    #[must_use]
    pub fn current_peer(&self) -> Option<PeerAddr> {
        self.current_peer
    }

    /// Claim the record for one job and allocate its sequence.
    ///
    /// # Errors
    ///
    /// [`Busy`] when a job is already in flight; the caller must reject the
    /// operator request without touching the wire.
    pub fn begin(&mut self, id: &str, peer: PeerAddr) -> Result<u16, Busy> {
        if self.status == JobStatus::Busy {
            return Err(Busy);
        }
        self.status = JobStatus::Busy;
        self.current_id = Some(id.to_owned());
        self.current_peer = Some(peer);

        let sequence = self.seq_counter;
        // Wraps modulo 2^16 by design.
        self.seq_counter = self.seq_counter.wrapping_add(1);
        Ok(sequence)
    }

    /// Release the record. Must run on every path out of a job, success or
    /// failure, or the bridge wedges.
    pub fn clear(&mut self) {
        self.status = JobStatus::Idle;
        self.current_id = None;
        self.current_peer = None;
    }
}

impl Default for JobState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn peer() -> PeerAddr {
        PeerAddr::new([1, 2, 3, 4, 5, 6])
    }

    #[test]
    fn begin_allocates_fresh_sequences() {
        let mut job = JobState::new();
        let first = job.begin("a", peer()).unwrap();
        job.clear();
        let second = job.begin("b", peer()).unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 2);
    }

    #[test]
    fn busy_until_cleared() {
        let mut job = JobState::new();
        job.begin("a", peer()).unwrap();
        assert_eq!(job.status(), JobStatus::Busy);
        assert_eq!(job.begin("b", peer()), Err(Busy));

        job.clear();
        assert_eq!(job.status(), JobStatus::Idle);
        assert!(job.begin("b", peer()).is_ok());
    }

    #[test]
    fn sequence_wraps_modulo_u16() {
        let mut job = JobState::new();
        for _ in 0..u32::from(u16::MAX) {
            job.begin("x", peer()).unwrap();
            job.clear();
        }
        // Counter started at 1, so after 2^16 - 1 jobs it has wrapped to 0.
        assert_eq!(job.begin("y", peer()).unwrap(), 0);
    }
}
