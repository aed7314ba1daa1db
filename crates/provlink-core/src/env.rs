//! Environment abstraction for deterministic testing.
//!
//! Decouples the link state machines from system time. Production code uses
//! [`SystemEnv`]; tests drive the machines with a virtual clock (tokio's
//! paused time, or a plain counter for the pure state machines).

use std::time::Duration;

/// Abstract environment providing monotonic time and sleeping.
///
/// # Invariants
///
/// `now()` never goes backwards within one execution context; the
/// reassembly aging and retry deadlines rely on it.
pub trait Environment: Clone + Send + Sync + 'static {
    /// The instant type used by this environment.
    ///
    /// Production environments use `std::time::Instant`; simulated ones may
    /// use virtual time.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Sleep for `duration`.
    ///
    /// The only async method in the trait; used by driver code, never by
    /// the pure state machines.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;
}

/// Production environment: `std::time::Instant` and tokio sleep.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
