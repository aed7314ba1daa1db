//! In-memory lossy link pair.
//!
//! Two [`SimLink`] endpoints joined by unbounded channels. Loss is
//! injected per endpoint: a [`DropHandle`] schedules the next N outbound
//! datagrams to vanish, the way a radio frame vanishes — the sender sees
//! success. A dead counterpart also behaves like a silent radio: sends
//! succeed, receives pend forever.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use bytes::Bytes;
use provlink_core::{
    link::{Link, LinkError},
    peer::PeerAddr,
};
use tokio::sync::mpsc;
use tracing::trace;

/// Schedules outbound drops on one endpoint.
#[derive(Debug, Clone)]
pub struct DropHandle(Arc<AtomicUsize>);

impl DropHandle {
    /// Drop the next `n` outbound datagrams.
    pub fn drop_next(&self, n: usize) {
        self.0.fetch_add(n, Ordering::SeqCst);
    }
}

/// One endpoint of an in-memory point-to-point link.
pub struct SimLink {
    addr: PeerAddr,
    tx: mpsc::UnboundedSender<(PeerAddr, Bytes)>,
    rx: mpsc::UnboundedReceiver<(PeerAddr, Bytes)>,
    drops: Arc<AtomicUsize>,
}

impl SimLink {
    /// Connected pair; each side is addressed by its own peer address.
    #[must_use]
    pub fn pair(a: PeerAddr, b: PeerAddr) -> (Self, Self) {
        let (a_tx, b_rx) = mpsc::unbounded_channel();
        let (b_tx, a_rx) = mpsc::unbounded_channel();
        (
            Self { addr: a, tx: a_tx, rx: a_rx, drops: Arc::new(AtomicUsize::new(0)) },
            Self { addr: b, tx: b_tx, rx: b_rx, drops: Arc::new(AtomicUsize::new(0)) },
        )
    }

    /// Handle for scheduling outbound loss on this endpoint.
    #[must_use]
    pub fn drop_handle(&self) -> DropHandle {
        DropHandle(Arc::clone(&self.drops))
    }

    /// Discard everything queued for this endpoint (radio dark during a
    /// reboot).
    pub fn drain(&mut self) {
        while self.rx.try_recv().is_ok() {}
    }
}

#[async_trait]
impl Link for SimLink {
    async fn send(&mut self, peer: PeerAddr, datagram: Bytes) -> Result<(), LinkError> {
        let scheduled_drop = self
            .drops
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if scheduled_drop {
            trace!(from = %self.addr, to = %peer, len = datagram.len(), "datagram lost");
            return Ok(());
        }
        // A closed counterpart is a silent radio, not a send failure.
        let _ = self.tx.send((self.addr, datagram));
        Ok(())
    }

    async fn recv(&mut self) -> Result<(PeerAddr, Bytes), LinkError> {
        match self.rx.recv().await {
            Some(received) => Ok(received),
            None => std::future::pending().await,
        }
    }
}
