//! Datagram link abstraction.
//!
//! The protocol runs over any unreliable, bounded-MTU datagram transport
//! that can address peers by their six-octet identity. [`UdpLink`] is the
//! host-side rendition: an explicit peer table maps link addresses to
//! socket addresses, mirroring the add-peer-before-send discipline of the
//! proprietary radio link; datagrams from unregistered senders are dropped.

use std::{collections::HashMap, net::SocketAddr};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::net::UdpSocket;

use crate::peer::PeerAddr;

/// Link failures.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The send primitive failed.
    #[error("send failed: {0}")]
    Send(String),

    /// The receive primitive failed.
    #[error("receive failed: {0}")]
    Recv(String),

    /// No transport mapping for the addressed peer.
    #[error("unknown peer {0}")]
    UnknownPeer(PeerAddr),

    /// The link is no longer usable.
    #[error("link closed")]
    Closed,
}

/// One endpoint's datagram link.
///
/// `recv` resolves the sender to a peer address; implementations drop
/// datagrams from senders they cannot attribute.
#[async_trait]
pub trait Link: Send {
    /// Send one datagram to `peer`.
    async fn send(&mut self, peer: PeerAddr, datagram: Bytes) -> Result<(), LinkError>;

    /// Receive the next datagram and its attributed sender.
    async fn recv(&mut self) -> Result<(PeerAddr, Bytes), LinkError>;
}

/// Maximum datagram this link ever carries: 13-byte header + 200 payload.
const MAX_DATAGRAM: usize = 213;

/// UDP rendition of the datagram link with an explicit peer table.
pub struct UdpLink {
    socket: UdpSocket,
    by_peer: HashMap<PeerAddr, SocketAddr>,
    by_socket: HashMap<SocketAddr, PeerAddr>,
}

impl UdpLink {
    /// Bind a socket for this endpoint.
    pub async fn bind(addr: SocketAddr) -> Result<Self, LinkError> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| LinkError::Send(format!("bind {addr}: {e}")))?;
        Ok(Self { socket, by_peer: HashMap::new(), by_socket: HashMap::new() })
    }

    /// Local socket address (useful when bound to port 0).
    pub fn local_addr(&self) -> Result<SocketAddr, LinkError> {
        self.socket.local_addr().map_err(|e| LinkError::Send(e.to_string()))
    }

    /// Map a peer's link address to its socket address.
    ///
    /// Re-registering replaces the previous mapping.
    pub fn register_peer(&mut self, peer: PeerAddr, addr: SocketAddr) {
        if let Some(old) = self.by_peer.insert(peer, addr) {
            self.by_socket.remove(&old);
        }
        self.by_socket.insert(addr, peer);
    }
}

#[async_trait]
impl Link for UdpLink {
    async fn send(&mut self, peer: PeerAddr, datagram: Bytes) -> Result<(), LinkError> {
        let addr = *self.by_peer.get(&peer).ok_or(LinkError::UnknownPeer(peer))?;
        let sent = self
            .socket
            .send_to(&datagram, addr)
            .await
            .map_err(|e| LinkError::Send(format!("to {peer}: {e}")))?;
        if sent != datagram.len() {
            return Err(LinkError::Send(format!(
                "short write to {peer}: {sent} of {} bytes",
                datagram.len()
            )));
        }
        Ok(())
    }

    async fn recv(&mut self) -> Result<(PeerAddr, Bytes), LinkError> {
        let mut buf = [0u8; MAX_DATAGRAM + 1];
        loop {
            let (len, from) = self
                .socket
                .recv_from(&mut buf)
                .await
                .map_err(|e| LinkError::Recv(e.to_string()))?;
            match self.by_socket.get(&from) {
                Some(&peer) => return Ok((peer, Bytes::copy_from_slice(&buf[..len]))),
                None => {
                    tracing::trace!(%from, len, "dropping datagram from unregistered sender");
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    fn peer(tail: u8) -> PeerAddr {
        PeerAddr::new([0x02, 0, 0, 0, 0, tail])
    }

    #[tokio::test]
    async fn registered_peers_exchange_datagrams() {
        let mut a = UdpLink::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let mut b = UdpLink::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        a.register_peer(peer(2), b.local_addr().unwrap());
        b.register_peer(peer(1), a.local_addr().unwrap());

        a.send(peer(2), Bytes::from_static(b"hello")).await.unwrap();
        let (from, datagram) = b.recv().await.unwrap();
        assert_eq!(from, peer(1));
        assert_eq!(&datagram[..], b"hello");
    }

    #[tokio::test]
    async fn send_to_unknown_peer_fails() {
        let mut a = UdpLink::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let err = a.send(peer(9), Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, LinkError::UnknownPeer(p) if p == peer(9)));
    }

    #[tokio::test]
    async fn unregistered_sender_is_dropped() {
        let mut a = UdpLink::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let mut rogue = UdpLink::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let mut b = UdpLink::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();

        rogue.register_peer(peer(1), a.local_addr().unwrap());
        b.register_peer(peer(1), a.local_addr().unwrap());
        a.register_peer(peer(2), b.local_addr().unwrap());

        rogue.send(peer(1), Bytes::from_static(b"noise")).await.unwrap();
        b.send(peer(1), Bytes::from_static(b"real")).await.unwrap();

        // Only the registered sender's datagram surfaces.
        let (from, datagram) = a.recv().await.unwrap();
        assert_eq!(from, peer(2));
        assert_eq!(&datagram[..], b"real");
    }
}
