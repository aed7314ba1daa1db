//! Six-octet peer addressing.
//!
//! Operator requests name devices by a six-octet address in colon- or
//! bare-hex form (`AA:BB:CC:DD:EE:01` or `AABBCCDDEE01`). On the wire the
//! address is carried by the transport, not the frame header.

use std::{fmt, str::FromStr};

use thiserror::Error;

/// Failure to parse a textual peer address.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid peer address {input:?}")]
pub struct PeerAddrParseError {
    /// The rejected input.
    pub input: String,
}

/// Six-octet link-layer address of one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PeerAddr([u8; 6]);

impl PeerAddr {
    /// Construct from raw octets.
    #[must_use]
    pub const fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    /// Raw octets.
    #[must_use]
    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }
}

impl fmt::Display for PeerAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for PeerAddr {
    type Err = PeerAddrParseError;

    /// Accepts colon-separated or bare hex, case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || PeerAddrParseError { input: s.to_owned() };

        let hex: String = s.chars().filter(|&c| c != ':').collect();
        if hex.len() != 12 || s.matches(':').count() > 5 {
            return Err(err());
        }

        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = u8::from_str_radix(&hex[2 * i..2 * i + 2], 16).map_err(|_| err())?;
        }
        Ok(Self(octets))
    }
}
