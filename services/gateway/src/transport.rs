//! Transport Interface
//!
//! Sockets, TLS, SASL and dialback live outside the gateway. The transport
//! announces streams through the gateway's `on_ready`/`on_received`/
//! `on_destroyed` callbacks and receives outbound stanzas through
//! [`Transport::send`].

use rayo_types::Stanza;
use std::fmt;

/// Stream direction as seen by the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamKind {
    /// A client connected directly to this gateway
    Client,
    /// Another server connected to us; its users appear as clients
    InboundServer,
}

/// An authenticated stream
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamInfo {
    pub id: u64,
    pub kind: StreamKind,
    /// Full client address, or the peer's domain for server streams
    pub address: String,
}

impl StreamInfo {
    pub fn client(id: u64, address: impl Into<String>) -> Self {
        Self {
            id,
            kind: StreamKind::Client,
            address: address.into(),
        }
    }

    pub fn inbound_server(id: u64, domain: impl Into<String>) -> Self {
        Self {
            id,
            kind: StreamKind::InboundServer,
            address: domain.into(),
        }
    }
}

impl fmt::Display for StreamInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream-{}({})", self.id, self.address)
    }
}

/// Outbound half of the transport
pub trait Transport: Send + Sync {
    /// Push a stanza to the remote entity at `peer_address`
    fn send(&self, peer_address: &str, stanza: &Stanza);
}
