//! Client and peer-server actors
//!
//! Both stand in for something on the far side of the transport; whatever
//! they receive goes out on the wire. A peer server also tracks the clients
//! it has introduced, and takes them down with it.

use crate::context::{GatewayContext, HandlerCtx};
use rayo_actors::{Actor, Message};
use rayo_types::{ns, StanzaKind};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Default)]
pub struct ClientState {
    /// Peer server the client is reached through
    peer: Option<String>,
}

impl ClientState {
    pub fn via(peer: impl Into<String>) -> Self {
        Self { peer: Some(peer.into()) }
    }

    pub fn peer(&self) -> Option<&str> {
        self.peer.as_deref()
    }
}

#[derive(Debug, Default)]
pub struct PeerState {
    clients: BTreeSet<String>,
}

impl PeerState {
    pub fn clients(&self) -> impl Iterator<Item = &str> {
        self.clients.iter().map(String::as_str)
    }
}

/// Hand a stanza to the transport for the actor's address
pub fn deliver(ctx: &HandlerCtx<'_>, msg: &Message) {
    debug!(to = ctx.address(), kind = msg.payload.kind.name(), "Delivering to transport");
    ctx.gateway.transport.send(ctx.address(), &msg.payload);
}

/// Gateway bookkeeping addressed to a peer rather than through it
pub fn is_internal_event(msg: &Message) -> bool {
    matches!(msg.payload.kind, StanzaKind::Presence(_))
        && msg
            .payload
            .payload()
            .and_then(|payload| payload.namespace())
            == Some(ns::INTERNAL)
}

/// A client was first seen on this peer's stream
pub fn client_learned(peer: &mut PeerState, ctx: &HandlerCtx<'_>, msg: &Message) {
    let Some(jid) = msg.payload.payload().and_then(|p| p.non_empty_attr("jid")) else {
        return;
    };
    if peer.clients.insert(jid.to_string()) {
        debug!(peer = ctx.address(), client = jid, "Peer client learned");
    }
}

pub fn cleanup_client(ctx: &Arc<GatewayContext>, actor: &Actor) {
    if let Some(address) = actor.address() {
        ctx.roster.remove(address);
        info!(client = address, "Client gone");
    }
}

pub fn cleanup_peer(peer: &mut PeerState, ctx: &Arc<GatewayContext>, actor: &Actor) {
    for client in std::mem::take(&mut peer.clients) {
        if let Some(lease) = ctx.registry.lookup_by_address(&client) {
            ctx.registry.destroy(&lease);
        }
    }
    info!(peer = actor.address().unwrap_or_default(), "Peer server gone");
}
