//! Bus message envelope

use crate::actor::Actor;
use crate::kind::ActorType;
use rayo_types::jid::bare_of;
use rayo_types::Stanza;
use std::panic::Location;

/// One queued delivery attempt
#[derive(Debug, Clone)]
pub struct Message {
    pub to: String,
    pub from: String,
    /// Sender kind, used to route events
    pub from_type: ActorType,
    pub payload: Stanza,
    /// Replies are never answered, even when undeliverable
    pub is_reply: bool,
    /// Call site that produced the message
    pub origin: &'static Location<'static>,
}

impl Message {
    /// Build a message from `from` to `to`. Missing addresses on the payload
    /// are filled in so the document stays self-describing.
    #[track_caller]
    pub fn new(from: &Actor, to: impl Into<String>, mut payload: Stanza, is_reply: bool) -> Self {
        let to = to.into();
        let from_address = from.address().unwrap_or_default().to_string();
        if payload.from.is_none() {
            payload.from = Some(from_address.clone());
        }
        if payload.to.is_none() {
            payload.to = Some(to.clone());
        }
        Self {
            to,
            from: from_address,
            from_type: from.actor_type(),
            payload,
            is_reply,
            origin: Location::caller(),
        }
    }

    /// Error reply for a message that could not be delivered. It appears to
    /// come from the address that was missing.
    pub(crate) fn bounce(undeliverable: &Message, payload: Stanza) -> Self {
        Self {
            to: undeliverable.from.clone(),
            from: undeliverable.to.clone(),
            from_type: ActorType::SERVER,
            payload,
            is_reply: true,
            origin: undeliverable.origin,
        }
    }

    /// Sender and destination share a bare address, e.g. a component
    /// talking to its own call.
    pub fn is_internal(&self) -> bool {
        !self.from.is_empty() && bare_of(&self.from) == bare_of(&self.to)
    }
}
