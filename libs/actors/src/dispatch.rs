//! Dispatch Tables
//!
//! Two read-only maps from typed keys to handler values, one for commands
//! (`iq` requests addressed to an actor) and one for events (`presence`
//! notifications between actors). Both are filled once through a
//! [`DispatchTablesBuilder`] at startup; lookups afterwards need no locking.
//!
//! Handler values are generic so each gateway decides its own signature.

use crate::kind::ActorType;
use rayo_types::{IqType, PresenceType, Stanza};
use std::collections::HashMap;
use std::fmt;
use tracing::{debug, warn};

/// Destination kind plus the request verb parsed from the payload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandKey {
    pub target: ActorType,
    pub iq_type: IqType,
    pub namespace: String,
    pub name: String,
}

impl CommandKey {
    pub fn new(target: ActorType, iq_type: IqType, namespace: &str, name: &str) -> Self {
        Self {
            target,
            iq_type,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Key for an `iq` payload; `None` for other stanza kinds
    pub fn for_payload(target: ActorType, payload: &Stanza) -> Option<Self> {
        let iq_type = payload.iq_type()?;
        let (namespace, name) = element_key(payload);
        Some(Self::new(target, iq_type, namespace, name))
    }
}

impl fmt::Display for CommandKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}",
            self.target,
            self.iq_type.as_str(),
            self.namespace,
            self.name
        )
    }
}

/// Sender kind, destination kind and the event parsed from the payload
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    pub source: ActorType,
    pub target: ActorType,
    pub presence_type: PresenceType,
    pub namespace: String,
    pub name: String,
}

impl EventKey {
    pub fn new(
        source: ActorType,
        target: ActorType,
        presence_type: PresenceType,
        namespace: &str,
        name: &str,
    ) -> Self {
        Self {
            source,
            target,
            presence_type,
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }

    /// Key for a `presence` payload; `None` for other stanza kinds
    pub fn for_payload(source: ActorType, target: ActorType, payload: &Stanza) -> Option<Self> {
        let presence_type = payload.presence_type()?;
        let (namespace, name) = element_key(payload);
        Some(Self::new(source, target, presence_type, namespace, name))
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{}:{}",
            self.source,
            self.target,
            self.presence_type.as_str(),
            self.namespace,
            self.name
        )
    }
}

fn element_key(payload: &Stanza) -> (&str, &str) {
    match payload.payload() {
        Some(element) => (element.namespace().unwrap_or(""), element.name.as_str()),
        None => ("", ""),
    }
}

/// Frozen command and event tables
pub struct DispatchTables<C, E> {
    commands: HashMap<CommandKey, C>,
    events: HashMap<EventKey, E>,
}

impl<C, E> DispatchTables<C, E> {
    pub fn builder() -> DispatchTablesBuilder<C, E> {
        DispatchTablesBuilder::new()
    }

    /// Handler for a command addressed to an actor of `target` type
    pub fn find_command(&self, target: ActorType, payload: &Stanza) -> Option<&C> {
        let key = CommandKey::for_payload(target, payload)?;
        let handler = self.commands.get(&key);
        if handler.is_none() {
            debug!(key = %key, "No command handler");
        }
        handler
    }

    /// Handler for an event sent by `source` to an actor of `target` type
    pub fn find_event(&self, source: ActorType, target: ActorType, payload: &Stanza) -> Option<&E> {
        let key = EventKey::for_payload(source, target, payload)?;
        let handler = self.events.get(&key);
        if handler.is_none() {
            debug!(key = %key, "No event handler");
        }
        handler
    }

    pub fn command_count(&self) -> usize {
        self.commands.len()
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }
}

impl<C, E> fmt::Debug for DispatchTables<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchTables")
            .field("commands", &self.commands.len())
            .field("events", &self.events.len())
            .finish()
    }
}

/// Mutable tables, only used while the gateway starts
pub struct DispatchTablesBuilder<C, E> {
    commands: HashMap<CommandKey, C>,
    events: HashMap<EventKey, E>,
}

impl<C, E> Default for DispatchTablesBuilder<C, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C, E> DispatchTablesBuilder<C, E> {
    pub fn new() -> Self {
        Self {
            commands: HashMap::new(),
            events: HashMap::new(),
        }
    }

    pub fn register_command(
        &mut self,
        target: ActorType,
        iq_type: IqType,
        namespace: &str,
        name: &str,
        handler: C,
    ) -> &mut Self {
        let key = CommandKey::new(target, iq_type, namespace, name);
        debug!(key = %key, "Registering command handler");
        if self.commands.insert(key.clone(), handler).is_some() {
            warn!(key = %key, "Command handler replaced");
        }
        self
    }

    pub fn register_event(
        &mut self,
        source: ActorType,
        target: ActorType,
        presence_type: PresenceType,
        namespace: &str,
        name: &str,
        handler: E,
    ) -> &mut Self {
        let key = EventKey::new(source, target, presence_type, namespace, name);
        debug!(key = %key, "Registering event handler");
        if self.events.insert(key.clone(), handler).is_some() {
            warn!(key = %key, "Event handler replaced");
        }
        self
    }

    pub fn build(self) -> DispatchTables<C, E> {
        DispatchTables {
            commands: self.commands,
            events: self.events,
        }
    }
}
