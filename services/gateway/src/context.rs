//! Process-scoped gateway state
//!
//! One [`GatewayContext`] is built at startup and shared by every actor
//! behavior. It holds the collaborators, the frozen dispatch tables and the
//! client roster. Nothing here is reached through a global.

use crate::actors::{handler_tables, spawn, ActorState, HandlerTables};
use crate::dial::DialGateways;
use crate::engine::{CallEngine, EngineOperation};
use crate::error::EngineError;
use crate::grammar::Grammar;
use crate::transport::Transport;
use parking_lot::Mutex;
use rayo_actors::{Actor, ActorSpec, Message, MessageBus, Registry};
use rayo_config::GatewayConfig;
use rayo_types::Stanza;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Whether a client wants to be offered calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Availability {
    Online,
    Offline,
}

/// Client address → availability
#[derive(Debug, Default)]
pub struct Roster {
    clients: Mutex<BTreeMap<String, Availability>>,
}

impl Roster {
    pub fn set(&self, client: &str, availability: Availability) {
        let previous = self.clients.lock().insert(client.to_string(), availability);
        if previous != Some(availability) {
            debug!(client, availability = ?availability, "Client availability changed");
        }
    }

    /// Mark online only if nothing is known yet
    pub fn set_if_unknown(&self, client: &str, availability: Availability) {
        self.clients
            .lock()
            .entry(client.to_string())
            .or_insert(availability);
    }

    pub fn get(&self, client: &str) -> Option<Availability> {
        self.clients.lock().get(client).copied()
    }

    pub fn remove(&self, client: &str) {
        self.clients.lock().remove(client);
    }

    pub fn online(&self) -> Vec<String> {
        self.clients
            .lock()
            .iter()
            .filter(|(_, availability)| **availability == Availability::Online)
            .map(|(client, _)| client.clone())
            .collect()
    }
}

pub struct GatewayContext {
    pub(crate) registry: Registry,
    pub(crate) bus: MessageBus,
    pub(crate) tables: HandlerTables,
    pub(crate) engine: Arc<dyn CallEngine>,
    pub(crate) grammar: Arc<dyn Grammar>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) config: GatewayConfig,
    pub(crate) dial: DialGateways,
    pub(crate) roster: Roster,
}

impl GatewayContext {
    pub fn new(
        config: GatewayConfig,
        registry: Registry,
        bus: MessageBus,
        engine: Arc<dyn CallEngine>,
        grammar: Arc<dyn Grammar>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let dial = DialGateways::new(&config.dial_gateways);
        Self {
            registry,
            bus,
            tables: handler_tables(),
            engine,
            grammar,
            transport,
            config,
            dial,
            roster: Roster::default(),
        }
    }

    pub fn domain(&self) -> &str {
        &self.config.domain.name
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn tables(&self) -> &HandlerTables {
        &self.tables
    }

    /// `id@domain`, the address of calls and mixers
    pub fn address_for(&self, id: &str) -> String {
        format!("{}@{}", id, self.domain())
    }

    /// Run an engine operation, logging refusals
    pub fn execute(&self, operation: EngineOperation) -> Result<(), EngineError> {
        let name = operation.name();
        debug!(operation = name, "Engine operation");
        self.engine.execute(operation).map_err(|error| {
            warn!(operation = name, error = %error, "Engine refused operation");
            error
        })
    }
}

/// What a handler sees: the shared context and the actor it runs for
pub struct HandlerCtx<'a> {
    pub gateway: &'a Arc<GatewayContext>,
    pub actor: &'a Arc<Actor>,
}

impl<'a> HandlerCtx<'a> {
    pub fn new(gateway: &'a Arc<GatewayContext>, actor: &'a Arc<Actor>) -> Self {
        Self { gateway, actor }
    }

    pub fn address(&self) -> &str {
        self.actor.address().unwrap_or_default()
    }

    #[track_caller]
    pub fn send(&self, to: &str, payload: Stanza) {
        self.gateway.bus.send(self.actor, to, payload);
    }

    #[track_caller]
    pub fn reply(&self, to: &str, payload: Stanza) {
        self.gateway.bus.reply(self.actor, to, payload);
    }

    /// Answer `msg` with `payload`
    #[track_caller]
    pub fn respond(&self, msg: &Message, payload: Stanza) {
        self.gateway.bus.reply(self.actor, &msg.from, payload);
    }

    pub fn execute(&self, operation: EngineOperation) -> Result<(), EngineError> {
        self.gateway.execute(operation)
    }

    /// Create a new actor running `state`
    pub fn spawn(&self, spec: ActorSpec, state: ActorState) -> rayo_actors::Result<Arc<Actor>> {
        spawn(self.gateway, spec, state)
    }

    /// Drop this actor's creation reference and make it unreachable
    pub fn destroy(&self) -> bool {
        self.gateway.registry.destroy(self.actor)
    }
}
