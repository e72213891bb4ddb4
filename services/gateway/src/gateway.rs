//! # Gateway
//!
//! Entry point for the embedding application. A [`Gateway`] owns the
//! registry, the bus and the shared context, and turns the outside world's
//! callbacks into bus messages:
//!
//! - **Transport**: [`on_ready`](Gateway::on_ready),
//!   [`on_received`](Gateway::on_received), [`on_destroyed`](Gateway::on_destroyed)
//! - **Engine**: [`on_engine_event`](Gateway::on_engine_event),
//!   [`offer_call`](Gateway::offer_call)
//! - **Operator**: [`console_command`](Gateway::console_command),
//!   [`status`](Gateway::status), [`stats`](Gateway::stats)
//!
//! [`GatewayBuilder::start`] runs bus workers and the idle sweeper.
//! [`GatewayBuilder::build`] runs neither; tests pump the queue with
//! [`Gateway::deliver_pending`] and sweep by hand.

use crate::actors::{spawn, ActorState, CallState, ClientState, MixerState, PeerState, ServerState};
use crate::console;
use crate::context::{Availability, GatewayContext};
use crate::engine::{CallEngine, EngineEvent, EngineOperation, RejectReason};
use crate::error::{GatewayError, Result};
use crate::grammar::Grammar;
use crate::status::status_lines;
use crate::transport::{StreamInfo, StreamKind, Transport};
use crossbeam_channel::{bounded, RecvTimeoutError, Sender};
use parking_lot::Mutex;
use rayo_actors::{
    Actor, ActorError, ActorKind, ActorSpec, ActorType, BusStats, MessageBus, Registry,
    RegistryStats, Subkind,
};
use rayo_config::GatewayConfig;
use rayo_types::{ns, Element, PresenceType, Stanza};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Combined runtime counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GatewayStats {
    pub bus: BusStats,
    pub registry: RegistryStats,
    pub streams: usize,
    pub online_clients: usize,
}

pub struct GatewayBuilder {
    config: GatewayConfig,
    engine: Option<Arc<dyn CallEngine>>,
    grammar: Option<Arc<dyn Grammar>>,
    transport: Option<Arc<dyn Transport>>,
}

impl GatewayBuilder {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            engine: None,
            grammar: None,
            transport: None,
        }
    }

    pub fn engine(mut self, engine: Arc<dyn CallEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    pub fn grammar(mut self, grammar: Arc<dyn Grammar>) -> Self {
        self.grammar = Some(grammar);
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Gateway without workers or sweeper
    pub fn build(self) -> Result<Gateway> {
        let missing = |field: &str| ActorError::configuration(format!("{} is required", field), Some(field));
        let engine = self.engine.ok_or_else(|| missing("engine"))?;
        let grammar = self.grammar.ok_or_else(|| missing("grammar"))?;
        let transport = self.transport.ok_or_else(|| missing("transport"))?;

        let registry = Registry::new();
        let bus = MessageBus::new(registry.clone(), self.config.settings.queue_capacity)?;
        let ctx = Arc::new(GatewayContext::new(self.config, registry, bus, engine, grammar, transport));

        let domain = ctx.domain().to_string();
        let server = spawn(
            &ctx,
            ActorSpec::new(ActorType::SERVER).with_id(domain.clone()).with_address(domain.clone()),
            ActorState::Server(ServerState::default()),
        )?;
        let console_address = format!("{}@{}/console", Uuid::new_v4(), domain);
        let console = spawn(
            &ctx,
            ActorSpec::new(ActorType::new(ActorKind::Client, Subkind::Console)).with_address(console_address),
            ActorState::Client(ClientState::default()),
        )?;
        info!(domain = %domain, "Gateway ready");

        Ok(Gateway {
            ctx,
            server,
            console,
            streams: Mutex::new(HashMap::new()),
            sweeper: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        })
    }

    /// Gateway with bus workers and the idle sweeper running
    pub fn start(self) -> Result<Gateway> {
        let workers = self.config.settings.message_threads;
        let sweep_every = self.config.settings.max_idle().max(Duration::from_secs(1));
        let gateway = self.build()?;
        gateway.ctx.bus.spawn_workers(workers)?;
        gateway.start_sweeper(sweep_every)?;
        Ok(gateway)
    }
}

struct Sweeper {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct Gateway {
    ctx: Arc<GatewayContext>,
    server: Arc<Actor>,
    console: Arc<Actor>,
    streams: Mutex<HashMap<u64, Arc<Actor>>>,
    sweeper: Mutex<Option<Sweeper>>,
    shut_down: AtomicBool,
}

impl Gateway {
    pub fn builder(config: GatewayConfig) -> GatewayBuilder {
        GatewayBuilder::new(config)
    }

    pub fn context(&self) -> &Arc<GatewayContext> {
        &self.ctx
    }

    pub fn domain(&self) -> &str {
        self.ctx.domain()
    }

    pub fn server_address(&self) -> &str {
        self.server.address().unwrap_or_default()
    }

    pub fn console_address(&self) -> &str {
        self.console.address().unwrap_or_default()
    }

    pub fn registry(&self) -> &Registry {
        &self.ctx.registry
    }

    /// Run queued deliveries on the calling thread, until the queue is empty
    pub fn deliver_pending(&self) -> usize {
        let mut total = 0;
        loop {
            let delivered = self.ctx.bus.deliver_pending();
            if delivered == 0 {
                return total;
            }
            total += delivered;
        }
    }

    fn start_sweeper(&self, every: Duration) -> Result<()> {
        let (stop, stopped) = bounded::<()>(1);
        let ctx = Arc::clone(&self.ctx);
        let server = Arc::clone(&self.server);
        let handle = std::thread::Builder::new()
            .name("rayo-idle-sweep".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(every) {
                    Err(RecvTimeoutError::Timeout) => {
                        sweep(&ctx, &server);
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })
            .map_err(|source| ActorError::Spawn {
                name: "rayo-idle-sweep".to_string(),
                source,
            })?;
        *self.sweeper.lock() = Some(Sweeper { stop, handle });
        info!(interval_secs = every.as_secs(), "Idle sweeper started");
        Ok(())
    }

    /// Ask every call to check itself for idleness
    pub fn sweep_idle(&self) -> usize {
        sweep(&self.ctx, &self.server)
    }

    // transport callbacks

    /// A stream finished negotiating
    pub fn on_ready(&self, stream: &StreamInfo) -> Result<()> {
        let (actor_type, state) = match stream.kind {
            StreamKind::Client => (ActorType::CLIENT, ActorState::Client(ClientState::default())),
            StreamKind::InboundServer => (ActorType::PEER_SERVER, ActorState::PeerServer(PeerState::default())),
        };
        let actor = spawn(&self.ctx, ActorSpec::new(actor_type).with_address(stream.address.clone()), state)?;
        info!(stream = %stream, "Stream ready");
        self.streams.lock().insert(stream.id, actor);
        Ok(())
    }

    /// A stanza arrived on a stream
    pub fn on_received(&self, stream: &StreamInfo, mut stanza: Stanza) -> Result<()> {
        let source = self
            .streams
            .lock()
            .get(&stream.id)
            .cloned()
            .ok_or(GatewayError::UnknownStream { id: stream.id })?;

        let sender = match stream.kind {
            StreamKind::Client => {
                // the stream, not the stanza, says who is talking
                stanza.from = source.address().map(str::to_string);
                source
            }
            StreamKind::InboundServer => match stanza.from.as_deref().filter(|from| !from.is_empty()) {
                Some(from) => self.peer_client(&source, from)?,
                None => {
                    warn!(stream = %stream, "Stanza from peer without a from address dropped");
                    return Ok(());
                }
            },
        };
        let client = sender.address().unwrap_or_default().to_string();
        let to = stanza
            .to
            .clone()
            .filter(|to| !to.is_empty())
            .unwrap_or_else(|| self.domain().to_string());

        if stanza.is_presence() && to == self.domain() {
            self.update_availability(&client, &stanza);
            return Ok(());
        }
        self.ctx.roster.set_if_unknown(&client, Availability::Online);
        self.ctx.bus.send(&sender, &to, stanza);
        Ok(())
    }

    /// Client behind a peer stream, created on first contact
    fn peer_client(&self, peer: &Arc<Actor>, from: &str) -> Result<Arc<Actor>> {
        if let Some(lease) = self.ctx.registry.lookup_by_address(from) {
            return Ok(Arc::clone(&lease));
        }
        let peer_address = peer.address().unwrap_or_default();
        let client = spawn(
            &self.ctx,
            ActorSpec::new(ActorType::CLIENT).with_address(from),
            ActorState::Client(ClientState::via(peer_address)),
        )?;
        let learned = Stanza::presence(PresenceType::Available)
            .with_child(Element::ns("client-learned", ns::INTERNAL).with_attr("jid", from));
        self.ctx.bus.send(&self.server, peer_address, learned);
        debug!(client = from, peer = peer_address, "Peer client created");
        Ok(client)
    }

    fn update_availability(&self, client: &str, presence: &Stanza) {
        let availability = match presence.presence_type() {
            Some(PresenceType::Unavailable) => Availability::Offline,
            Some(PresenceType::Available) => {
                let show = presence
                    .children
                    .iter()
                    .find(|child| child.name == "show")
                    .and_then(Element::text);
                match show {
                    Some("away" | "dnd" | "xa") => Availability::Offline,
                    _ => Availability::Online,
                }
            }
            _ => return,
        };
        self.ctx.roster.set(client, availability);
    }

    /// A stream closed
    pub fn on_destroyed(&self, stream: &StreamInfo) -> Result<()> {
        let actor = self
            .streams
            .lock()
            .remove(&stream.id)
            .ok_or(GatewayError::UnknownStream { id: stream.id })?;
        self.ctx.registry.destroy(&actor);
        info!(stream = %stream, "Stream closed");
        Ok(())
    }

    // engine callbacks

    /// Deliver an engine report to the actor it concerns
    pub fn on_engine_event(&self, event: EngineEvent) -> Result<()> {
        match &event {
            EngineEvent::Bridged { uuid, peer } => {
                self.deliver(uuid, &event)?;
                let other = EngineEvent::Bridged {
                    uuid: peer.clone(),
                    peer: uuid.clone(),
                };
                self.deliver(peer, &other)
            }
            EngineEvent::Unbridged { uuid, peer } => {
                self.deliver(uuid, &event)?;
                let other = EngineEvent::Unbridged {
                    uuid: peer.clone(),
                    peer: uuid.clone(),
                };
                self.deliver(peer, &other)
            }
            EngineEvent::MixerMemberAdded { mixer, uuid } => {
                self.ensure_mixer(mixer)?;
                self.deliver(uuid, &event)
            }
            EngineEvent::Ringing { uuid }
            | EngineEvent::Answered { uuid }
            | EngineEvent::JoinFailed { uuid, .. }
            | EngineEvent::MixerMemberRemoved { uuid, .. }
            | EngineEvent::CallEnded { uuid, .. } => self.deliver(uuid, &event),
            EngineEvent::MixerDestroyed { mixer } => self.deliver(mixer, &event),
            EngineEvent::OutputComplete { component, .. }
            | EngineEvent::InputDigit { component, .. }
            | EngineEvent::InputTimeout { component, .. }
            | EngineEvent::RecordComplete { component, .. } => self.deliver(component, &event),
        }
    }

    fn deliver(&self, id: &str, event: &EngineEvent) -> Result<()> {
        let address = {
            let lease = self
                .ctx
                .registry
                .lookup_by_id(id)
                .ok_or_else(|| ActorError::destination_not_found(id))?;
            lease.address().unwrap_or_default().to_string()
        };
        debug!(event = %event, to = %address, "Engine event");
        let presence = Stanza::presence(PresenceType::Available).with_child(event.to_element());
        self.ctx.bus.send(&self.server, &address, presence);
        Ok(())
    }

    fn ensure_mixer(&self, name: &str) -> Result<()> {
        if self.ctx.registry.lookup_by_id(name).is_some() {
            return Ok(());
        }
        let spec = ActorSpec::new(ActorType::MIXER)
            .with_id(name)
            .with_address(self.ctx.address_for(name));
        match spawn(&self.ctx, spec, ActorState::Mixer(MixerState::new(name))) {
            Ok(_) => {
                info!(mixer = name, "Mixer created");
                Ok(())
            }
            // lost a race with another engine thread
            Err(ActorError::AddressConflict { .. }) => Ok(()),
            Err(error) => Err(error.into()),
        }
    }

    /// Offer an inbound call to every online client. Returns the call's
    /// address.
    pub fn offer_call(&self, uuid: &str, from: &str, to: &str, headers: &[(String, String)]) -> Result<String> {
        let clients = self.ctx.roster.online();
        if clients.is_empty() {
            warn!(uuid, "No clients online, rejecting call");
            let _ = self.ctx.execute(EngineOperation::Hangup {
                uuid: uuid.to_string(),
                reason: RejectReason::Busy.as_str().to_string(),
                headers: Vec::new(),
            });
            return Err(GatewayError::NoClientsAvailable { uuid: uuid.to_string() });
        }

        let address = self.ctx.address_for(uuid);
        let call = spawn(
            &self.ctx,
            ActorSpec::new(ActorType::CALL).with_id(uuid).with_address(address.clone()),
            ActorState::Call(CallState::offered(uuid, clients.iter().cloned())),
        )?;

        let mut offer = Element::ns("offer", ns::RAYO).with_attr("to", to).with_attr("from", from);
        for (name, value) in headers {
            offer.push(Element::new("header").with_attr("name", name.clone()).with_attr("value", value.clone()));
        }
        let presence = Stanza::presence(PresenceType::Available).with_child(offer);
        for client in &clients {
            self.ctx.bus.send_copy(&call, client, &presence);
        }
        info!(uuid, offered_to = clients.len(), "Call offered");
        Ok(address)
    }

    // operator surface

    /// Send the request behind `alias` from the console to `jid`. Returns
    /// the request id.
    pub fn console_command(&self, jid: &str, alias: &str) -> Result<String> {
        let id = format!("console-{}", self.console.next_seq());
        let request = console::request(alias, id.clone()).ok_or_else(|| GatewayError::UnknownAlias {
            alias: alias.to_string(),
        })?;
        debug!(jid, alias, id = %id, "Console command");
        self.ctx.bus.send(&self.console, jid, request);
        Ok(id)
    }

    pub fn status(&self) -> Vec<String> {
        status_lines(&self.ctx.registry.snapshot())
    }

    pub fn stats(&self) -> GatewayStats {
        GatewayStats {
            bus: self.ctx.bus.stats(),
            registry: self.ctx.registry.stats(),
            streams: self.streams.lock().len(),
            online_clients: self.ctx.roster.online().len(),
        }
    }

    /// Stop the sweeper and the bus, then drop every actor
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(sweeper) = self.sweeper.lock().take() {
            let _ = sweeper.stop.send(());
            if sweeper.handle.join().is_err() {
                warn!("Idle sweeper panicked");
            }
        }
        self.ctx.bus.shutdown();
        self.streams.lock().clear();
        let discarded = self.ctx.registry.clear();
        info!(discarded, "Gateway shut down");
    }
}

impl Drop for Gateway {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn sweep(ctx: &GatewayContext, server: &Actor) -> usize {
    let calls = ctx.registry.addresses_of(ActorType::CALL);
    let check = Stanza::presence(PresenceType::Available).with_child(Element::ns("idle-check", ns::INTERNAL));
    for call in &calls {
        ctx.bus.send_copy(server, call, &check);
    }
    debug!(calls = calls.len(), "Idle sweep");
    calls.len()
}
