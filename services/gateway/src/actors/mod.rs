//! Gateway actors
//!
//! Every actor the gateway creates runs the same [`GatewayActor`] behavior
//! over a closed [`ActorState`]. Incoming stanzas are routed by kind:
//!
//! - **`iq` get/set**: command table, keyed by the destination's type
//! - **`iq` result/error**: answers to requests this actor sent
//! - **`presence`**: event table, keyed by sender and destination types
//!
//! Handlers are plain functions over one state variant. The
//! [`CommandHandler`]/[`EventHandler`] enums pair each function with the
//! variant it expects, so a handler can only ever see its own kind of state.

pub mod call;
pub mod client;
pub mod component;
pub mod input;
pub mod mixer;
pub mod output;
pub mod prompt;
pub mod record;
pub mod server;

use crate::context::{GatewayContext, HandlerCtx};
use rayo_actors::{
    Actor, ActorBehavior, ActorError, ActorSpec, ActorType, CommandKey, DispatchTables, Message,
    Subkind,
};
use rayo_types::{ns, IqType, PresenceType, Stanza, StanzaError, StanzaKind};
use std::sync::Arc;
use tracing::{debug, error, warn};

pub use call::CallState;
pub use client::{ClientState, PeerState};
pub use input::InputState;
pub use mixer::MixerState;
pub use output::OutputState;
pub use prompt::PromptComponent;
pub use record::RecordState;
pub use server::ServerState;

/// Immediate answer to a command; `None` when the answer comes later
pub type Reply = Option<Stanza>;

/// Private state of one actor
#[derive(Debug)]
pub enum ActorState {
    Server(ServerState),
    PeerServer(PeerState),
    Client(ClientState),
    Call(CallState),
    Mixer(MixerState),
    Output(OutputState),
    Input(InputState),
    Prompt(PromptComponent),
    Record(RecordState),
}

#[derive(Clone, Copy)]
pub enum CommandHandler {
    Server(fn(&mut ServerState, &HandlerCtx<'_>, &Message) -> Reply),
    Call(fn(&mut CallState, &HandlerCtx<'_>, &Message) -> Reply),
    Mixer(fn(&mut MixerState, &HandlerCtx<'_>, &Message) -> Reply),
    Output(fn(&mut OutputState, &HandlerCtx<'_>, &Message) -> Reply),
    Input(fn(&mut InputState, &HandlerCtx<'_>, &Message) -> Reply),
    Prompt(fn(&mut PromptComponent, &HandlerCtx<'_>, &Message) -> Reply),
    Record(fn(&mut RecordState, &HandlerCtx<'_>, &Message) -> Reply),
}

#[derive(Clone, Copy)]
pub enum EventHandler {
    PeerServer(fn(&mut PeerState, &HandlerCtx<'_>, &Message)),
    Call(fn(&mut CallState, &HandlerCtx<'_>, &Message)),
    Mixer(fn(&mut MixerState, &HandlerCtx<'_>, &Message)),
    Output(fn(&mut OutputState, &HandlerCtx<'_>, &Message)),
    Input(fn(&mut InputState, &HandlerCtx<'_>, &Message)),
    Prompt(fn(&mut PromptComponent, &HandlerCtx<'_>, &Message)),
    Record(fn(&mut RecordState, &HandlerCtx<'_>, &Message)),
}

pub type HandlerTables = DispatchTables<CommandHandler, EventHandler>;

impl CommandHandler {
    /// Admission checks for the actor's kind, then the handler itself
    fn invoke(self, state: &mut ActorState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
        let admitted = |check: Result<(), Stanza>| check.err();
        match (self, state) {
            (CommandHandler::Server(f), ActorState::Server(s)) => f(s, ctx, msg),
            (CommandHandler::Call(f), ActorState::Call(s)) => {
                admitted(call::admit(s, msg)).or_else(|| f(s, ctx, msg))
            }
            (CommandHandler::Mixer(f), ActorState::Mixer(s)) => {
                admitted(component::require_id(msg)).or_else(|| f(s, ctx, msg))
            }
            (CommandHandler::Output(f), ActorState::Output(s)) => {
                admitted(component::admit(s.client(), msg)).or_else(|| f(s, ctx, msg))
            }
            (CommandHandler::Input(f), ActorState::Input(s)) => {
                admitted(component::admit(s.client(), msg)).or_else(|| f(s, ctx, msg))
            }
            (CommandHandler::Prompt(f), ActorState::Prompt(s)) => {
                admitted(component::admit(s.client(), msg)).or_else(|| f(s, ctx, msg))
            }
            (CommandHandler::Record(f), ActorState::Record(s)) => {
                admitted(component::admit(s.client(), msg)).or_else(|| f(s, ctx, msg))
            }
            (_, state) => {
                error!(actor = %ctx.actor.label(), state = state.name(), "Command handler registered for wrong state");
                Some(msg.payload.error_reply(StanzaError::InternalServerError))
            }
        }
    }
}

impl EventHandler {
    fn invoke(self, state: &mut ActorState, ctx: &HandlerCtx<'_>, msg: &Message) {
        match (self, state) {
            (EventHandler::PeerServer(f), ActorState::PeerServer(s)) => f(s, ctx, msg),
            (EventHandler::Call(f), ActorState::Call(s)) => f(s, ctx, msg),
            (EventHandler::Mixer(f), ActorState::Mixer(s)) => f(s, ctx, msg),
            (EventHandler::Output(f), ActorState::Output(s)) => f(s, ctx, msg),
            (EventHandler::Input(f), ActorState::Input(s)) => f(s, ctx, msg),
            (EventHandler::Prompt(f), ActorState::Prompt(s)) => f(s, ctx, msg),
            (EventHandler::Record(f), ActorState::Record(s)) => f(s, ctx, msg),
            (_, state) => {
                error!(actor = %ctx.actor.label(), state = state.name(), "Event handler registered for wrong state")
            }
        }
    }
}

impl ActorState {
    pub fn name(&self) -> &'static str {
        match self {
            ActorState::Server(_) => "server",
            ActorState::PeerServer(_) => "peer-server",
            ActorState::Client(_) => "client",
            ActorState::Call(_) => "call",
            ActorState::Mixer(_) => "mixer",
            ActorState::Output(_) => "output",
            ActorState::Input(_) => "input",
            ActorState::Prompt(_) => "prompt",
            ActorState::Record(_) => "record",
        }
    }
}

/// The behavior shared by every gateway actor
pub struct GatewayActor {
    ctx: Arc<GatewayContext>,
    state: ActorState,
}

impl GatewayActor {
    pub fn new(ctx: Arc<GatewayContext>, state: ActorState) -> Self {
        Self { ctx, state }
    }

    fn on_command(&mut self, ctx: &HandlerCtx<'_>, msg: &Message) {
        let actor_type = ctx.actor.actor_type();
        let Some(handler) = ctx.gateway.tables.find_command(actor_type, &msg.payload).copied() else {
            if !msg.is_reply {
                if let Some(key) = CommandKey::for_payload(actor_type, &msg.payload) {
                    debug!(error = %ActorError::handler_not_found(key), from = %msg.from, "Command not implemented");
                }
                ctx.respond(msg, msg.payload.error_reply(StanzaError::FeatureNotImplemented));
            }
            return;
        };
        if let Some(reply) = handler.invoke(&mut self.state, ctx, msg) {
            ctx.respond(msg, reply);
        }
    }

    fn on_response(&mut self, ctx: &HandlerCtx<'_>, msg: &Message) {
        match &mut self.state {
            ActorState::Prompt(prompt) => prompt::on_response(prompt, ctx, msg),
            state => debug!(
                actor = %ctx.actor.label(),
                state = state.name(),
                from = %msg.from,
                id = msg.payload.id.as_deref().unwrap_or(""),
                "Unsolicited response dropped"
            ),
        }
    }

    fn on_event(&mut self, ctx: &HandlerCtx<'_>, msg: &Message) {
        let handler = ctx
            .gateway
            .tables
            .find_event(msg.from_type, ctx.actor.actor_type(), &msg.payload)
            .copied();
        match handler {
            Some(handler) => handler.invoke(&mut self.state, ctx, msg),
            None => debug!(
                actor = %ctx.actor.label(),
                from = %msg.from,
                from_type = %msg.from_type,
                "Unhandled event dropped"
            ),
        }
    }
}

impl ActorBehavior for GatewayActor {
    fn receive(&mut self, actor: &Arc<Actor>, msg: Message) {
        let gateway = Arc::clone(&self.ctx);
        let ctx = HandlerCtx::new(&gateway, actor);
        match &mut self.state {
            ActorState::Client(_) => return client::deliver(&ctx, &msg),
            ActorState::PeerServer(_) if !client::is_internal_event(&msg) => {
                return client::deliver(&ctx, &msg)
            }
            _ => {}
        }
        match msg.payload.kind {
            StanzaKind::Iq(IqType::Get | IqType::Set) => self.on_command(&ctx, &msg),
            StanzaKind::Iq(IqType::Result | IqType::Error) => self.on_response(&ctx, &msg),
            StanzaKind::Presence(_) => self.on_event(&ctx, &msg),
            StanzaKind::Message => {
                debug!(actor = %actor.label(), from = %msg.from, "Message stanza dropped")
            }
        }
    }

    fn cleanup(&mut self, actor: &Actor) {
        match &mut self.state {
            ActorState::Call(call) => call::cleanup(call, &self.ctx, actor),
            ActorState::Client(_) => client::cleanup_client(&self.ctx, actor),
            ActorState::PeerServer(peer) => client::cleanup_peer(peer, &self.ctx, actor),
            ActorState::Mixer(mixer) => mixer::cleanup(mixer, actor),
            _ => {}
        }
    }
}

/// Register an actor running `state` under the gateway context
pub fn spawn(
    ctx: &Arc<GatewayContext>,
    spec: ActorSpec,
    state: ActorState,
) -> rayo_actors::Result<Arc<Actor>> {
    let behavior = GatewayActor::new(Arc::clone(ctx), state);
    ctx.registry.create(spec, Box::new(behavior))
}

const OUTPUT_CONTROLS: [&str; 7] = [
    "pause",
    "resume",
    "speed-up",
    "speed-down",
    "volume-up",
    "volume-down",
    "seek",
];

/// Build the command and event tables
pub fn handler_tables() -> HandlerTables {
    use PresenceType::{Available, Unavailable};

    let call_output = ActorType::call_component(Subkind::Output);
    let mixer_output = ActorType::mixer_component(Subkind::Output);
    let call_input = ActorType::call_component(Subkind::Input);
    let call_prompt = ActorType::call_component(Subkind::Prompt);
    let call_record = ActorType::call_component(Subkind::Record);

    let mut tables = HandlerTables::builder();

    // server
    tables
        .register_command(ActorType::SERVER, IqType::Get, ns::PING, "ping", CommandHandler::Server(server::ping))
        .register_command(ActorType::SERVER, IqType::Get, ns::DISCO_INFO, "query", CommandHandler::Server(server::disco))
        .register_command(ActorType::SERVER, IqType::Set, ns::RAYO, "dial", CommandHandler::Server(server::dial))
        .register_event(
            ActorType::SERVER,
            ActorType::PEER_SERVER,
            Available,
            ns::INTERNAL,
            "client-learned",
            EventHandler::PeerServer(client::client_learned),
        );

    // calls
    let call_commands: [(&str, &str, fn(&mut CallState, &HandlerCtx<'_>, &Message) -> Reply); 11] = [
        (ns::RAYO, "accept", call::accept),
        (ns::RAYO, "answer", call::answer),
        (ns::RAYO, "redirect", call::redirect),
        (ns::RAYO, "hangup", call::hangup),
        (ns::RAYO, "reject", call::reject),
        (ns::RAYO, "join", call::join),
        (ns::RAYO, "unjoin", call::unjoin),
        (ns::OUTPUT, "output", call::output),
        (ns::INPUT, "input", call::input),
        (ns::PROMPT, "prompt", call::prompt),
        (ns::RECORD, "record", call::record),
    ];
    for (namespace, name, handler) in call_commands {
        tables.register_command(ActorType::CALL, IqType::Set, namespace, name, CommandHandler::Call(handler));
    }
    let call_events: [(&str, fn(&mut CallState, &HandlerCtx<'_>, &Message)); 8] = [
        ("ringing", call::on_ringing),
        ("answered", call::on_answered),
        ("bridged", call::on_bridged),
        ("unbridged", call::on_unbridged),
        ("join-failed", call::on_join_failed),
        ("mixer-joined", call::on_mixer_joined),
        ("mixer-left", call::on_mixer_left),
        ("ended", call::on_ended),
    ];
    for (name, handler) in call_events {
        tables.register_event(ActorType::SERVER, ActorType::CALL, Available, ns::ENGINE, name, EventHandler::Call(handler));
    }
    tables.register_event(
        ActorType::SERVER,
        ActorType::CALL,
        Available,
        ns::INTERNAL,
        "idle-check",
        EventHandler::Call(call::on_idle_check),
    );
    for component in [call_output, call_input, call_prompt, call_record] {
        tables.register_event(
            component,
            ActorType::CALL,
            Available,
            ns::INTERNAL,
            component::COMPONENT_DONE,
            EventHandler::Call(call::on_component_done),
        );
    }

    // mixers
    tables
        .register_command(ActorType::MIXER, IqType::Set, ns::OUTPUT, "output", CommandHandler::Mixer(mixer::output))
        .register_event(
            ActorType::CALL,
            ActorType::MIXER,
            Available,
            ns::INTERNAL,
            "member-joined",
            EventHandler::Mixer(mixer::on_member_joined),
        )
        .register_event(
            ActorType::CALL,
            ActorType::MIXER,
            Available,
            ns::INTERNAL,
            "member-left",
            EventHandler::Mixer(mixer::on_member_left),
        )
        .register_event(
            ActorType::SERVER,
            ActorType::MIXER,
            Available,
            ns::ENGINE,
            "destroyed",
            EventHandler::Mixer(mixer::on_destroyed),
        )
        .register_event(
            mixer_output,
            ActorType::MIXER,
            Available,
            ns::INTERNAL,
            component::COMPONENT_DONE,
            EventHandler::Mixer(mixer::on_component_done),
        );

    // output components, on calls and on mixers
    for (owner, output_type) in [(ActorType::CALL, call_output), (ActorType::MIXER, mixer_output)] {
        tables.register_command(output_type, IqType::Set, ns::RAYO_EXT, "stop", CommandHandler::Output(output::stop));
        for control in OUTPUT_CONTROLS {
            tables.register_command(output_type, IqType::Set, ns::OUTPUT, control, CommandHandler::Output(output::control));
        }
        tables
            .register_event(
                ActorType::SERVER,
                output_type,
                Available,
                ns::ENGINE,
                "output-complete",
                EventHandler::Output(output::on_complete),
            )
            .register_event(owner, output_type, Available, ns::INTERNAL, "hangup", EventHandler::Output(output::on_hangup));
    }

    // input components
    tables
        .register_command(call_input, IqType::Set, ns::RAYO_EXT, "stop", CommandHandler::Input(input::stop))
        .register_command(call_input, IqType::Set, ns::INPUT, "start-timers", CommandHandler::Input(input::start_timers))
        .register_event(ActorType::SERVER, call_input, Available, ns::ENGINE, "dtmf", EventHandler::Input(input::on_digit))
        .register_event(
            ActorType::SERVER,
            call_input,
            Available,
            ns::ENGINE,
            "input-timeout",
            EventHandler::Input(input::on_timeout),
        )
        .register_event(ActorType::CALL, call_input, Available, ns::INTERNAL, "hangup", EventHandler::Input(input::on_hangup));

    // record components
    tables
        .register_command(call_record, IqType::Set, ns::RAYO_EXT, "stop", CommandHandler::Record(record::stop))
        .register_command(call_record, IqType::Set, ns::RECORD, "pause", CommandHandler::Record(record::control))
        .register_command(call_record, IqType::Set, ns::RECORD, "resume", CommandHandler::Record(record::control))
        .register_event(
            ActorType::SERVER,
            call_record,
            Available,
            ns::ENGINE,
            "record-complete",
            EventHandler::Record(record::on_complete),
        )
        .register_event(ActorType::CALL, call_record, Available, ns::INTERNAL, "hangup", EventHandler::Record(record::on_hangup));

    // prompt components
    tables.register_command(call_prompt, IqType::Set, ns::RAYO_EXT, "stop", CommandHandler::Prompt(prompt::stop));
    for control in OUTPUT_CONTROLS {
        tables.register_command(call_prompt, IqType::Set, ns::OUTPUT, control, CommandHandler::Prompt(prompt::control));
    }
    tables
        .register_event(ActorType::CALL, call_prompt, Available, ns::INTERNAL, "start", EventHandler::Prompt(prompt::on_start))
        .register_event(ActorType::CALL, call_prompt, Available, ns::INTERNAL, "hangup", EventHandler::Prompt(prompt::on_hangup))
        .register_event(
            call_output,
            call_prompt,
            Unavailable,
            ns::RAYO_EXT,
            "complete",
            EventHandler::Prompt(prompt::on_output_complete),
        )
        .register_event(
            call_input,
            call_prompt,
            Unavailable,
            ns::RAYO_EXT,
            "complete",
            EventHandler::Prompt(prompt::on_input_complete),
        )
        .register_event(
            call_input,
            call_prompt,
            Available,
            ns::INPUT,
            "start-of-input",
            EventHandler::Prompt(prompt::on_barge),
        );

    let tables = tables.build();
    if tables.command_count() == 0 {
        warn!("No command handlers registered");
    }
    debug!(commands = tables.command_count(), events = tables.event_count(), "Dispatch tables built");
    tables
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayo_types::Element;

    #[test]
    fn test_tables_cover_every_kind() {
        let tables = handler_tables();
        let set = |name: &str, namespace: &str| {
            Stanza::iq(IqType::Set, "1").with_child(Element::ns(name, namespace))
        };

        assert!(tables.find_command(ActorType::CALL, &set("join", ns::RAYO)).is_some());
        assert!(tables.find_command(ActorType::CALL, &set("prompt", ns::PROMPT)).is_some());
        assert!(tables.find_command(ActorType::MIXER, &set("join", ns::RAYO)).is_none());
        assert!(tables
            .find_command(ActorType::mixer_component(Subkind::Output), &set("seek", ns::OUTPUT))
            .is_some());
        assert!(tables
            .find_command(ActorType::call_component(Subkind::Prompt), &set("volume-down", ns::OUTPUT))
            .is_some());
        assert!(tables
            .find_command(ActorType::call_component(Subkind::Input), &set("pause", ns::OUTPUT))
            .is_none());
        assert!(tables.find_command(ActorType::CALL, &set("record", ns::RECORD)).is_some());
        assert!(tables
            .find_command(ActorType::call_component(Subkind::Record), &set("pause", ns::RECORD))
            .is_some());
        let disco = Stanza::iq(IqType::Get, "2").with_child(Element::ns("query", ns::DISCO_INFO));
        assert!(tables.find_command(ActorType::SERVER, &disco).is_some());

        let done = Stanza::presence(PresenceType::Available)
            .with_child(Element::ns(component::COMPONENT_DONE, ns::INTERNAL));
        for subkind in [Subkind::Output, Subkind::Input, Subkind::Prompt, Subkind::Record] {
            assert!(tables
                .find_event(ActorType::call_component(subkind), ActorType::CALL, &done)
                .is_some());
        }
        assert!(tables
            .find_event(ActorType::mixer_component(Subkind::Output), ActorType::MIXER, &done)
            .is_some());

        let complete = Stanza::presence(PresenceType::Unavailable)
            .with_child(Element::ns("complete", ns::RAYO_EXT));
        assert!(tables
            .find_event(
                ActorType::call_component(Subkind::Input),
                ActorType::call_component(Subkind::Prompt),
                &complete
            )
            .is_some());
        // a client cannot impersonate a child
        assert!(tables
            .find_event(ActorType::CLIENT, ActorType::call_component(Subkind::Prompt), &complete)
            .is_none());
    }
}
