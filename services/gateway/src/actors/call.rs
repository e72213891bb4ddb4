//! Call actor
//!
//! One actor per engine session, addressed `uuid@domain`. It owns:
//!
//! - **Control**: the definitive controlling party (DCP) and, for offered
//!   calls, the potential controlling parties (PCPs) still racing for it
//! - **Join state**: see [`crate::join`]
//! - **Components**: outputs, inputs, prompts and recordings still running
//!   on it. Each one reports `component-done` when it finishes.
//!
//! The call never finalizes while a component still holds its parent
//! reference, so component completions always find the call in place.

use super::component::{component_spec, create, ref_element, uri_address};
use super::input::InputState;
use super::prompt::PromptComponent;
use super::{ActorState, Reply};
use crate::context::{GatewayContext, HandlerCtx};
use crate::engine::{EndReason, EngineEvent, EngineOperation, MediaDirection, RejectReason};
use crate::join::{JoinStatus, JoinTarget, PendingRequest};
use rayo_actors::{Actor, Message, Subkind};
use rayo_types::{ns, Element, Jid, PresenceType, Stanza, StanzaError};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub struct CallState {
    uuid: String,
    dcp: Option<String>,
    pcps: BTreeSet<String>,
    join: crate::join::JoinState,
    components: BTreeSet<String>,
    last_command: Instant,
    answered: bool,
    ended: bool,
    end_reason: Option<EndReason>,
}

impl CallState {
    fn new(uuid: &str) -> Self {
        Self {
            uuid: uuid.to_string(),
            dcp: None,
            pcps: BTreeSet::new(),
            join: crate::join::JoinState::new(),
            components: BTreeSet::new(),
            last_command: Instant::now(),
            answered: false,
            ended: false,
            end_reason: None,
        }
    }

    /// Call placed by `dcp`
    pub fn outbound(uuid: &str, dcp: &str) -> Self {
        let mut call = Self::new(uuid);
        call.dcp = Some(dcp.to_string());
        call
    }

    /// Inbound call offered to `pcps`; the first to command it wins
    pub fn offered(uuid: &str, pcps: impl IntoIterator<Item = String>) -> Self {
        let mut call = Self::new(uuid);
        call.pcps = pcps.into_iter().collect();
        call
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn dcp(&self) -> Option<&str> {
        self.dcp.as_deref()
    }

    pub fn pcps(&self) -> impl Iterator<Item = &str> {
        self.pcps.iter().map(String::as_str)
    }

    pub fn join_status(&self) -> &JoinStatus {
        self.join.status()
    }

    pub fn is_answered(&self) -> bool {
        self.answered
    }

    /// Components still running on the call
    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    pub fn idle_for(&self) -> Duration {
        self.last_command.elapsed()
    }

    /// Console and internal senders always pass. Otherwise the DCP passes,
    /// or, while there is none, a PCP (anyone, if there are no PCPs), who
    /// then becomes the DCP.
    fn has_control(&mut self, msg: &Message) -> bool {
        if msg.from_type.subkind == Subkind::Console || msg.is_internal() {
            return true;
        }
        match &self.dcp {
            Some(dcp) => dcp == &msg.from,
            None if self.pcps.is_empty() || self.pcps.remove(&msg.from) => {
                info!(uuid = %self.uuid, dcp = %msg.from, "Call control taken");
                self.dcp = Some(msg.from.clone());
                true
            }
            None => false,
        }
    }
}

/// Checks every command to a call goes through
pub(crate) fn admit(call: &mut CallState, msg: &Message) -> Result<(), Stanza> {
    let request = &msg.payload;
    if call.ended {
        return Err(request.error_reply_text(StanzaError::ServiceUnavailable, "call has ended"));
    }
    if request.request_id().is_none() {
        return Err(request.error_reply_text(StanzaError::BadRequest, "missing request id"));
    }
    if !call.has_control(msg) {
        debug!(uuid = %call.uuid, from = %msg.from, "Command from party without control");
        return Err(request.error_reply(StanzaError::Conflict));
    }
    call.last_command = Instant::now();
    Ok(())
}

/// `<header name value>` children as engine headers
pub fn headers_of(element: &Element) -> Vec<(String, String)> {
    element
        .children_named("header")
        .filter_map(|header| {
            let name = header.non_empty_attr("name")?;
            Some((name.to_string(), header.attr("value").unwrap_or_default().to_string()))
        })
        .collect()
}

fn engine_reply(ctx: &HandlerCtx<'_>, request: &Stanza, operation: EngineOperation) -> Reply {
    Some(match ctx.execute(operation) {
        Ok(()) => request.result_reply(),
        Err(error) => request.error_reply_text(error.condition(), error.to_string()),
    })
}

fn command_element(msg: &Message) -> Option<&Element> {
    msg.payload.payload()
}

pub fn accept(call: &mut CallState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    let headers = headers_of(command_element(msg)?);
    engine_reply(ctx, &msg.payload, EngineOperation::Accept { uuid: call.uuid.clone(), headers })
}

pub fn answer(call: &mut CallState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    let headers = headers_of(command_element(msg)?);
    engine_reply(ctx, &msg.payload, EngineOperation::Answer { uuid: call.uuid.clone(), headers })
}

pub fn redirect(call: &mut CallState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    let redirect = command_element(msg)?;
    let Some(to) = redirect.non_empty_attr("to") else {
        return Some(msg.payload.error_reply_text(StanzaError::BadRequest, "missing redirect to attribute"));
    };
    let operation = EngineOperation::Redirect {
        uuid: call.uuid.clone(),
        to: to.to_string(),
        headers: headers_of(redirect),
    };
    engine_reply(ctx, &msg.payload, operation)
}

pub fn hangup(call: &mut CallState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    let headers = headers_of(command_element(msg)?);
    call.end_reason = Some(EndReason::HangupCommand);
    let operation = EngineOperation::Hangup {
        uuid: call.uuid.clone(),
        reason: EndReason::Hangup.as_str().to_string(),
        headers,
    };
    engine_reply(ctx, &msg.payload, operation)
}

pub fn reject(call: &mut CallState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    let reject = command_element(msg)?;
    let reason = reject
        .children
        .iter()
        .find_map(|child| RejectReason::from_name(&child.name))
        .unwrap_or(RejectReason::Decline);
    call.end_reason = Some(EndReason::Reject);
    let operation = EngineOperation::Hangup {
        uuid: call.uuid.clone(),
        reason: reason.as_str().to_string(),
        headers: headers_of(reject),
    };
    engine_reply(ctx, &msg.payload, operation)
}

/// Read the target of a join or unjoin. A call target must be another,
/// live call when `must_exist` is set.
fn join_target(
    call: &CallState,
    ctx: &HandlerCtx<'_>,
    msg: &Message,
    must_exist: bool,
) -> Result<JoinTarget, Stanza> {
    let request = &msg.payload;
    let element = request.payload().ok_or_else(|| request.error_reply(StanzaError::BadRequest))?;
    match (element.non_empty_attr("call-uri"), element.non_empty_attr("mixer-name")) {
        (Some(uri), None) => {
            let address = uri_address(uri);
            let peer = address
                .parse::<Jid>()
                .ok()
                .and_then(|jid| jid.node().map(str::to_string))
                .ok_or_else(|| request.error_reply_text(StanzaError::BadRequest, "invalid call-uri"))?;
            if peer == call.uuid {
                return Err(request.error_reply_text(StanzaError::BadRequest, "can't join a call to itself"));
            }
            if must_exist && ctx.gateway.registry.lookup_by_id(&peer).is_none() {
                return Err(request.error_reply_text(StanzaError::ItemNotFound, "call-uri not found"));
            }
            Ok(JoinTarget::Call(peer))
        }
        (None, Some(name)) => Ok(JoinTarget::Mixer(name.to_string())),
        _ => Err(request.error_reply_text(
            StanzaError::BadRequest,
            "exactly one of mixer-name or call-uri is required",
        )),
    }
}

pub fn join(call: &mut CallState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    let request = &msg.payload;
    let target = match join_target(call, ctx, msg, true) {
        Ok(target) => target,
        Err(reply) => return Some(reply),
    };
    let operation = match &target {
        JoinTarget::Call(peer) => EngineOperation::Bridge {
            uuid: call.uuid.clone(),
            peer: peer.clone(),
        },
        JoinTarget::Mixer(name) => {
            let direction = request.payload().and_then(|join| join.attr("direction"));
            let Some(direction) = MediaDirection::parse(direction) else {
                return Some(request.error_reply_text(StanzaError::BadRequest, "invalid direction"));
            };
            EngineOperation::JoinMixer {
                uuid: call.uuid.clone(),
                mixer: name.clone(),
                direction,
                profile: ctx.gateway.config.settings.mixer_conf_profile.clone(),
            }
        }
    };
    if let Err(rejection) = call.join.request_join(target, request.clone()) {
        return Some(request.error_reply_text(rejection.condition(), rejection.text()));
    }
    match ctx.execute(operation) {
        // answered when the engine reports the join
        Ok(()) => None,
        Err(error) => {
            call.join.failed();
            Some(request.error_reply_text(error.condition(), error.to_string()))
        }
    }
}

pub fn unjoin(call: &mut CallState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    let request = &msg.payload;
    let target = match join_target(call, ctx, msg, false) {
        Ok(target) => target,
        Err(reply) => return Some(reply),
    };
    let operation = match &target {
        JoinTarget::Call(peer) => EngineOperation::Unbridge {
            uuid: call.uuid.clone(),
            peer: peer.clone(),
        },
        JoinTarget::Mixer(name) => EngineOperation::LeaveMixer {
            uuid: call.uuid.clone(),
            mixer: name.clone(),
        },
    };
    if let Err(rejection) = call.join.request_unjoin(target, request.clone()) {
        return Some(request.error_reply_text(rejection.condition(), rejection.text()));
    }
    match ctx.execute(operation) {
        Ok(()) => None,
        Err(error) => {
            call.join.failed();
            Some(request.error_reply_text(error.condition(), error.to_string()))
        }
    }
}

pub fn output(call: &mut CallState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    Some(match super::output::start(ctx, msg, &call.uuid) {
        Ok(address) => {
            let reply = msg.payload.result_with(ref_element(&address));
            call.components.insert(address);
            reply
        }
        Err(reply) => reply,
    })
}

pub fn input(call: &mut CallState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    let request = &msg.payload;
    let input = request.payload()?;
    let grammar = input
        .child("grammar")
        .and_then(|grammar| grammar.text())
        .unwrap_or_default();
    let matcher = match ctx.gateway.grammar.compile(grammar) {
        Ok(matcher) => matcher,
        Err(error) => return Some(request.error_reply_text(StanzaError::BadRequest, error.to_string())),
    };
    let start_timers = input.bool_attr("start-timers", true);
    let state = InputState::new(&msg.from, &call.uuid, matcher, input.bool_attr("barge-event", false), start_timers);
    let component = match create(ctx, msg, component_spec(ctx, Subkind::Input), ActorState::Input(state)) {
        Ok(component) => component,
        Err(reply) => return Some(reply),
    };
    let address = component.address().unwrap_or_default().to_string();
    let operation = EngineOperation::StartInput {
        component: address.clone(),
        uuid: call.uuid.clone(),
        start_timers,
    };
    match ctx.execute(operation) {
        Ok(()) => {
            call.components.insert(address.clone());
            Some(request.result_with(ref_element(&address)))
        }
        Err(error) => {
            ctx.gateway.registry.destroy(&component);
            Some(request.error_reply_text(error.condition(), error.to_string()))
        }
    }
}

pub fn record(call: &mut CallState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    Some(match super::record::start(ctx, msg, &call.uuid) {
        Ok(address) => {
            let reply = msg.payload.result_with(ref_element(&address));
            call.components.insert(address);
            reply
        }
        Err(reply) => reply,
    })
}

/// Start a prompt. The prompt answers the request itself once its output
/// is playing, so nothing is replied here on success.
pub fn prompt(call: &mut CallState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    let request = &msg.payload;
    let prompt = request.payload()?;
    let (Some(output), Some(input)) = (prompt.child_ns("output", ns::OUTPUT), prompt.child_ns("input", ns::INPUT)) else {
        return Some(request.error_reply_text(StanzaError::BadRequest, "prompt needs an output and an input"));
    };
    let state = PromptComponent::new(
        &msg.from,
        ctx.address(),
        request.clone(),
        output.clone(),
        input.clone(),
        prompt.bool_attr("barge-in", true),
    );
    let component = match create(ctx, msg, component_spec(ctx, Subkind::Prompt), ActorState::Prompt(state)) {
        Ok(component) => component,
        Err(reply) => return Some(reply),
    };
    let address = component.address().unwrap_or_default().to_string();
    ctx.send(&address, internal("start"));
    call.components.insert(address);
    None
}

fn internal(name: &str) -> Stanza {
    Stanza::presence(PresenceType::Available).with_child(Element::ns(name, ns::INTERNAL))
}

fn rayo_event(element: Element) -> Stanza {
    Stanza::presence(PresenceType::Available).with_child(element)
}

fn notify_dcp(call: &CallState, ctx: &HandlerCtx<'_>, element: Element) {
    if let Some(dcp) = &call.dcp {
        ctx.send(dcp, rayo_event(element));
    }
}

fn engine_event(call: &CallState, msg: &Message) -> Option<EngineEvent> {
    let event = msg.payload.payload().and_then(EngineEvent::from_element);
    if event.is_none() {
        warn!(uuid = %call.uuid, from = %msg.from, "Malformed engine event");
    }
    event
}

/// Answer the request a join event resolved
fn resolve(ctx: &HandlerCtx<'_>, pending: Option<PendingRequest>) {
    if let Some(pending) = pending {
        let requester = pending.request.from.clone().unwrap_or_default();
        ctx.reply(&requester, pending.request.result_reply());
    }
}

fn call_uri(ctx: &HandlerCtx<'_>, uuid: &str) -> String {
    format!("xmpp:{}", ctx.gateway.address_for(uuid))
}

pub fn on_ringing(call: &mut CallState, ctx: &HandlerCtx<'_>, _msg: &Message) {
    notify_dcp(call, ctx, Element::ns("ringing", ns::RAYO));
}

pub fn on_answered(call: &mut CallState, ctx: &HandlerCtx<'_>, _msg: &Message) {
    call.answered = true;
    notify_dcp(call, ctx, Element::ns("answered", ns::RAYO));
}

pub fn on_bridged(call: &mut CallState, ctx: &HandlerCtx<'_>, msg: &Message) {
    let Some(EngineEvent::Bridged { peer, .. }) = engine_event(call, msg) else {
        return;
    };
    resolve(ctx, call.join.joined(JoinTarget::Call(peer.clone())));
    info!(uuid = %call.uuid, peer = %peer, "Call joined to call");
    notify_dcp(call, ctx, Element::ns("joined", ns::RAYO).with_attr("call-uri", call_uri(ctx, &peer)));
}

pub fn on_unbridged(call: &mut CallState, ctx: &HandlerCtx<'_>, msg: &Message) {
    let Some(EngineEvent::Unbridged { peer, .. }) = engine_event(call, msg) else {
        return;
    };
    resolve(ctx, call.join.unjoined(JoinTarget::Call(peer.clone())));
    info!(uuid = %call.uuid, peer = %peer, "Call unjoined from call");
    notify_dcp(call, ctx, Element::ns("unjoined", ns::RAYO).with_attr("call-uri", call_uri(ctx, &peer)));
}

pub fn on_join_failed(call: &mut CallState, ctx: &HandlerCtx<'_>, msg: &Message) {
    let Some(EngineEvent::JoinFailed { reason, .. }) = engine_event(call, msg) else {
        return;
    };
    warn!(uuid = %call.uuid, reason = %reason, "Join failed");
    if let Some(pending) = call.join.failed() {
        let requester = pending.request.from.clone().unwrap_or_default();
        ctx.reply(
            &requester,
            pending.request.error_reply_text(StanzaError::ServiceUnavailable, reason),
        );
    }
}

fn member_event(name: &str, ctx: &HandlerCtx<'_>, call: &CallState) -> Stanza {
    let mut element = Element::ns(name, ns::INTERNAL).with_attr("call-uri", ctx.address());
    if let Some(dcp) = &call.dcp {
        element.set_attr("dcp", dcp.clone());
    }
    rayo_event(element)
}

pub fn on_mixer_joined(call: &mut CallState, ctx: &HandlerCtx<'_>, msg: &Message) {
    let Some(EngineEvent::MixerMemberAdded { mixer, .. }) = engine_event(call, msg) else {
        return;
    };
    resolve(ctx, call.join.joined(JoinTarget::Mixer(mixer.clone())));
    info!(uuid = %call.uuid, mixer = %mixer, "Call joined to mixer");
    notify_dcp(call, ctx, Element::ns("joined", ns::RAYO).with_attr("mixer-name", mixer.clone()));
    ctx.send(&ctx.gateway.address_for(&mixer), member_event("member-joined", ctx, call));
}

pub fn on_mixer_left(call: &mut CallState, ctx: &HandlerCtx<'_>, msg: &Message) {
    let Some(EngineEvent::MixerMemberRemoved { mixer, .. }) = engine_event(call, msg) else {
        return;
    };
    resolve(ctx, call.join.unjoined(JoinTarget::Mixer(mixer.clone())));
    info!(uuid = %call.uuid, mixer = %mixer, "Call left mixer");
    notify_dcp(call, ctx, Element::ns("unjoined", ns::RAYO).with_attr("mixer-name", mixer.clone()));
    ctx.send(&ctx.gateway.address_for(&mixer), member_event("member-left", ctx, call));
}

/// A component finished; it no longer needs a hangup
pub fn on_component_done(call: &mut CallState, _ctx: &HandlerCtx<'_>, msg: &Message) {
    if call.components.remove(&msg.from) {
        debug!(uuid = %call.uuid, component = %msg.from, remaining = call.components.len(), "Component done");
    }
}

pub fn on_ended(call: &mut CallState, ctx: &HandlerCtx<'_>, msg: &Message) {
    let Some(EngineEvent::CallEnded { reason, .. }) = engine_event(call, msg) else {
        return;
    };
    end(call, ctx, reason);
}

/// Hang up calls nobody has commanded for a while, unless joined
pub fn on_idle_check(call: &mut CallState, ctx: &HandlerCtx<'_>, _msg: &Message) {
    let max_idle = ctx.gateway.config.settings.max_idle();
    if call.ended || call.join.is_joined() || call.idle_for() <= max_idle {
        return;
    }
    info!(uuid = %call.uuid, idle_secs = call.idle_for().as_secs(), "Hanging up idle call");
    call.end_reason = Some(EndReason::Timeout);
    let operation = EngineOperation::Hangup {
        uuid: call.uuid.clone(),
        reason: EndReason::Timeout.as_str().to_string(),
        headers: Vec::new(),
    };
    if ctx.execute(operation).is_err() {
        end(call, ctx, EndReason::Timeout);
    }
}

/// The engine session is gone. Components are told to stop; the call
/// finalizes once the last of them lets go.
fn end(call: &mut CallState, ctx: &HandlerCtx<'_>, reason: EndReason) {
    if call.ended {
        return;
    }
    call.ended = true;
    // a reason set by a command wins over the engine's
    let reason = *call.end_reason.get_or_insert(reason);
    info!(uuid = %call.uuid, reason = reason.as_str(), "Call ended");

    if let JoinStatus::JoinedToMixer(mixer) = call.join.status() {
        ctx.send(&ctx.gateway.address_for(mixer), member_event("member-left", ctx, call));
    }
    for component in &call.components {
        ctx.send(component, internal("hangup"));
    }
    ctx.destroy();
}

pub fn cleanup(call: &mut CallState, ctx: &Arc<GatewayContext>, actor: &Actor) {
    if let Some(pending) = call.join.abandon() {
        let requester = pending.request.from.clone().unwrap_or_default();
        ctx.bus.reply(actor, &requester, pending.request.error_reply(StanzaError::ItemNotFound));
    }

    let reason = call.end_reason.unwrap_or(EndReason::Error);
    let end = Stanza::presence(PresenceType::Unavailable)
        .with_child(Element::ns("end", ns::RAYO).with_child(Element::ns(reason.as_str(), ns::RAYO)));
    match &call.dcp {
        Some(dcp) => ctx.bus.send_copy(actor, dcp, &end),
        None => {
            for pcp in &call.pcps {
                ctx.bus.send_copy(actor, pcp, &end);
            }
        }
    }
    debug!(uuid = %call.uuid, reason = reason.as_str(), "Call finalized");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rayo_actors::{ActorSpec, ActorType, Registry};
    use rayo_types::IqType;

    fn message_from(sender: &Arc<Actor>, to: &str) -> Message {
        Message::new(sender, to, Stanza::iq(IqType::Set, "1"), false)
    }

    fn client(registry: &Registry, address: &str, subkind: Subkind) -> Arc<Actor> {
        let spec = ActorSpec::new(ActorType::new(rayo_actors::ActorKind::Client, subkind)).with_address(address);
        registry
            .create(spec, Box::new(crate::test_utils::Inert))
            .unwrap()
    }

    #[test]
    fn test_first_pcp_becomes_dcp() {
        let registry = Registry::new();
        let a = client(&registry, "a@example.com/1", Subkind::None);
        let b = client(&registry, "b@example.com/1", Subkind::None);
        let outsider = client(&registry, "x@example.com/1", Subkind::None);
        let mut call = CallState::offered("c1", ["a@example.com/1".to_string(), "b@example.com/1".to_string()]);

        assert!(admit(&mut call, &message_from(&outsider, "c1@example.com")).is_err());
        assert!(admit(&mut call, &message_from(&b, "c1@example.com")).is_ok());
        assert_eq!(call.dcp(), Some("b@example.com/1"));
        assert_eq!(call.pcps().collect::<Vec<_>>(), vec!["a@example.com/1"]);

        let rejected = admit(&mut call, &message_from(&a, "c1@example.com")).unwrap_err();
        assert_eq!(rejected.error_condition(), Some(StanzaError::Conflict));
    }

    #[test]
    fn test_console_and_missing_id() {
        let registry = Registry::new();
        let console = client(&registry, "admin@example.com/console", Subkind::Console);
        let mut call = CallState::outbound("c1", "a@example.com/1");
        assert!(admit(&mut call, &message_from(&console, "c1@example.com")).is_ok());

        let mut anonymous = message_from(&console, "c1@example.com");
        anonymous.payload.id = None;
        let rejected = admit(&mut call, &anonymous).unwrap_err();
        assert_eq!(rejected.error_condition(), Some(StanzaError::BadRequest));

        call.ended = true;
        let rejected = admit(&mut call, &message_from(&console, "c1@example.com")).unwrap_err();
        assert_eq!(rejected.error_condition(), Some(StanzaError::ServiceUnavailable));
    }

    #[test]
    fn test_headers_of() {
        let dial = Element::ns("dial", ns::RAYO)
            .with_child(Element::new("header").with_attr("name", "X-Account").with_attr("value", "42"))
            .with_child(Element::new("header").with_attr("value", "nameless"));
        assert_eq!(headers_of(&dial), vec![("X-Account".to_string(), "42".to_string())]);
    }
}
