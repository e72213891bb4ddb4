//! Helpers shared by call and mixer components

use super::ActorState;
use crate::context::HandlerCtx;
use rayo_actors::{Actor, ActorKind, ActorSpec, ActorType, Message, Subkind};
use rayo_types::{ns, Element, PresenceType, Stanza, StanzaError};
use std::sync::Arc;
use tracing::{debug, warn};

/// `<complete xmlns=RAYO_EXT>` wrapping a reason element
pub fn complete_with(reason: Element) -> Element {
    Element::ns("complete", ns::RAYO_EXT).with_child(reason)
}

/// Unavailable presence announcing completion
pub fn complete_presence(complete: Element) -> Stanza {
    Stanza::presence(PresenceType::Unavailable).with_child(complete)
}

/// `<ref>` pointing the requester at a newly created actor
pub fn ref_element(address: &str) -> Element {
    Element::ns("ref", ns::RAYO).with_attr("uri", format!("xmpp:{}", address))
}

/// Address carried by a `xmpp:` URI; bare addresses pass through
pub fn uri_address(uri: &str) -> &str {
    uri.strip_prefix("xmpp:").unwrap_or(uri)
}

/// Address of the `ref` in a result, if any
pub fn ref_address(result: &Stanza) -> Option<&str> {
    result
        .children
        .iter()
        .find(|child| child.name == "ref")
        .and_then(|child| child.non_empty_attr("uri"))
        .map(uri_address)
}

/// Type of a `subkind` component owned by `parent`
pub fn component_type(parent: ActorType, subkind: Subkind) -> ActorType {
    match parent.kind {
        ActorKind::Mixer => ActorType::mixer_component(subkind),
        _ => ActorType::call_component(subkind),
    }
}

/// Spec for the next `subkind` component of the handler's actor. The
/// address is `<parent>/<subkind>-<n>` and doubles as the internal id.
pub fn component_spec(ctx: &HandlerCtx<'_>, subkind: Subkind) -> ActorSpec {
    let address = format!("{}/{}-{}", ctx.address(), subkind.as_str(), ctx.actor.next_seq());
    ActorSpec::new(component_type(ctx.actor.actor_type(), subkind))
        .with_id(address.clone())
        .with_address(address)
        .with_parent(ctx.actor)
}

/// Commands need an id to be answered
pub fn require_id(msg: &Message) -> Result<(), Stanza> {
    match msg.payload.request_id() {
        Some(_) => Ok(()),
        None => Err(msg.payload.error_reply_text(StanzaError::BadRequest, "missing request id")),
    }
}

/// Components take commands only from the client that started them, the
/// console, or their own call.
pub fn admit(client: &str, msg: &Message) -> Result<(), Stanza> {
    require_id(msg)?;
    if msg.from == client || msg.from_type.subkind == Subkind::Console || msg.is_internal() {
        return Ok(());
    }
    debug!(from = %msg.from, owner = client, "Component command from foreign client");
    Err(msg.payload.error_reply(StanzaError::Conflict))
}

/// Internal event telling a call or mixer that one of its components is gone
pub const COMPONENT_DONE: &str = "component-done";

/// Announce completion to the owner and give up the creation reference
pub fn finish(ctx: &HandlerCtx<'_>, client: &str, reason: Element) {
    finish_with(ctx, client, complete_with(reason));
}

/// [`finish`] with a prebuilt `<complete>` element
pub fn finish_with(ctx: &HandlerCtx<'_>, client: &str, complete: Element) {
    let reason = complete.children.first().map(|r| r.name.as_str()).unwrap_or_default();
    debug!(component = ctx.address(), reason, "Component complete");
    ctx.send(client, complete_presence(complete));
    detach(ctx);
    ctx.destroy();
}

/// Tell the parent to stop tracking this component. A parent already being
/// torn down has stopped listening.
pub fn detach(ctx: &HandlerCtx<'_>) {
    let Some(parent) = ctx.actor.parent() else {
        return;
    };
    if ctx.gateway.registry.is_pending_destruction(parent) {
        return;
    }
    if let Some(address) = parent.address() {
        let done = Stanza::presence(PresenceType::Available).with_child(Element::ns(COMPONENT_DONE, ns::INTERNAL));
        ctx.send(address, done);
    }
}

/// Create a component and hand back its address, or the error reply
pub fn create(
    ctx: &HandlerCtx<'_>,
    msg: &Message,
    spec: ActorSpec,
    state: ActorState,
) -> Result<Arc<Actor>, Stanza> {
    ctx.spawn(spec, state).map_err(|error| {
        warn!(error = %error, parent = ctx.address(), "Component creation failed");
        msg.payload.error_reply_text(StanzaError::InternalServerError, error.to_string())
    })
}
