//! Mixer actor
//!
//! Created when the engine reports the first member of a named conference.
//! Tracks members and tells every controlling party with a call in the
//! mixer about joins and leaves.

use super::component::ref_element;
use super::Reply;
use crate::context::HandlerCtx;
use rayo_actors::{Actor, Message};
use rayo_types::{ns, Element, PresenceType, Stanza};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

#[derive(Debug)]
pub struct MixerState {
    name: String,
    /// call address → its controlling party
    members: BTreeMap<String, Option<String>>,
    /// controlling party → number of its calls in the mixer
    subscribers: BTreeMap<String, usize>,
    components: BTreeSet<String>,
}

impl MixerState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            members: BTreeMap::new(),
            subscribers: BTreeMap::new(),
            components: BTreeSet::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> impl Iterator<Item = &str> {
        self.members.keys().map(String::as_str)
    }

    pub fn subscribers(&self) -> impl Iterator<Item = &str> {
        self.subscribers.keys().map(String::as_str)
    }

    pub fn components(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(String::as_str)
    }

    fn broadcast(&self, ctx: &HandlerCtx<'_>, element: Element) {
        let event = Stanza::presence(PresenceType::Available).with_child(element);
        for subscriber in self.subscribers.keys() {
            ctx.gateway.bus.send_copy(ctx.actor, subscriber, &event);
        }
    }
}

fn member_attrs(msg: &Message) -> Option<(String, Option<String>)> {
    let element = msg.payload.payload()?;
    let call = element.non_empty_attr("call-uri")?.to_string();
    let dcp = element.non_empty_attr("dcp").map(str::to_string);
    Some((call, dcp))
}

pub fn on_member_joined(mixer: &mut MixerState, ctx: &HandlerCtx<'_>, msg: &Message) {
    let Some((call, dcp)) = member_attrs(msg) else {
        return;
    };
    if let Some(dcp) = &dcp {
        *mixer.subscribers.entry(dcp.clone()).or_default() += 1;
    }
    mixer.members.insert(call.clone(), dcp);
    info!(mixer = %mixer.name, call = %call, members = mixer.members.len(), "Mixer member joined");
    mixer.broadcast(
        ctx,
        Element::ns("joined", ns::RAYO).with_attr("call-uri", format!("xmpp:{}", call)),
    );
}

pub fn on_member_left(mixer: &mut MixerState, ctx: &HandlerCtx<'_>, msg: &Message) {
    let Some((call, _)) = member_attrs(msg) else {
        return;
    };
    let Some(dcp) = mixer.members.remove(&call) else {
        debug!(mixer = %mixer.name, call = %call, "Leave from unknown member");
        return;
    };
    info!(mixer = %mixer.name, call = %call, members = mixer.members.len(), "Mixer member left");
    // the leaving call's own party hears about it too
    mixer.broadcast(
        ctx,
        Element::ns("unjoined", ns::RAYO).with_attr("call-uri", format!("xmpp:{}", call)),
    );
    if let Some(dcp) = dcp {
        if let Some(count) = mixer.subscribers.get_mut(&dcp) {
            *count -= 1;
            if *count == 0 {
                mixer.subscribers.remove(&dcp);
            }
        }
    }
}

pub fn on_destroyed(mixer: &mut MixerState, ctx: &HandlerCtx<'_>, _msg: &Message) {
    info!(mixer = %mixer.name, "Mixer destroyed by engine");
    let hangup = Stanza::presence(PresenceType::Available).with_child(Element::ns("hangup", ns::INTERNAL));
    for component in &mixer.components {
        ctx.gateway.bus.send_copy(ctx.actor, component, &hangup);
    }
    ctx.destroy();
}

pub fn on_component_done(mixer: &mut MixerState, _ctx: &HandlerCtx<'_>, msg: &Message) {
    if mixer.components.remove(&msg.from) {
        debug!(mixer = %mixer.name, component = %msg.from, "Component done");
    }
}

pub fn output(mixer: &mut MixerState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    Some(match super::output::start(ctx, msg, &mixer.name) {
        Ok(address) => {
            let reply = msg.payload.result_with(ref_element(&address));
            mixer.components.insert(address);
            reply
        }
        Err(reply) => reply,
    })
}

pub fn cleanup(mixer: &mut MixerState, actor: &Actor) {
    debug!(mixer = %mixer.name, actor = %actor.label(), "Mixer finalized");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_mixer_is_empty() {
        let mixer = MixerState::new("conf");
        assert_eq!(mixer.name(), "conf");
        assert_eq!(mixer.members().count(), 0);
        assert_eq!(mixer.subscribers().count(), 0);
    }
}
