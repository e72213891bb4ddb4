//! Prompt component actor
//!
//! Drives a [`PromptMachine`]: children are started by sending their
//! documents to the call as ordinary requests, and the machine's effects
//! are carried out as messages. Every request the prompt sends is tracked
//! by id so its answer can be matched up.
//!
//! A child's events can reach the prompt before the call's `<ref>` reply
//! that names the child. Events from a child of the same call are held
//! while a start is outstanding and replayed once the reference arrives.

use super::component::{detach, ref_address, ref_element};
use super::Reply;
use crate::context::HandlerCtx;
use crate::prompt::{PromptEffect, PromptEvent, PromptMachine};
use rayo_actors::Message;
use rayo_types::{ns, Element, IqType, PresenceType, Stanza, StanzaError};
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Why the prompt sent a request
#[derive(Debug, Clone)]
enum Pending {
    StartOutput,
    StartInput,
    /// Client request relayed to the output; answered back to the client
    Forwarded(Stanza),
    /// Stop or timer request to a child; the answer carries nothing
    Control,
}

/// Child event that arrived before the child's address was known
#[derive(Debug, Clone)]
enum HeldEvent {
    OutputComplete,
    InputComplete(Element),
    Barge,
}

#[derive(Debug)]
pub struct PromptComponent {
    machine: PromptMachine,
    client: String,
    call: String,
    /// The `<prompt>` request, answered by the prompt itself
    request: Stanza,
    output: Element,
    input: Element,
    pending: HashMap<String, Pending>,
    held: Vec<(String, HeldEvent)>,
}

impl PromptComponent {
    pub fn new(
        client: &str,
        call: &str,
        request: Stanza,
        output: Element,
        input: Element,
        barge_in: bool,
    ) -> Self {
        Self {
            machine: PromptMachine::new(barge_in),
            client: client.to_string(),
            call: call.to_string(),
            request,
            output,
            input,
            pending: HashMap::new(),
            held: Vec::new(),
        }
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn machine(&self) -> &PromptMachine {
        &self.machine
    }

    /// Events received but not yet applied
    pub fn held_events(&self) -> usize {
        self.held.len()
    }

    fn starting(&self, output: bool) -> bool {
        self.pending.values().any(|pending| match pending {
            Pending::StartOutput => output,
            Pending::StartInput => !output,
            _ => false,
        })
    }

    fn is_call_child(&self, address: &str) -> bool {
        address
            .strip_prefix(self.call.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    /// Apply an event from `from`, or hold it while the child that may have
    /// sent it is still being started
    fn child_event(&mut self, ctx: &HandlerCtx<'_>, from: &str, event: HeldEvent) {
        let output = matches!(event, HeldEvent::OutputComplete);
        let known = if output { self.machine.output() } else { self.machine.input() };
        if known == Some(from) {
            let event = match event {
                HeldEvent::OutputComplete => PromptEvent::OutputComplete,
                HeldEvent::InputComplete(complete) => PromptEvent::InputComplete(complete),
                HeldEvent::Barge => PromptEvent::Barge,
            };
            self.handle(ctx, event, None);
        } else if !self.machine.is_done() && self.starting(output) && self.is_call_child(from) {
            debug!(prompt = ctx.address(), from, event = ?event, "Holding event until child is known");
            self.held.push((from.to_string(), event));
        } else {
            debug!(prompt = ctx.address(), from, event = ?event, "Event from unknown child dropped");
        }
    }

    /// Replay held events from a child whose address just became known
    fn replay(&mut self, ctx: &HandlerCtx<'_>, child: &str) {
        let (ready, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.held)
            .into_iter()
            .partition(|(from, _)| from == child);
        self.held = waiting;
        for (from, event) in ready {
            self.child_event(ctx, &from, event);
        }
    }

    /// Send a request on the prompt's behalf and remember why
    fn request(&mut self, ctx: &HandlerCtx<'_>, to: &str, child: Element, why: Pending) {
        let id = format!("prompt-{}", ctx.actor.next_seq());
        self.pending.insert(id.clone(), why);
        ctx.send(to, Stanza::iq(IqType::Set, id).with_child(child));
    }

    fn handle(&mut self, ctx: &HandlerCtx<'_>, event: PromptEvent, current: Option<&Message>) {
        for effect in self.machine.on_event(event) {
            self.apply(ctx, effect, current);
        }
    }

    fn apply(&mut self, ctx: &HandlerCtx<'_>, effect: PromptEffect, current: Option<&Message>) {
        match effect {
            PromptEffect::StartInput { start_timers, barge_event } => {
                let mut input = self.input.clone();
                input.set_attr("start-timers", start_timers.to_string());
                input.set_attr("barge-event", barge_event.to_string());
                let call = self.call.clone();
                self.request(ctx, &call, input, Pending::StartInput);
            }
            PromptEffect::ReplyRef => {
                ctx.reply(&self.client, self.request.result_with(ref_element(ctx.address())));
            }
            PromptEffect::StopOutput => {
                if let Some(output) = self.machine.output().map(str::to_string) {
                    self.request(ctx, &output, Element::ns("stop", ns::RAYO_EXT), Pending::Control);
                }
            }
            PromptEffect::StopInput => {
                if let Some(input) = self.machine.input().map(str::to_string) {
                    self.request(ctx, &input, Element::ns("stop", ns::RAYO_EXT), Pending::Control);
                }
            }
            PromptEffect::StartInputTimers => {
                if let Some(input) = self.machine.input().map(str::to_string) {
                    self.request(ctx, &input, Element::ns("start-timers", ns::INPUT), Pending::Control);
                }
            }
            PromptEffect::ForwardToOutput(output) => {
                let Some(msg) = current else { return };
                let Some(control) = msg.payload.payload().cloned() else { return };
                self.request(ctx, &output, control, Pending::Forwarded(msg.payload.clone()));
            }
            PromptEffect::AcceptRequest => {
                if let Some(msg) = current {
                    ctx.respond(msg, msg.payload.result_reply());
                }
            }
            PromptEffect::RejectRequest(condition) => {
                if let Some(msg) = current {
                    ctx.respond(msg, msg.payload.error_reply(condition));
                }
            }
            PromptEffect::Complete(complete) => {
                info!(prompt = ctx.address(), reason = ?complete.children.first().map(|r| r.name.as_str()), "Prompt complete");
                ctx.send(
                    &self.client,
                    Stanza::presence(PresenceType::Unavailable).with_child(complete),
                );
            }
            PromptEffect::ForwardError(error) => {
                let mut reply = error;
                reply.id = self.request.id.clone();
                reply.from = None;
                reply.to = None;
                ctx.reply(&self.client, reply);
            }
            PromptEffect::FailRequest(condition) => {
                ctx.reply(&self.client, self.request.error_reply(condition));
            }
            PromptEffect::Teardown => {
                self.pending.clear();
                self.held.clear();
                detach(ctx);
                ctx.destroy();
            }
        }
    }
}

/// The call created the prompt; start the output
pub fn on_start(prompt: &mut PromptComponent, ctx: &HandlerCtx<'_>, _msg: &Message) {
    let call = prompt.call.clone();
    let output = prompt.output.clone();
    prompt.request(ctx, &call, output, Pending::StartOutput);
}

pub fn stop(prompt: &mut PromptComponent, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    prompt.handle(ctx, PromptEvent::Stop, Some(msg));
    None
}

pub fn control(prompt: &mut PromptComponent, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    prompt.handle(ctx, PromptEvent::OutputControl, Some(msg));
    None
}

pub fn on_output_complete(prompt: &mut PromptComponent, ctx: &HandlerCtx<'_>, msg: &Message) {
    prompt.child_event(ctx, &msg.from, HeldEvent::OutputComplete);
}

pub fn on_input_complete(prompt: &mut PromptComponent, ctx: &HandlerCtx<'_>, msg: &Message) {
    let Some(complete) = msg.payload.payload().cloned() else {
        return;
    };
    prompt.child_event(ctx, &msg.from, HeldEvent::InputComplete(complete));
}

pub fn on_barge(prompt: &mut PromptComponent, ctx: &HandlerCtx<'_>, msg: &Message) {
    prompt.child_event(ctx, &msg.from, HeldEvent::Barge);
}

pub fn on_hangup(prompt: &mut PromptComponent, ctx: &HandlerCtx<'_>, _msg: &Message) {
    prompt.handle(ctx, PromptEvent::Hangup, None);
}

/// Answers to requests the prompt sent
pub fn on_response(prompt: &mut PromptComponent, ctx: &HandlerCtx<'_>, msg: &Message) {
    let response = &msg.payload;
    let Some(pending) = response.id.as_deref().and_then(|id| prompt.pending.remove(id)) else {
        debug!(prompt = ctx.address(), from = %msg.from, "Untracked response dropped");
        return;
    };
    match pending {
        Pending::StartOutput => match ref_address(response) {
            Some(address) if !response.is_error() => {
                let address = address.to_string();
                prompt.handle(ctx, PromptEvent::OutputReady(address.clone()), None);
                prompt.replay(ctx, &address);
            }
            _ => prompt.handle(ctx, PromptEvent::OutputFailed(child_error(response)), None),
        },
        Pending::StartInput => match ref_address(response) {
            Some(address) if !response.is_error() => {
                let address = address.to_string();
                prompt.handle(ctx, PromptEvent::InputReady(address.clone()), None);
                prompt.replay(ctx, &address);
            }
            _ => prompt.handle(ctx, PromptEvent::InputFailed(child_error(response)), None),
        },
        Pending::Forwarded(request) => {
            let reply = if response.is_error() {
                request.error_reply(response.error_condition().unwrap_or(StanzaError::InternalServerError))
            } else {
                request.result_reply()
            };
            let requester = request.from.clone().unwrap_or_default();
            ctx.reply(&requester, reply);
        }
        Pending::Control => {
            if response.is_error() {
                warn!(prompt = ctx.address(), from = %msg.from, condition = ?response.error_condition(), "Child refused request");
            }
        }
    }
}

/// An error answer as is; a result without a reference becomes one
fn child_error(response: &Stanza) -> Stanza {
    if response.is_error() {
        response.clone()
    } else {
        response.error_reply_text(StanzaError::InternalServerError, "child started without a reference")
    }
}
