//! Input component: DTMF collection against a compiled grammar

use super::component::finish;
use super::Reply;
use crate::context::HandlerCtx;
use crate::engine::{EngineEvent, EngineOperation};
use crate::grammar::{MatchResult, Matcher};
use rayo_actors::Message;
use rayo_types::{ns, Element, PresenceType, Stanza};
use std::fmt;
use tracing::{debug, warn};

pub struct InputState {
    client: String,
    uuid: String,
    matcher: Box<dyn Matcher>,
    digits: String,
    barge_event: bool,
    timers_started: bool,
    done: bool,
}

impl fmt::Debug for InputState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InputState")
            .field("client", &self.client)
            .field("uuid", &self.uuid)
            .field("digits", &self.digits)
            .field("barge_event", &self.barge_event)
            .field("timers_started", &self.timers_started)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}

impl InputState {
    pub fn new(
        client: &str,
        uuid: &str,
        matcher: Box<dyn Matcher>,
        barge_event: bool,
        start_timers: bool,
    ) -> Self {
        Self {
            client: client.to_string(),
            uuid: uuid.to_string(),
            matcher,
            digits: String::new(),
            barge_event,
            timers_started: start_timers,
            done: false,
        }
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn digits(&self) -> &str {
        &self.digits
    }

    /// Stop detection in the engine and report `reason`
    fn complete(&mut self, ctx: &HandlerCtx<'_>, reason: Element) {
        if std::mem::replace(&mut self.done, true) {
            return;
        }
        let operation = EngineOperation::StopComponent {
            component: ctx.address().to_string(),
        };
        if let Err(error) = ctx.execute(operation) {
            debug!(component = ctx.address(), error = %error, "Input already stopped in engine");
        }
        finish(ctx, &self.client, reason);
    }
}

/// Result goes out before the completion event
pub fn stop(input: &mut InputState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    ctx.respond(msg, msg.payload.result_reply());
    input.complete(ctx, Element::ns("stop", ns::RAYO_COMPLETE));
    None
}

pub fn start_timers(input: &mut InputState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    if input.timers_started || input.done {
        return Some(msg.payload.result_reply());
    }
    let operation = EngineOperation::StartInputTimers {
        component: ctx.address().to_string(),
    };
    Some(match ctx.execute(operation) {
        Ok(()) => {
            input.timers_started = true;
            msg.payload.result_reply()
        }
        Err(error) => msg.payload.error_reply_text(error.condition(), error.to_string()),
    })
}

pub fn on_digit(input: &mut InputState, ctx: &HandlerCtx<'_>, msg: &Message) {
    let Some(EngineEvent::InputDigit { digit, .. }) =
        msg.payload.payload().and_then(EngineEvent::from_element)
    else {
        warn!(component = ctx.address(), "Malformed digit event");
        return;
    };
    if input.done {
        return;
    }
    if input.digits.is_empty() && input.barge_event {
        let barge = Stanza::presence(PresenceType::Available)
            .with_child(Element::ns("start-of-input", ns::INPUT));
        ctx.send(&input.client, barge);
    }
    input.digits.push(digit);
    debug!(component = ctx.address(), digits = %input.digits, "Digit collected");

    match input.matcher.matches(&input.digits) {
        MatchResult::Partial => {}
        MatchResult::NoMatch => input.complete(ctx, Element::ns("nomatch", ns::INPUT_COMPLETE)),
        result => {
            let mut matched = Element::ns("match", ns::INPUT_COMPLETE)
                .with_attr("mode", "dtmf")
                .with_child(Element::new("input").with_text(input.digits.clone()));
            if let Some(interpretation) = result.interpretation() {
                matched.push(Element::new("interpretation").with_text(interpretation));
            }
            input.complete(ctx, matched);
        }
    }
}

pub fn on_timeout(input: &mut InputState, ctx: &HandlerCtx<'_>, msg: &Message) {
    let Some(EngineEvent::InputTimeout { kind, .. }) =
        msg.payload.payload().and_then(EngineEvent::from_element)
    else {
        warn!(component = ctx.address(), "Malformed input timeout");
        return;
    };
    input.complete(ctx, Element::ns(kind.as_str(), ns::INPUT_COMPLETE));
}

pub fn on_hangup(input: &mut InputState, ctx: &HandlerCtx<'_>, _msg: &Message) {
    input.complete(ctx, Element::ns("hangup", ns::RAYO_COMPLETE));
}
