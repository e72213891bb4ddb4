//! Output component: media rendered on a call or mixer

use super::component::{component_spec, create, finish};
use super::{ActorState, Reply};
use crate::context::HandlerCtx;
use crate::engine::{EngineEvent, EngineOperation, OutputCompletion, OutputControl};
use rayo_actors::{Message, Subkind};
use rayo_types::{ns, Element, Stanza, StanzaError};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct OutputState {
    client: String,
    /// Call uuid or mixer name the media plays on
    target: String,
    done: bool,
}

impl OutputState {
    pub fn new(client: &str, target: &str) -> Self {
        Self {
            client: client.to_string(),
            target: target.to_string(),
            done: false,
        }
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn complete(&mut self, ctx: &HandlerCtx<'_>, reason: Element) {
        if std::mem::replace(&mut self.done, true) {
            return;
        }
        finish(ctx, &self.client, reason);
    }
}

/// Create an output on the handler's actor and start it on `target`.
/// Returns the new component's address, or the error reply.
pub fn start(ctx: &HandlerCtx<'_>, msg: &Message, target: &str) -> Result<String, Stanza> {
    let request = &msg.payload;
    let document = request
        .payload()
        .cloned()
        .ok_or_else(|| request.error_reply(StanzaError::BadRequest))?;
    let state = ActorState::Output(OutputState::new(&msg.from, target));
    let component = create(ctx, msg, component_spec(ctx, Subkind::Output), state)?;
    let address = component.address().unwrap_or_default().to_string();
    let operation = EngineOperation::StartOutput {
        component: address.clone(),
        target: target.to_string(),
        document,
    };
    match ctx.execute(operation) {
        Ok(()) => {
            debug!(component = %address, target, "Output started");
            Ok(address)
        }
        Err(error) => {
            ctx.gateway.registry.destroy(&component);
            Err(request.error_reply_text(error.condition(), error.to_string()))
        }
    }
}

fn run_control(output: &OutputState, ctx: &HandlerCtx<'_>, msg: &Message, control: OutputControl) -> Reply {
    if output.done {
        return Some(msg.payload.error_reply_text(StanzaError::UnexpectedRequest, "output is complete"));
    }
    let operation = EngineOperation::OutputControl {
        component: ctx.address().to_string(),
        control,
    };
    Some(match ctx.execute(operation) {
        Ok(()) => msg.payload.result_reply(),
        Err(error) => msg.payload.error_reply_text(error.condition(), error.to_string()),
    })
}

/// Completion follows from the engine as `output-complete` with reason stop
pub fn stop(output: &mut OutputState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    run_control(output, ctx, msg, OutputControl::Stop)
}

pub fn control(output: &mut OutputState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    let Some(control) = msg.payload.payload().and_then(OutputControl::from_element) else {
        return Some(msg.payload.error_reply_text(StanzaError::BadRequest, "invalid output control"));
    };
    run_control(output, ctx, msg, control)
}

pub fn on_complete(output: &mut OutputState, ctx: &HandlerCtx<'_>, msg: &Message) {
    let Some(EngineEvent::OutputComplete { reason, .. }) =
        msg.payload.payload().and_then(EngineEvent::from_element)
    else {
        warn!(component = ctx.address(), "Malformed output completion");
        return;
    };
    let reason = match reason {
        OutputCompletion::Finish => Element::ns("finish", ns::OUTPUT_COMPLETE),
        OutputCompletion::Stop => Element::ns("stop", ns::RAYO_COMPLETE),
        OutputCompletion::Error => Element::ns("error", ns::RAYO_COMPLETE),
    };
    output.complete(ctx, reason);
}

/// The owning call or mixer went away
pub fn on_hangup(output: &mut OutputState, ctx: &HandlerCtx<'_>, _msg: &Message) {
    if output.done {
        return;
    }
    let operation = EngineOperation::StopComponent {
        component: ctx.address().to_string(),
    };
    if let Err(error) = ctx.execute(operation) {
        debug!(component = ctx.address(), error = %error, "Output already stopped in engine");
    }
    output.complete(ctx, Element::ns("hangup", ns::RAYO_COMPLETE));
}
