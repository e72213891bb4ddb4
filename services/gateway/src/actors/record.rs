//! Record component: call media captured to a file
//!
//! The engine picks the file. Completion comes back as `record-complete`
//! carrying the reason, the file URI and the recorded duration.

use super::component::{complete_with, component_spec, create, finish_with};
use super::{ActorState, Reply};
use crate::context::HandlerCtx;
use crate::engine::{EngineEvent, EngineOperation, RecordCompletion, RecordControl};
use rayo_actors::{Message, Subkind};
use rayo_types::{ns, Element, Stanza, StanzaError};
use tracing::{debug, warn};

#[derive(Debug)]
pub struct RecordState {
    client: String,
    uuid: String,
    paused: bool,
    done: bool,
}

impl RecordState {
    pub fn new(client: &str, uuid: &str) -> Self {
        Self {
            client: client.to_string(),
            uuid: uuid.to_string(),
            paused: false,
            done: false,
        }
    }

    pub fn client(&self) -> &str {
        &self.client
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    fn complete(&mut self, ctx: &HandlerCtx<'_>, complete: Element) {
        if std::mem::replace(&mut self.done, true) {
            return;
        }
        finish_with(ctx, &self.client, complete);
    }
}

/// Parameters of a `<record>` request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordOptions {
    pub format: String,
    pub max_duration_ms: Option<u64>,
    pub start_beep: bool,
}

impl RecordOptions {
    /// `max-duration` is in milliseconds; absent or `-1` means no limit
    pub fn parse(element: &Element) -> Result<Self, &'static str> {
        let format = element.non_empty_attr("format").unwrap_or("wav").to_string();
        let max_duration_ms = match element.non_empty_attr("max-duration") {
            None | Some("-1") => None,
            Some(value) => match value.parse::<u64>() {
                Ok(ms) if ms > 0 => Some(ms),
                _ => return Err("invalid max-duration"),
            },
        };
        Ok(Self {
            format,
            max_duration_ms,
            start_beep: element.bool_attr("start-beep", false),
        })
    }
}

/// Create a recording on the handler's call. Returns the new component's
/// address, or the error reply.
pub fn start(ctx: &HandlerCtx<'_>, msg: &Message, uuid: &str) -> Result<String, Stanza> {
    let request = &msg.payload;
    let element = request
        .payload()
        .ok_or_else(|| request.error_reply(StanzaError::BadRequest))?;
    let options = RecordOptions::parse(element)
        .map_err(|reason| request.error_reply_text(StanzaError::BadRequest, reason))?;

    let state = ActorState::Record(RecordState::new(&msg.from, uuid));
    let component = create(ctx, msg, component_spec(ctx, Subkind::Record), state)?;
    let address = component.address().unwrap_or_default().to_string();
    let operation = EngineOperation::StartRecording {
        component: address.clone(),
        uuid: uuid.to_string(),
        format: options.format,
        max_duration_ms: options.max_duration_ms,
        start_beep: options.start_beep,
    };
    match ctx.execute(operation) {
        Ok(()) => {
            debug!(component = %address, uuid, "Recording started");
            Ok(address)
        }
        Err(error) => {
            ctx.gateway.registry.destroy(&component);
            Err(request.error_reply_text(error.condition(), error.to_string()))
        }
    }
}

/// `<pause/>` and `<resume/>`; repeating the current state is a no-op
pub fn control(record: &mut RecordState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    if record.done {
        return Some(msg.payload.error_reply_text(StanzaError::UnexpectedRequest, "recording is complete"));
    }
    let Some(control) = msg.payload.payload().and_then(|e| RecordControl::from_name(&e.name)) else {
        return Some(msg.payload.error_reply(StanzaError::BadRequest));
    };
    let pause = control == RecordControl::Pause;
    if record.paused == pause {
        return Some(msg.payload.result_reply());
    }
    let operation = EngineOperation::RecordControl {
        component: ctx.address().to_string(),
        control,
    };
    Some(match ctx.execute(operation) {
        Ok(()) => {
            record.paused = pause;
            msg.payload.result_reply()
        }
        Err(error) => msg.payload.error_reply_text(error.condition(), error.to_string()),
    })
}

/// Completion follows from the engine as `record-complete` with reason stop
pub fn stop(record: &mut RecordState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    if record.done {
        return Some(msg.payload.error_reply_text(StanzaError::UnexpectedRequest, "recording is complete"));
    }
    let operation = EngineOperation::StopComponent {
        component: ctx.address().to_string(),
    };
    Some(match ctx.execute(operation) {
        Ok(()) => msg.payload.result_reply(),
        Err(error) => msg.payload.error_reply_text(error.condition(), error.to_string()),
    })
}

pub fn on_complete(record: &mut RecordState, ctx: &HandlerCtx<'_>, msg: &Message) {
    let Some(EngineEvent::RecordComplete {
        reason,
        uri,
        duration_ms,
        ..
    }) = msg.payload.payload().and_then(EngineEvent::from_element)
    else {
        warn!(component = ctx.address(), "Malformed record completion");
        return;
    };
    let reason = match reason {
        RecordCompletion::Stop | RecordCompletion::Error => Element::ns(reason.as_str(), ns::RAYO_COMPLETE),
        _ => Element::ns(reason.as_str(), ns::RECORD_COMPLETE),
    };
    let mut complete = complete_with(reason);
    if !uri.is_empty() {
        complete.push(
            Element::ns("recording", ns::RECORD_COMPLETE)
                .with_attr("uri", uri)
                .with_attr("duration", duration_ms.to_string()),
        );
    }
    record.complete(ctx, complete);
}

/// The call went away before the engine finished the file
pub fn on_hangup(record: &mut RecordState, ctx: &HandlerCtx<'_>, _msg: &Message) {
    if record.done {
        return;
    }
    let operation = EngineOperation::StopComponent {
        component: ctx.address().to_string(),
    };
    if let Err(error) = ctx.execute(operation) {
        debug!(component = ctx.address(), error = %error, "Recording already stopped in engine");
    }
    record.complete(ctx, complete_with(Element::ns("hangup", ns::RAYO_COMPLETE)));
}
