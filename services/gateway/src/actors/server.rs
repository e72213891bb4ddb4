//! The gateway's own server actor: ping, service discovery and outbound dial

use super::call::{headers_of, CallState};
use super::component::ref_element;
use super::{ActorState, Reply};
use crate::context::HandlerCtx;
use crate::engine::EngineOperation;
use rayo_actors::{ActorSpec, ActorType, Message};
use rayo_types::{ns, Element, StanzaError};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct ServerState {
    dials: u64,
}

impl ServerState {
    /// Outbound calls accepted by the engine so far
    pub fn dials(&self) -> u64 {
        self.dials
    }
}

/// Protocol features advertised through service discovery
pub const FEATURES: [&str; 6] = [ns::RAYO, ns::OUTPUT, ns::INPUT, ns::PROMPT, ns::RECORD, ns::PING];

pub fn disco(_server: &mut ServerState, _ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    let mut query = Element::ns("query", ns::DISCO_INFO);
    for feature in FEATURES {
        query.push(Element::new("feature").with_attr("var", feature));
    }
    Some(msg.payload.result_with(query))
}

pub fn ping(_server: &mut ServerState, _ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    Some(msg.payload.result_reply())
}

/// Create an outbound call controlled by the requester
pub fn dial(server: &mut ServerState, ctx: &HandlerCtx<'_>, msg: &Message) -> Reply {
    let request = &msg.payload;
    let dial = request.payload()?;
    if request.request_id().is_none() {
        return Some(request.error_reply_text(StanzaError::BadRequest, "missing request id"));
    }
    let Some(to) = dial.non_empty_attr("to") else {
        return Some(request.error_reply_text(StanzaError::BadRequest, "missing dial to attribute"));
    };

    let uuid = Uuid::new_v4().to_string();
    let address = ctx.gateway.address_for(&uuid);
    let spec = ActorSpec::new(ActorType::CALL)
        .with_id(uuid.clone())
        .with_address(address.clone());
    let call = match ctx.spawn(spec, ActorState::Call(CallState::outbound(&uuid, &msg.from))) {
        Ok(call) => call,
        Err(error) => {
            warn!(error = %error, uuid = %uuid, "Failed to create outbound call");
            return Some(request.error_reply_text(StanzaError::InternalServerError, error.to_string()));
        }
    };

    let operation = EngineOperation::Originate {
        uuid: uuid.clone(),
        dial_string: ctx.gateway.dial.resolve(to),
        caller_id: dial.non_empty_attr("from").map(str::to_string),
        headers: headers_of(dial),
    };
    match ctx.execute(operation) {
        Ok(()) => {
            server.dials += 1;
            info!(uuid = %uuid, to, dcp = %msg.from, "Outbound call started");
            Some(request.result_with(ref_element(&address)))
        }
        Err(error) => {
            ctx.gateway.registry.destroy(&call);
            Some(request.error_reply_text(error.condition(), error.to_string()))
        }
    }
}
