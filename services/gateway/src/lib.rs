//! Rayo Gateway
//!
//! Call control as actors: clients command calls, mixers and media
//! components over the Rayo protocol, and an external call engine does the
//! media work.
//!
//! # Architecture
//!
//! ```text
//!   transport ──on_received──►┐                       ┌──► transport.send
//!                             │                       │   (client actors)
//!   engine ──on_engine_event─►├──► MessageBus ──► GatewayActor ──► CallEngine::execute
//!                             │        ▲              │
//!   console ──console_command►┘        └── send/reply ┘
//! ```
//!
//! - **Server**: ping, service discovery, outbound dial
//! - **Call**: accept/answer/redirect/hangup/reject, join/unjoin, output,
//!   input, prompt, record; DCP/PCP control
//! - **Mixer**: membership broadcast, output
//! - **Components**: output, input, prompt and record
//!
//! # Examples
//!
//! ```rust
//! use rayo_config::GatewayConfig;
//! use rayo_gateway::test_utils::{LiteralGrammar, RecordingEngine, RecordingTransport};
//! use rayo_gateway::{Gateway, StreamInfo};
//! use rayo_types::{ns, Element, IqType, Stanza};
//! use std::sync::Arc;
//!
//! let transport = Arc::new(RecordingTransport::new());
//! let gateway = Gateway::builder(GatewayConfig::default())
//!     .engine(Arc::new(RecordingEngine::new()))
//!     .grammar(Arc::new(LiteralGrammar))
//!     .transport(transport.clone())
//!     .build()
//!     .unwrap();
//!
//! let stream = StreamInfo::client(1, "alice@localhost/phone");
//! gateway.on_ready(&stream).unwrap();
//! let ping = Stanza::iq(IqType::Get, "p1").with_child(Element::ns("ping", ns::PING));
//! gateway.on_received(&stream, ping).unwrap();
//! gateway.deliver_pending();
//!
//! let replies = transport.sent_to("alice@localhost/phone");
//! assert_eq!(replies[0].iq_type(), Some(IqType::Result));
//! ```

pub mod actors;
pub mod console;
pub mod context;
pub mod dial;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod grammar;
pub mod join;
pub mod prompt;
pub mod status;
pub mod test_utils;
pub mod transport;

pub use context::{Availability, GatewayContext, HandlerCtx, Roster};
pub use dial::DialGateways;
pub use engine::{
    CallEngine, EndReason, EngineEvent, EngineOperation, InputTimeout, MediaDirection,
    OutputCompletion, OutputControl, RecordCompletion, RecordControl, RejectReason,
};
pub use error::{EngineError, GatewayError, GrammarError, Result};
pub use gateway::{Gateway, GatewayBuilder, GatewayStats};
pub use grammar::{Grammar, MatchResult, Matcher};
pub use join::{JoinRejection, JoinState, JoinStatus, JoinTarget};
pub use prompt::{PromptEffect, PromptEvent, PromptMachine, PromptState};
pub use transport::{StreamInfo, StreamKind, Transport};
