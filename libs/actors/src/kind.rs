//! Actor kinds
//!
//! A closed set of actor variants. Dispatch keys are built from these rather
//! than from free-form strings so that a handler registered for a kind that
//! does not exist cannot compile.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Top-level actor variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorKind {
    Server,
    PeerServer,
    Client,
    Call,
    Mixer,
    CallComponent,
    MixerComponent,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorKind::Server => "SERVER",
            ActorKind::PeerServer => "PEER_SERVER",
            ActorKind::Client => "CLIENT",
            ActorKind::Call => "CALL",
            ActorKind::Mixer => "MIXER",
            ActorKind::CallComponent => "CALL_COMPONENT",
            ActorKind::MixerComponent => "MIXER_COMPONENT",
        }
    }

    pub fn is_component(&self) -> bool {
        matches!(self, ActorKind::CallComponent | ActorKind::MixerComponent)
    }
}

/// Refinement of a kind; components are told apart by it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subkind {
    None,
    Console,
    Input,
    Output,
    Prompt,
    Record,
}

impl Subkind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subkind::None => "",
            Subkind::Console => "console",
            Subkind::Input => "input",
            Subkind::Output => "output",
            Subkind::Prompt => "prompt",
            Subkind::Record => "record",
        }
    }
}

/// Kind and subkind together, as carried on every message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorType {
    pub kind: ActorKind,
    pub subkind: Subkind,
}

impl ActorType {
    pub const SERVER: ActorType = ActorType::of(ActorKind::Server);
    pub const PEER_SERVER: ActorType = ActorType::of(ActorKind::PeerServer);
    pub const CLIENT: ActorType = ActorType::of(ActorKind::Client);
    pub const CALL: ActorType = ActorType::of(ActorKind::Call);
    pub const MIXER: ActorType = ActorType::of(ActorKind::Mixer);

    pub const fn new(kind: ActorKind, subkind: Subkind) -> Self {
        Self { kind, subkind }
    }

    pub const fn of(kind: ActorKind) -> Self {
        Self::new(kind, Subkind::None)
    }

    pub const fn call_component(subkind: Subkind) -> Self {
        Self::new(ActorKind::CallComponent, subkind)
    }

    pub const fn mixer_component(subkind: Subkind) -> Self {
        Self::new(ActorKind::MixerComponent, subkind)
    }
}

impl fmt::Display for ActorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.subkind.as_str())
    }
}
