//! Call Engine Interface
//!
//! The media side of the gateway is an external collaborator. The gateway
//! asks it to do things through [`CallEngine::execute`], which only says
//! whether the operation was accepted. Results come back later as
//! [`EngineEvent`]s, fed into [`Gateway::on_engine_event`](crate::Gateway::on_engine_event)
//! and delivered to the owning actor through the bus.
//!
//! ## Event Encoding
//!
//! An event travels as a `presence` whose single child lives in
//! [`ns::ENGINE`], sent from the server actor. The element name selects the
//! handler; attributes carry the fields:
//!
//! ```text
//! <presence from='rayo.example.com' to='9f1c@rayo.example.com'>
//!   <bridged xmlns='urn:x-rayo-gateway:engine:1' uuid='9f1c' peer='77ab'/>
//! </presence>
//! ```

use crate::error::EngineError;
use rayo_types::{ns, Element};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Media direction when joining a mixer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaDirection {
    Duplex,
    Send,
    Recv,
}

impl MediaDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaDirection::Duplex => "duplex",
            MediaDirection::Send => "send",
            MediaDirection::Recv => "recv",
        }
    }

    /// Parse the `direction` attribute; absent means duplex
    pub fn parse(value: Option<&str>) -> Option<Self> {
        match value {
            None | Some("") | Some("duplex") => Some(MediaDirection::Duplex),
            Some("send") => Some(MediaDirection::Send),
            Some("recv") => Some(MediaDirection::Recv),
            Some(_) => None,
        }
    }
}

/// Why a call ended, reported in the `<end>` presence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EndReason {
    /// Remote party hung up
    Hangup,
    /// A client sent `<hangup>`
    HangupCommand,
    Timeout,
    Busy,
    Reject,
    Error,
}

impl EndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndReason::Hangup => "hangup",
            EndReason::HangupCommand => "hangup-command",
            EndReason::Timeout => "timeout",
            EndReason::Busy => "busy",
            EndReason::Reject => "reject",
            EndReason::Error => "error",
        }
    }
}

impl FromStr for EndReason {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hangup" => Ok(EndReason::Hangup),
            "hangup-command" => Ok(EndReason::HangupCommand),
            "timeout" => Ok(EndReason::Timeout),
            "busy" => Ok(EndReason::Busy),
            "reject" => Ok(EndReason::Reject),
            "error" => Ok(EndReason::Error),
            _ => Err(()),
        }
    }
}

/// Reason given with `<reject>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RejectReason {
    Busy,
    Decline,
    Error,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Busy => "busy",
            RejectReason::Decline => "decline",
            RejectReason::Error => "error",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "busy" => Some(RejectReason::Busy),
            "decline" => Some(RejectReason::Decline),
            "error" => Some(RejectReason::Error),
            _ => None,
        }
    }
}

/// Output playback controls
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum OutputControl {
    Stop,
    Pause,
    Resume,
    SpeedUp,
    SpeedDown,
    VolumeUp,
    VolumeDown,
    Seek { forward: bool, amount_ms: u64 },
}

impl OutputControl {
    /// Control named by a request element; `None` if it is not a control
    /// or a seek is missing its parameters
    pub fn from_element(element: &Element) -> Option<Self> {
        let control = match element.name.as_str() {
            "stop" => OutputControl::Stop,
            "pause" => OutputControl::Pause,
            "resume" => OutputControl::Resume,
            "speed-up" => OutputControl::SpeedUp,
            "speed-down" => OutputControl::SpeedDown,
            "volume-up" => OutputControl::VolumeUp,
            "volume-down" => OutputControl::VolumeDown,
            "seek" => {
                let forward = match element.attr("direction")? {
                    "forward" => true,
                    "back" => false,
                    _ => return None,
                };
                let amount_ms = element.attr("amount")?.parse().ok()?;
                OutputControl::Seek { forward, amount_ms }
            }
            _ => return None,
        };
        Some(control)
    }

    pub fn name(&self) -> &'static str {
        match self {
            OutputControl::Stop => "stop",
            OutputControl::Pause => "pause",
            OutputControl::Resume => "resume",
            OutputControl::SpeedUp => "speed-up",
            OutputControl::SpeedDown => "speed-down",
            OutputControl::VolumeUp => "volume-up",
            OutputControl::VolumeDown => "volume-down",
            OutputControl::Seek { .. } => "seek",
        }
    }
}

/// Recording controls besides stop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordControl {
    Pause,
    Resume,
}

impl RecordControl {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "pause" => Some(RecordControl::Pause),
            "resume" => Some(RecordControl::Resume),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            RecordControl::Pause => "pause",
            RecordControl::Resume => "resume",
        }
    }
}

/// Work the gateway asks the engine to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EngineOperation {
    Originate {
        uuid: String,
        dial_string: String,
        caller_id: Option<String>,
        headers: Vec<(String, String)>,
    },
    Accept {
        uuid: String,
        headers: Vec<(String, String)>,
    },
    Answer {
        uuid: String,
        headers: Vec<(String, String)>,
    },
    Redirect {
        uuid: String,
        to: String,
        headers: Vec<(String, String)>,
    },
    Hangup {
        uuid: String,
        reason: String,
        headers: Vec<(String, String)>,
    },
    Bridge {
        uuid: String,
        peer: String,
    },
    Unbridge {
        uuid: String,
        peer: String,
    },
    JoinMixer {
        uuid: String,
        mixer: String,
        direction: MediaDirection,
        profile: String,
    },
    LeaveMixer {
        uuid: String,
        mixer: String,
    },
    /// Render a document on a call (by uuid) or mixer (by name)
    StartOutput {
        component: String,
        target: String,
        document: Element,
    },
    OutputControl {
        component: String,
        control: OutputControl,
    },
    StartInput {
        component: String,
        uuid: String,
        start_timers: bool,
    },
    StartInputTimers {
        component: String,
    },
    /// Record a call's media to a file the engine picks
    StartRecording {
        component: String,
        uuid: String,
        format: String,
        max_duration_ms: Option<u64>,
        start_beep: bool,
    },
    RecordControl {
        component: String,
        control: RecordControl,
    },
    StopComponent {
        component: String,
    },
}

impl EngineOperation {
    pub fn name(&self) -> &'static str {
        match self {
            EngineOperation::Originate { .. } => "originate",
            EngineOperation::Accept { .. } => "accept",
            EngineOperation::Answer { .. } => "answer",
            EngineOperation::Redirect { .. } => "redirect",
            EngineOperation::Hangup { .. } => "hangup",
            EngineOperation::Bridge { .. } => "bridge",
            EngineOperation::Unbridge { .. } => "unbridge",
            EngineOperation::JoinMixer { .. } => "join-mixer",
            EngineOperation::LeaveMixer { .. } => "leave-mixer",
            EngineOperation::StartOutput { .. } => "start-output",
            EngineOperation::OutputControl { .. } => "output-control",
            EngineOperation::StartInput { .. } => "start-input",
            EngineOperation::StartInputTimers { .. } => "start-input-timers",
            EngineOperation::StartRecording { .. } => "start-recording",
            EngineOperation::RecordControl { .. } => "record-control",
            EngineOperation::StopComponent { .. } => "stop-component",
        }
    }
}

/// External call/media engine
pub trait CallEngine: Send + Sync {
    /// Fire-and-acknowledge: `Ok` means the engine took the work
    fn execute(&self, operation: EngineOperation) -> Result<(), EngineError>;
}

/// How an output finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OutputCompletion {
    Finish,
    Stop,
    Error,
}

impl OutputCompletion {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputCompletion::Finish => "finish",
            OutputCompletion::Stop => "stop",
            OutputCompletion::Error => "error",
        }
    }
}

/// How a recording finished
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordCompletion {
    MaxDuration,
    InitialTimeout,
    FinalTimeout,
    Stop,
    Error,
}

impl RecordCompletion {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordCompletion::MaxDuration => "max-duration",
            RecordCompletion::InitialTimeout => "initial-timeout",
            RecordCompletion::FinalTimeout => "final-timeout",
            RecordCompletion::Stop => "stop",
            RecordCompletion::Error => "error",
        }
    }

    fn parse(value: Option<&str>) -> Self {
        match value {
            Some("max-duration") => RecordCompletion::MaxDuration,
            Some("initial-timeout") => RecordCompletion::InitialTimeout,
            Some("final-timeout") => RecordCompletion::FinalTimeout,
            Some("error") => RecordCompletion::Error,
            _ => RecordCompletion::Stop,
        }
    }
}

/// Which input timer fired
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum InputTimeout {
    NoInput,
    NoMatch,
}

impl InputTimeout {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputTimeout::NoInput => "noinput",
            InputTimeout::NoMatch => "nomatch",
        }
    }
}

/// Something the engine reports back
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum EngineEvent {
    Ringing { uuid: String },
    Answered { uuid: String },
    Bridged { uuid: String, peer: String },
    Unbridged { uuid: String, peer: String },
    JoinFailed { uuid: String, reason: String },
    MixerMemberAdded { mixer: String, uuid: String },
    MixerMemberRemoved { mixer: String, uuid: String },
    MixerDestroyed { mixer: String },
    CallEnded { uuid: String, reason: EndReason },
    OutputComplete { component: String, reason: OutputCompletion },
    InputDigit { component: String, digit: char },
    InputTimeout { component: String, kind: InputTimeout },
    RecordComplete {
        component: String,
        reason: RecordCompletion,
        uri: String,
        duration_ms: u64,
    },
}

impl EngineEvent {
    /// Element name used as the event dispatch key
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::Ringing { .. } => "ringing",
            EngineEvent::Answered { .. } => "answered",
            EngineEvent::Bridged { .. } => "bridged",
            EngineEvent::Unbridged { .. } => "unbridged",
            EngineEvent::JoinFailed { .. } => "join-failed",
            EngineEvent::MixerMemberAdded { .. } => "mixer-joined",
            EngineEvent::MixerMemberRemoved { .. } => "mixer-left",
            EngineEvent::MixerDestroyed { .. } => "destroyed",
            EngineEvent::CallEnded { .. } => "ended",
            EngineEvent::OutputComplete { .. } => "output-complete",
            EngineEvent::InputDigit { .. } => "dtmf",
            EngineEvent::InputTimeout { .. } => "input-timeout",
            EngineEvent::RecordComplete { .. } => "record-complete",
        }
    }

    pub fn to_element(&self) -> Element {
        let element = Element::ns(self.name(), ns::ENGINE);
        match self {
            EngineEvent::Ringing { uuid } | EngineEvent::Answered { uuid } => {
                element.with_attr("uuid", uuid)
            }
            EngineEvent::Bridged { uuid, peer } | EngineEvent::Unbridged { uuid, peer } => {
                element.with_attr("uuid", uuid).with_attr("peer", peer)
            }
            EngineEvent::JoinFailed { uuid, reason } => {
                element.with_attr("uuid", uuid).with_attr("reason", reason)
            }
            EngineEvent::MixerMemberAdded { mixer, uuid }
            | EngineEvent::MixerMemberRemoved { mixer, uuid } => {
                element.with_attr("mixer", mixer).with_attr("uuid", uuid)
            }
            EngineEvent::MixerDestroyed { mixer } => element.with_attr("mixer", mixer),
            EngineEvent::CallEnded { uuid, reason } => element
                .with_attr("uuid", uuid)
                .with_attr("reason", reason.as_str()),
            EngineEvent::OutputComplete { component, reason } => element
                .with_attr("component", component)
                .with_attr("reason", reason.as_str()),
            EngineEvent::InputDigit { component, digit } => element
                .with_attr("component", component)
                .with_attr("digit", digit.to_string()),
            EngineEvent::InputTimeout { component, kind } => element
                .with_attr("component", component)
                .with_attr("kind", kind.as_str()),
            EngineEvent::RecordComplete {
                component,
                reason,
                uri,
                duration_ms,
            } => element
                .with_attr("component", component)
                .with_attr("reason", reason.as_str())
                .with_attr("uri", uri)
                .with_attr("duration", duration_ms.to_string()),
        }
    }

    /// Decode an event element; `None` for foreign or malformed elements
    pub fn from_element(element: &Element) -> Option<Self> {
        if element.namespace() != Some(ns::ENGINE) {
            return None;
        }
        let attr = |key: &str| element.non_empty_attr(key).map(str::to_string);
        let event = match element.name.as_str() {
            "ringing" => EngineEvent::Ringing { uuid: attr("uuid")? },
            "answered" => EngineEvent::Answered { uuid: attr("uuid")? },
            "bridged" => EngineEvent::Bridged {
                uuid: attr("uuid")?,
                peer: attr("peer")?,
            },
            "unbridged" => EngineEvent::Unbridged {
                uuid: attr("uuid")?,
                peer: attr("peer")?,
            },
            "join-failed" => EngineEvent::JoinFailed {
                uuid: attr("uuid")?,
                reason: attr("reason").unwrap_or_default(),
            },
            "mixer-joined" => EngineEvent::MixerMemberAdded {
                mixer: attr("mixer")?,
                uuid: attr("uuid")?,
            },
            "mixer-left" => EngineEvent::MixerMemberRemoved {
                mixer: attr("mixer")?,
                uuid: attr("uuid")?,
            },
            "destroyed" => EngineEvent::MixerDestroyed { mixer: attr("mixer")? },
            "ended" => EngineEvent::CallEnded {
                uuid: attr("uuid")?,
                reason: element
                    .attr("reason")
                    .and_then(|r| r.parse().ok())
                    .unwrap_or(EndReason::Hangup),
            },
            "output-complete" => EngineEvent::OutputComplete {
                component: attr("component")?,
                reason: match element.attr("reason") {
                    Some("stop") => OutputCompletion::Stop,
                    Some("error") => OutputCompletion::Error,
                    _ => OutputCompletion::Finish,
                },
            },
            "dtmf" => EngineEvent::InputDigit {
                component: attr("component")?,
                digit: element.attr("digit")?.chars().next()?,
            },
            "input-timeout" => EngineEvent::InputTimeout {
                component: attr("component")?,
                kind: match element.attr("kind") {
                    Some("nomatch") => InputTimeout::NoMatch,
                    _ => InputTimeout::NoInput,
                },
            },
            "record-complete" => EngineEvent::RecordComplete {
                component: attr("component")?,
                reason: RecordCompletion::parse(element.attr("reason")),
                uri: attr("uri").unwrap_or_default(),
                duration_ms: element
                    .attr("duration")
                    .and_then(|d| d.parse().ok())
                    .unwrap_or_default(),
            },
            _ => return None,
        };
        Some(event)
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_element())
    }
}
