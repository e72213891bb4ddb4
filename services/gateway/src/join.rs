//! Call join state machine
//!
//! A call is unjoined, joined to one other call, or joined to one mixer, and
//! has at most one join/unjoin request in flight. The machine only tracks
//! state; the call actor talks to the engine and sends the replies.
//!
//! ```text
//!             request_join ──► pending ──► joined()  ──► JoinedToCall / JoinedToMixer
//!  Unjoined ◄──────────────────────────── failed()/abandon()
//!      ▲
//!      └── unjoined() ◄── pending ◄── request_unjoin ◄── Joined*
//! ```
//!
//! Every path that sets the pending request has a path that hands it back:
//! a matching engine event, a failure, or the call going away.

use rayo_types::{Stanza, StanzaError};
use std::fmt;

/// What a call is, or wants to be, joined to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinTarget {
    /// Another call, by uuid
    Call(String),
    /// A mixer, by name
    Mixer(String),
}

impl fmt::Display for JoinTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinTarget::Call(uuid) => write!(f, "call {}", uuid),
            JoinTarget::Mixer(name) => write!(f, "mixer {}", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinStatus {
    Unjoined,
    JoinedToCall(String),
    JoinedToMixer(String),
}

impl JoinStatus {
    pub fn target(&self) -> Option<JoinTarget> {
        match self {
            JoinStatus::Unjoined => None,
            JoinStatus::JoinedToCall(uuid) => Some(JoinTarget::Call(uuid.clone())),
            JoinStatus::JoinedToMixer(name) => Some(JoinTarget::Mixer(name.clone())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestKind {
    Join,
    Unjoin,
}

/// The request waiting for the engine to answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub kind: RequestKind,
    pub target: JoinTarget,
    /// Original request, answered when the request resolves
    pub request: Stanza,
}

/// Why a join or unjoin was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinRejection {
    RequestPending,
    AlreadyJoined,
    NotJoined,
    WrongTarget,
}

impl JoinRejection {
    pub fn condition(&self) -> StanzaError {
        match self {
            JoinRejection::RequestPending | JoinRejection::AlreadyJoined => StanzaError::Conflict,
            JoinRejection::NotJoined | JoinRejection::WrongTarget => StanzaError::ServiceUnavailable,
        }
    }

    pub fn text(&self) -> &'static str {
        match self {
            JoinRejection::RequestPending => "(un)join request is pending",
            JoinRejection::AlreadyJoined => "already joined",
            JoinRejection::NotJoined => "not joined to anything",
            JoinRejection::WrongTarget => "not joined to that target",
        }
    }
}

#[derive(Debug, Clone)]
pub struct JoinState {
    status: JoinStatus,
    pending: Option<PendingRequest>,
}

impl Default for JoinState {
    fn default() -> Self {
        Self::new()
    }
}

impl JoinState {
    pub fn new() -> Self {
        Self {
            status: JoinStatus::Unjoined,
            pending: None,
        }
    }

    pub fn status(&self) -> &JoinStatus {
        &self.status
    }

    pub fn is_joined(&self) -> bool {
        self.status != JoinStatus::Unjoined
    }

    pub fn pending(&self) -> Option<&PendingRequest> {
        self.pending.as_ref()
    }

    pub fn request_join(&mut self, target: JoinTarget, request: Stanza) -> Result<(), JoinRejection> {
        if self.pending.is_some() {
            return Err(JoinRejection::RequestPending);
        }
        if self.is_joined() {
            return Err(JoinRejection::AlreadyJoined);
        }
        self.pending = Some(PendingRequest {
            kind: RequestKind::Join,
            target,
            request,
        });
        Ok(())
    }

    pub fn request_unjoin(&mut self, target: JoinTarget, request: Stanza) -> Result<(), JoinRejection> {
        if self.pending.is_some() {
            return Err(JoinRejection::RequestPending);
        }
        match self.status.target() {
            None => Err(JoinRejection::NotJoined),
            Some(current) if current != target => Err(JoinRejection::WrongTarget),
            Some(_) => {
                self.pending = Some(PendingRequest {
                    kind: RequestKind::Unjoin,
                    target,
                    request,
                });
                Ok(())
            }
        }
    }

    /// The engine joined the call to `target`. Returns the join request this
    /// resolves, if any; a join requested by the other leg resolves nothing.
    pub fn joined(&mut self, target: JoinTarget) -> Option<PendingRequest> {
        self.status = match &target {
            JoinTarget::Call(uuid) => JoinStatus::JoinedToCall(uuid.clone()),
            JoinTarget::Mixer(name) => JoinStatus::JoinedToMixer(name.clone()),
        };
        self.take_matching(RequestKind::Join, &target)
    }

    /// The engine separated the call from `target`
    pub fn unjoined(&mut self, target: JoinTarget) -> Option<PendingRequest> {
        if self.status.target().as_ref() == Some(&target) {
            self.status = JoinStatus::Unjoined;
        }
        self.take_matching(RequestKind::Unjoin, &target)
    }

    /// The engine refused or failed the pending request; state is unchanged
    pub fn failed(&mut self) -> Option<PendingRequest> {
        self.pending.take()
    }

    /// The call is going away; whatever is pending will never resolve
    pub fn abandon(&mut self) -> Option<PendingRequest> {
        self.status = JoinStatus::Unjoined;
        self.pending.take()
    }

    fn take_matching(&mut self, kind: RequestKind, target: &JoinTarget) -> Option<PendingRequest> {
        let matches = matches!(
            &self.pending,
            Some(pending) if pending.kind == kind && &pending.target == target
        );
        if matches {
            self.pending.take()
        } else {
            None
        }
    }
}
