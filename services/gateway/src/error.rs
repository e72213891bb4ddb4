//! Gateway Error Types
//!
//! Failures surfaced to the embedding application. Protocol-level failures
//! never appear here: handlers turn them into error replies.

use rayo_actors::ActorError;
use rayo_types::StanzaError;
use thiserror::Error;

/// Call engine failures. The engine either accepts an operation or
/// rejects it; completion arrives later as an [`EngineEvent`](crate::engine::EngineEvent).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Operation was refused
    #[error("Engine rejected {operation}: {reason}")]
    Rejected { operation: String, reason: String },

    /// Target session or component is unknown to the engine
    #[error("Engine has no session {id}")]
    UnknownSession { id: String },

    /// Engine cannot take work right now
    #[error("Engine unavailable: {0}")]
    Unavailable(String),
}

impl EngineError {
    pub fn rejected(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Rejected {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Condition reported to the client whose request failed
    pub fn condition(&self) -> StanzaError {
        match self {
            EngineError::Rejected { .. } => StanzaError::InternalServerError,
            EngineError::UnknownSession { .. } => StanzaError::ItemNotFound,
            EngineError::Unavailable(_) => StanzaError::ServiceUnavailable,
        }
    }
}

/// Grammar compilation failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GrammarError {
    #[error("Grammar is empty")]
    Empty,

    #[error("Invalid grammar: {reason}")]
    Invalid { reason: String },
}

/// Main gateway error type
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error(transparent)]
    Actor(#[from] ActorError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Grammar(#[from] GrammarError),

    /// An offered call found nobody to offer it to
    #[error("No online clients to offer call {uuid} to")]
    NoClientsAvailable { uuid: String },

    /// Transport callback for a stream that was never announced
    #[error("Unknown stream {id}")]
    UnknownStream { id: u64 },

    /// Console command that maps to no request
    #[error("Unknown console command '{alias}'")]
    UnknownAlias { alias: String },
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// True for failures a retry or a later event can fix
    pub fn is_recoverable(&self) -> bool {
        match self {
            GatewayError::Actor(e) => e.is_recoverable(),
            GatewayError::Engine(EngineError::Unavailable(_)) => true,
            GatewayError::NoClientsAvailable { .. } => true,
            _ => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            GatewayError::Actor(e) => e.category(),
            GatewayError::Engine(_) => "engine",
            GatewayError::Grammar(_) => "grammar",
            GatewayError::NoClientsAvailable { .. } => "offer",
            GatewayError::UnknownStream { .. } => "transport",
            GatewayError::UnknownAlias { .. } => "console",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_conditions() {
        assert_eq!(
            EngineError::rejected("answer", "no session").condition(),
            StanzaError::InternalServerError
        );
        assert_eq!(
            EngineError::Unavailable("overloaded".into()).condition(),
            StanzaError::ServiceUnavailable
        );
        assert_eq!(
            EngineError::UnknownSession { id: "abc".into() }.condition(),
            StanzaError::ItemNotFound
        );
    }

    #[test]
    fn test_categories() {
        let err = GatewayError::from(ActorError::address_conflict("c1@example.com"));
        assert!(!err.to_string().is_empty());
        assert_eq!(GatewayError::UnknownStream { id: 3 }.category(), "transport");
        assert!(GatewayError::NoClientsAvailable { uuid: "u".into() }.is_recoverable());
        assert!(!GatewayError::from(GrammarError::Empty).is_recoverable());
    }
}
