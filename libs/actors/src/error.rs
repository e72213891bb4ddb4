//! Actor Runtime Error Types
//!
//! Only [`ActorError::AddressConflict`] is a hard failure for callers. The
//! delivery-time variants are never returned to a sender: the bus logs them,
//! counts them and, where the protocol requires it, answers with an error
//! reply instead.

use thiserror::Error;

/// Main actor runtime error type
#[derive(Error, Debug)]
pub enum ActorError {
    /// Another active actor already owns this address
    #[error("Address conflict: {address} is already registered")]
    AddressConflict { address: String },

    /// Parent was finalized before the child could retain it
    #[error("Parent actor {parent} is no longer registered")]
    ParentGone { parent: String },

    /// No active actor at the destination address
    #[error("Destination not found: {address}")]
    DestinationNotFound { address: String },

    /// No handler registered for the dispatch key
    #[error("No handler for {key}")]
    HandlerNotFound { key: String },

    /// Bounded queue was full and the message was dropped
    #[error("Message queue full ({capacity} messages), message dropped")]
    QueueOverflow { capacity: usize },

    /// Bus no longer accepts messages
    #[error("Message bus is shut down")]
    ShutDown,

    /// Invalid runtime configuration
    #[error("Configuration error: {message}")]
    Configuration {
        message: String,
        field: Option<String>,
    },

    /// Worker thread could not be started
    #[error("Failed to spawn worker {name}: {source}")]
    Spawn {
        name: String,
        source: std::io::Error,
    },
}

/// Result type alias for actor runtime operations
pub type Result<T> = std::result::Result<T, ActorError>;

impl ActorError {
    /// Create an address conflict error
    pub fn address_conflict(address: impl Into<String>) -> Self {
        Self::AddressConflict {
            address: address.into(),
        }
    }

    /// Create a destination not found error
    pub fn destination_not_found(address: impl Into<String>) -> Self {
        Self::DestinationNotFound {
            address: address.into(),
        }
    }

    /// Create a handler not found error
    pub fn handler_not_found(key: impl std::fmt::Display) -> Self {
        Self::HandlerNotFound {
            key: key.to_string(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>, field: Option<&str>) -> Self {
        Self::Configuration {
            message: message.into(),
            field: field.map(|s| s.to_string()),
        }
    }

    /// Recoverable errors are handled locally and never stop the gateway
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ActorError::Configuration { .. } | ActorError::Spawn { .. })
    }

    /// Get error category for metrics
    pub fn category(&self) -> &'static str {
        match self {
            ActorError::AddressConflict { .. } => "address_conflict",
            ActorError::ParentGone { .. } => "parent_gone",
            ActorError::DestinationNotFound { .. } => "destination_not_found",
            ActorError::HandlerNotFound { .. } => "handler_not_found",
            ActorError::QueueOverflow { .. } => "queue_overflow",
            ActorError::ShutDown => "shut_down",
            ActorError::Configuration { .. } => "configuration",
            ActorError::Spawn { .. } => "spawn",
        }
    }
}
