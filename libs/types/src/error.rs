//! Error types for address parsing and protocol-level failures
//!
//! [`StanzaError`] is not a Rust error in the usual sense: it is the condition
//! carried inside an error reply sent back to whoever issued a request.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while parsing a protocol address
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JidError {
    #[error("address is empty")]
    Empty,

    #[error("address '{0}' has no domain part")]
    MissingDomain(String),

    #[error("address '{0}' has an empty node before '@'")]
    EmptyNode(String),
}

/// Error conditions returned to clients in error replies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StanzaError {
    BadRequest,
    Conflict,
    FeatureNotImplemented,
    ItemNotFound,
    ServiceUnavailable,
    UnexpectedRequest,
    InternalServerError,
    NotAllowed,
    NotAuthorized,
}

impl StanzaError {
    /// Condition element name
    pub fn condition(&self) -> &'static str {
        match self {
            StanzaError::BadRequest => "bad-request",
            StanzaError::Conflict => "conflict",
            StanzaError::FeatureNotImplemented => "feature-not-implemented",
            StanzaError::ItemNotFound => "item-not-found",
            StanzaError::ServiceUnavailable => "service-unavailable",
            StanzaError::UnexpectedRequest => "unexpected-request",
            StanzaError::InternalServerError => "internal-server-error",
            StanzaError::NotAllowed => "not-allowed",
            StanzaError::NotAuthorized => "not-authorized",
        }
    }

    /// Error type attribute (cancel, modify, wait, auth)
    pub fn error_type(&self) -> &'static str {
        match self {
            StanzaError::BadRequest => "modify",
            StanzaError::UnexpectedRequest | StanzaError::InternalServerError => "wait",
            StanzaError::NotAuthorized => "auth",
            _ => "cancel",
        }
    }

    pub fn from_condition(condition: &str) -> Option<Self> {
        let parsed = match condition {
            "bad-request" => StanzaError::BadRequest,
            "conflict" => StanzaError::Conflict,
            "feature-not-implemented" => StanzaError::FeatureNotImplemented,
            "item-not-found" => StanzaError::ItemNotFound,
            "service-unavailable" => StanzaError::ServiceUnavailable,
            "unexpected-request" => StanzaError::UnexpectedRequest,
            "internal-server-error" => StanzaError::InternalServerError,
            "not-allowed" => StanzaError::NotAllowed,
            "not-authorized" => StanzaError::NotAuthorized,
            _ => return None,
        };
        Some(parsed)
    }
}

impl fmt::Display for StanzaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.condition())
    }
}
