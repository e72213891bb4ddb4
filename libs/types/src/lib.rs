//! # Rayo Types Library
//!
//! Shared vocabulary for the gateway crates: the document model that travels
//! through the message bus, protocol addresses, namespaces and the stanza
//! error conditions that every failure is eventually converted into.
//!
//! ## Design Philosophy
//!
//! - **Opaque Payloads**: the bus never interprets a [`Stanza`]; only handlers do
//! - **Recoverable Addressing**: every stanza carries its own `from`/`to`
//! - **Protocol-Level Failures**: errors reach clients as [`StanzaError`] conditions
//!
//! ## Quick Start
//!
//! ```rust
//! use rayo_types::{ns, Element, IqType, Jid, Stanza, StanzaError};
//!
//! let jid: Jid = "client@example.com/desk".parse().unwrap();
//! assert_eq!(jid.bare(), "client@example.com");
//!
//! let answer = Stanza::iq(IqType::Set, "req-1")
//!     .with_from(jid.to_string())
//!     .with_to("call-1@example.com")
//!     .with_child(Element::ns("answer", ns::RAYO));
//!
//! let error = answer.error_reply(StanzaError::Conflict);
//! assert_eq!(error.to.as_deref(), Some("client@example.com/desk"));
//! ```

pub mod error;
pub mod jid;
pub mod ns;
pub mod stanza;

pub use error::{JidError, StanzaError};
pub use jid::Jid;
pub use stanza::{Element, IqType, PresenceType, Stanza, StanzaKind};

/// Result type for address parsing
pub type Result<T> = std::result::Result<T, JidError>;
