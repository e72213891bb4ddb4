//! Actor Runtime
//!
//! Reference-counted actors, a bounded worker-pool message bus and typed
//! dispatch tables. This crate knows nothing about calls or prompts; the
//! gateway builds those on top of it.
//!
//! # Architecture
//!
//! ```text
//!  send(from, to, stanza)                 ┌──────────────────────────┐
//!  ───────────────────────┐               │         Registry         │
//!                         ▼               │  by_address   by_id      │
//!          ┌──────────────────────────┐   │  slots{refs, destroy}    │
//!          │ bounded queue (25,000)   │   │  pending destruction     │
//!          └────────────┬─────────────┘   └────────────▲─────────────┘
//!                       │ blocking recv                │ lookup + retain
//!          ┌────────────▼─────────────┐                │
//!          │ worker × N               │────────────────┘
//!          │  lock tree → handler     │
//!          │  unlock → release        │
//!          └──────────────────────────┘
//! ```
//!
//! # Examples
//!
//! ```rust
//! use rayo_actors::{Actor, ActorBehavior, ActorSpec, ActorType, Message, MessageBus, Registry};
//! use rayo_types::{IqType, Stanza};
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! impl ActorBehavior for Echo {
//!     fn receive(&mut self, _actor: &Arc<Actor>, msg: Message) {
//!         println!("{} sent {}", msg.from, msg.payload);
//!     }
//! }
//!
//! let registry = Registry::new();
//! let bus = MessageBus::new(registry.clone(), 64).unwrap();
//! let echo = registry
//!     .create(ActorSpec::new(ActorType::CLIENT).with_address("echo@example.com"), Box::new(Echo))
//!     .unwrap();
//!
//! bus.send(&echo, "echo@example.com", Stanza::iq(IqType::Get, "1"));
//! assert_eq!(bus.deliver_pending(), 1);
//! ```

pub mod actor;
pub mod bus;
pub mod dispatch;
pub mod error;
pub mod kind;
pub mod message;
pub mod registry;

pub use actor::{Actor, ActorBehavior, ActorId, ActorSpec, LockGroup};
pub use bus::{BusConfig, BusStats, MessageBus, DEFAULT_QUEUE_CAPACITY, DEFAULT_WORKERS};
pub use dispatch::{CommandKey, DispatchTables, DispatchTablesBuilder, EventKey};
pub use error::{ActorError, Result};
pub use kind::{ActorKind, ActorType, Subkind};
pub use message::Message;
pub use registry::{ActorStatus, Lease, Registry, RegistrySnapshot, RegistryStats};
